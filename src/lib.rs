// Library for tests to access modules

pub mod collectors;
pub mod config;
pub mod docker_repo;
pub mod history_repo;
pub mod models;
pub mod platform;
pub mod rates;
pub mod routes;
pub mod scheduler;
pub mod service;
pub mod sysinfo_repo;
pub mod version;
