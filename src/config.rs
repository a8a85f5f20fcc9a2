use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub docker: DockerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Scheduler period.
    #[serde(default = "default_collection_interval_secs")]
    pub collection_interval_secs: u64,
    /// How long a Docker availability check result is reused.
    #[serde(default = "default_docker_check_interval_secs")]
    pub docker_check_interval_secs: u64,
    /// Network counters older than this are not used for rates.
    #[serde(default = "default_network_stale_after_secs")]
    pub network_stale_after_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            collection_interval_secs: default_collection_interval_secs(),
            docker_check_interval_secs: default_docker_check_interval_secs(),
            network_stale_after_secs: default_network_stale_after_secs(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

fn default_collection_interval_secs() -> u64 {
    5
}

fn default_docker_check_interval_secs() -> u64 {
    5
}

fn default_network_stale_after_secs() -> u64 {
    60
}

fn default_prune_interval_secs() -> u64 {
    3600
}

/// Overrides for grouping containers into stacks.
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    /// Exact container name -> stack name.
    #[serde(default = "default_stack_aliases")]
    pub stack_aliases: HashMap<String, String>,
    /// Container name prefix -> stack name.
    #[serde(default = "default_stack_prefixes")]
    pub stack_prefixes: HashMap<String, String>,
    /// Trailing name tokens that denote a service role rather than the project.
    #[serde(default = "default_service_roles")]
    pub service_roles: Vec<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            stack_aliases: default_stack_aliases(),
            stack_prefixes: default_stack_prefixes(),
            service_roles: default_service_roles(),
        }
    }
}

fn default_stack_aliases() -> HashMap<String, String> {
    HashMap::from([("nocodb".to_string(), "noco-db".to_string())])
}

fn default_stack_prefixes() -> HashMap<String, String> {
    HashMap::from([("buildx_".to_string(), "buildx".to_string())])
}

fn default_service_roles() -> Vec<String> {
    ["redis", "postgres", "kafka", "zookeeper", "db"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("read config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.retention_days > 0,
            "database.retention_days must be > 0, got {}",
            self.database.retention_days
        );
        anyhow::ensure!(
            self.monitoring.collection_interval_secs > 0,
            "monitoring.collection_interval_secs must be > 0, got {}",
            self.monitoring.collection_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.docker_check_interval_secs > 0,
            "monitoring.docker_check_interval_secs must be > 0, got {}",
            self.monitoring.docker_check_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.network_stale_after_secs > 0,
            "monitoring.network_stale_after_secs must be > 0, got {}",
            self.monitoring.network_stale_after_secs
        );
        anyhow::ensure!(
            self.monitoring.prune_interval_secs > 0,
            "monitoring.prune_interval_secs must be > 0, got {}",
            self.monitoring.prune_interval_secs
        );
        for (name, stack) in &self.docker.stack_aliases {
            anyhow::ensure!(
                !name.is_empty() && !stack.is_empty(),
                "docker.stack_aliases entries must be non-empty, got {:?} = {:?}",
                name,
                stack
            );
        }
        for (prefix, stack) in &self.docker.stack_prefixes {
            anyhow::ensure!(
                !prefix.is_empty() && !stack.is_empty(),
                "docker.stack_prefixes entries must be non-empty, got {:?} = {:?}",
                prefix,
                stack
            );
        }
        anyhow::ensure!(
            self.docker.service_roles.iter().all(|r| !r.is_empty()),
            "docker.service_roles must not contain empty words"
        );
        Ok(())
    }
}
