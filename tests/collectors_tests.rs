// Domain collectors and services against in-memory platform, runtime and store

mod common;

use common::*;
use hoststats::collectors::{
    Collector, CpuCollector, DiskCollector, HostCollector, MemoryCollector, NetworkCollector,
};
use hoststats::models::*;
use hoststats::platform::TemperatureSensor;
use hoststats::rates::NetworkRateCalculator;
use hoststats::history_repo::HostRegistry;
use hoststats::scheduler::MetricsModule;
use hoststats::service::HostHeartbeat;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn cpu_metric_combines_usage_load_and_temperature() {
    let platform = Arc::new(FakePlatform::linux_host());
    let metric = CpuCollector::new(platform)
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(metric.usage_percent, 12.5);
    assert_eq!(metric.cores, 4);
    assert_eq!(metric.load_avg_5, 0.25);
    assert_eq!(metric.temperature, 48.0);
    assert_eq!(metric.model_name, "Fake CPU");
    assert!(metric.timestamp > 0);
}

#[tokio::test]
async fn implausible_sensor_readings_give_zero_temperature() {
    let mut platform = FakePlatform::linux_host();
    platform.sensors = vec![TemperatureSensor {
        key: "nvme composite".into(),
        temperature: 200.0,
    }];
    let metric = CpuCollector::new(Arc::new(platform))
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(metric.temperature, 0.0);
}

#[tokio::test]
async fn memory_percent_is_used_over_total() {
    let metric = MemoryCollector::new(Arc::new(FakePlatform::linux_host()))
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(metric.total, 8_000);
    assert!((metric.usage_percent - 25.0).abs() < 1e-9);
    assert_eq!(metric.swap_used, 100);
}

#[tokio::test]
async fn disk_capacity_prefers_root() {
    let mut platform = FakePlatform::linux_host();
    platform.partitions.push(partition("/dev/sdb1", "/data", "xfs"));
    platform
        .usages
        .insert("/data".into(), usage("/data", "xfs", 10_000, 1_000));

    let metric = DiskCollector::new(Arc::new(platform))
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(metric.capacity_source, CapacitySource::Root);
    assert_eq!(metric.total, 1_000);
    assert_eq!(metric.used, 250);
    assert!((metric.usage_percent - 25.0).abs() < 1e-9);
    assert_eq!(metric.mounts.len(), 2);
    assert_eq!(metric.io_counters.len(), 1);
}

#[tokio::test]
async fn disk_capacity_falls_back_to_largest_physical_mount() {
    let platform = FakePlatform {
        partitions: vec![
            partition("tmpfs", "/run", "tmpfs"),
            partition("/dev/sda1", "/data", "ext4"),
            partition("/dev/sdb1", "/backup", "ext4"),
        ],
        usages: HashMap::from([
            ("/run".to_string(), usage("/run", "tmpfs", 99_000, 10)),
            ("/data".to_string(), usage("/data", "ext4", 4_000, 1_000)),
            ("/backup".to_string(), usage("/backup", "ext4", 2_000, 500)),
        ]),
        ..FakePlatform::default()
    };

    let metric = DiskCollector::new(Arc::new(platform))
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(metric.capacity_source, CapacitySource::LargestPhysical);
    assert_eq!(metric.total, 4_000);
    assert_eq!(metric.used, 1_000);
}

#[tokio::test]
async fn disk_capacity_sums_virtual_mounts_as_last_resort() {
    let platform = FakePlatform {
        partitions: vec![
            partition("overlay", "/", "overlay"),
            partition("tmpfs", "/tmp", "tmpfs"),
            partition("tmpfs", "/run", "tmpfs"),
        ],
        usages: HashMap::from([
            ("/tmp".to_string(), usage("/tmp", "tmpfs", 300, 100)),
            ("/run".to_string(), usage("/run", "tmpfs", 700, 100)),
        ]),
        ..FakePlatform::default()
    };

    let metric = DiskCollector::new(Arc::new(platform))
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(metric.capacity_source, CapacitySource::SumOfMounts);
    assert_eq!(metric.total, 1_000);
    assert_eq!(metric.used, 200);
    assert_eq!(metric.partitions.len(), 3);
    assert_eq!(metric.mounts.len(), 2, "mount without usage is skipped");
}

#[tokio::test]
async fn disk_without_any_usage_is_unavailable() {
    let metric = DiskCollector::new(Arc::new(FakePlatform::default()))
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(metric.capacity_source, CapacitySource::Unavailable);
    assert_eq!(metric.total, 0);
    assert_eq!(metric.usage_percent, 0.0);
}

#[tokio::test]
async fn network_skips_loopback_and_marks_primary() {
    let platform = Arc::new(FakePlatform::linux_host());
    let collector = NetworkCollector::new(platform, Arc::new(NetworkRateCalculator::default()))
        .with_outbound_lookup(eth0_outbound_route);

    let metric = collector.collect(&CancellationToken::new()).await.unwrap();
    assert_eq!(metric.interfaces.len(), 1);
    let eth0 = &metric.interfaces[0];
    assert_eq!(eth0.name, "eth0");
    assert!(eth0.is_primary);
    assert_eq!(eth0.bytes_recv, 2_000);
    // First observation has nothing to diff against.
    assert_eq!(eth0.throughput_bytes_per_sec, 0.0);
}

#[tokio::test]
async fn network_rates_come_from_successive_collections() {
    let platform = Arc::new(FakePlatform::linux_host());
    let collector = NetworkCollector::new(
        platform.clone(),
        Arc::new(NetworkRateCalculator::new(Duration::from_secs(60))),
    )
    .with_outbound_lookup(no_outbound_route);

    collector.collect(&CancellationToken::new()).await.unwrap();
    std::thread::sleep(Duration::from_millis(20));
    platform.set_counters(vec![counter("eth0", 11_000, 52_000), counter("eth1", 5, 5)]);
    let metric = collector.collect(&CancellationToken::new()).await.unwrap();

    let eth0 = metric.interfaces.iter().find(|i| i.name == "eth0").unwrap();
    assert!(!eth0.is_primary);
    assert!(eth0.throughput_bytes_per_sec > 0.0);
    assert!(eth0.speed_kbps_recv > eth0.speed_kbps_sent);

    let eth1 = metric.interfaces.iter().find(|i| i.name == "eth1").unwrap();
    assert_eq!(eth1.throughput_bytes_per_sec, 0.0, "new interface has no rate yet");
}

#[tokio::test]
async fn host_identity_uses_outbound_interface() {
    let host = HostCollector::new(Arc::new(FakePlatform::linux_host()))
        .with_outbound_lookup(eth0_outbound_route)
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(host.name, "testhost");
    assert_eq!(host.mac_address, "aa:bb:cc:dd:ee:01");
    assert_eq!(host.ipv4, "192.168.1.10");
    assert_eq!(host.kernel_version, "6.1.0");
}

#[tokio::test]
async fn host_identity_fails_without_usable_interface() {
    let platform = FakePlatform {
        interfaces: vec![iface("lo", "00:00:00:00:00:00", &["127.0.0.1"])],
        ..FakePlatform::default()
    };
    let err = HostCollector::new(Arc::new(platform))
        .with_outbound_lookup(no_outbound_route)
        .collect(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("MAC"));
}

#[tokio::test]
async fn service_saves_and_reads_back_snapshots() {
    let store = Arc::new(MemoryStore::default());
    let services = fake_services(
        Arc::new(FakePlatform::linux_host()),
        Arc::new(FakeRuntime::default()),
        store.clone(),
    );
    let cancel = CancellationToken::new();

    assert!(services.memory.get_latest().await.unwrap().is_none());
    services.memory.collect_and_save(&cancel).await.unwrap();
    services.memory.collect_and_save(&cancel).await.unwrap();
    assert_eq!(store.count(MetricKind::Memory), 2);

    let latest = services.memory.get_latest().await.unwrap().unwrap();
    assert_eq!(latest.total, 8_000);
    let history = services.memory.get_historical(1.0).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].timestamp <= history[1].timestamp);

    assert!(services.memory.get_historical(0.0).await.is_err());
    assert!(services.cpu.get_latest().await.unwrap().is_none());
}

#[tokio::test]
async fn history_excludes_snapshots_outside_window() {
    let store = Arc::new(MemoryStore::default());
    let services = fake_services(
        Arc::new(FakePlatform::linux_host()),
        Arc::new(FakeRuntime::default()),
        store.clone(),
    );
    let mut old = services
        .cpu
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    old.timestamp -= 3 * 3_600_000;
    services.cpu.save(&old).await.unwrap();
    services
        .cpu
        .collect_and_save(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(services.cpu.get_historical(1.0).await.unwrap().len(), 1);
    assert_eq!(services.cpu.get_historical(4.0).await.unwrap().len(), 2);
}

#[tokio::test]
async fn collect_all_current_reports_failed_domains() {
    let mut platform = FakePlatform::linux_host();
    platform.fail_memory = true;
    let store = Arc::new(MemoryStore::default());
    let services = fake_services(
        Arc::new(platform),
        Arc::new(FakeRuntime::with_containers(vec![
            runtime_container("aaaaaaaaaaaa0001", "blog-db-1", "running"),
            runtime_container("aaaaaaaaaaaa0002", "blog", "running"),
            runtime_container("bbbbbbbbbbbb0001", "nocodb", "exited"),
        ])),
        store.clone(),
    );

    let snapshot = services.collect_all_current(&CancellationToken::new()).await;

    assert!(snapshot.cpu.is_some());
    assert!(snapshot.memory.is_none());
    assert!(snapshot.disk.is_some());
    assert!(snapshot.network.is_some());
    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.errors[0].domain, "memory");

    let docker = snapshot.docker.unwrap();
    let stacks: Vec<(&str, u32, u32)> = docker
        .stacks
        .iter()
        .map(|s| (s.name.as_str(), s.total_containers, s.running_containers))
        .collect();
    assert_eq!(stacks, vec![("blog", 2, 2), ("noco-db", 1, 0)]);
    assert_eq!(docker.total_containers, 3);
    assert!(docker.error.is_none());

    // Nothing is persisted.
    assert!(store.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn service_modules_cover_every_domain() {
    let services = fake_services(
        Arc::new(FakePlatform::linux_host()),
        Arc::new(FakeRuntime::default()),
        Arc::new(MemoryStore::default()),
    );
    let names: Vec<&str> = services.modules().iter().map(|m| m.name()).collect();
    assert_eq!(names, vec!["cpu", "memory", "disk", "network", "docker"]);
}

fn cancelled() -> CancellationToken {
    let cancel = CancellationToken::new();
    cancel.cancel();
    cancel
}

fn assert_cancelled<T: std::fmt::Debug>(result: anyhow::Result<T>, domain: &str) {
    let err = result.unwrap_err().to_string();
    assert!(err.contains("cancelled"), "{}: {}", domain, err);
    assert!(err.contains(domain), "{}: {}", domain, err);
}

#[tokio::test]
async fn cpu_collect_honours_cancelled_token() {
    let collector = CpuCollector::new(Arc::new(FakePlatform::linux_host()));
    assert_cancelled(collector.collect(&cancelled()).await, "cpu");
}

#[tokio::test]
async fn memory_collect_honours_cancelled_token() {
    let collector = MemoryCollector::new(Arc::new(FakePlatform::linux_host()));
    assert_cancelled(collector.collect(&cancelled()).await, "memory");
}

#[tokio::test]
async fn disk_collect_honours_cancelled_token() {
    let platform = Arc::new(FakePlatform::linux_host());
    let collector = DiskCollector::new(platform.clone());
    assert_cancelled(collector.collect(&cancelled()).await, "disk");
    assert_eq!(platform.disk_usage_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn network_collect_honours_cancelled_token() {
    let rates = Arc::new(NetworkRateCalculator::default());
    let collector = NetworkCollector::new(Arc::new(FakePlatform::linux_host()), rates.clone())
        .with_outbound_lookup(no_outbound_route);
    assert_cancelled(collector.collect(&cancelled()).await, "network");
    assert!(rates.last_batch().is_none(), "no batch is committed");
}

#[tokio::test]
async fn host_collect_honours_cancelled_token() {
    let collector = HostCollector::new(Arc::new(FakePlatform::linux_host())).with_outbound_lookup(eth0_outbound_route);
    assert_cancelled(collector.collect(&cancelled()).await, "host");
}

#[tokio::test]
async fn disk_usage_is_read_once_per_collection() {
    let mut platform = FakePlatform::linux_host();
    platform.partitions.push(partition("/dev/sdb1", "/data", "xfs"));
    platform.partitions.push(partition("/dev/sdc1", "/backup", "xfs"));
    platform
        .usages
        .insert("/data".into(), usage("/data", "xfs", 10_000, 1_000));
    let platform = Arc::new(platform);

    let collector = DiskCollector::new(platform.clone());
    let metric = collector.collect(&CancellationToken::new()).await.unwrap();
    assert_eq!(platform.disk_usage_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(metric.capacity_source, CapacitySource::Root);
    assert_eq!(metric.mounts.len(), 2, "unresolved /backup is skipped");

    collector.collect(&CancellationToken::new()).await.unwrap();
    assert_eq!(platform.disk_usage_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn root_outside_partition_list_is_used_for_capacity_only() {
    let platform = FakePlatform {
        partitions: vec![partition("/dev/sdb1", "/data", "ext4")],
        usages: HashMap::from([
            ("/".to_string(), usage("/", "ext4", 1_000, 100)),
            ("/data".to_string(), usage("/data", "ext4", 4_000, 1_000)),
        ]),
        ..FakePlatform::default()
    };
    let metric = DiskCollector::new(Arc::new(platform))
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(metric.capacity_source, CapacitySource::Root);
    assert_eq!(metric.total, 1_000);
    assert_eq!(metric.mounts.len(), 1);
    assert_eq!(metric.mounts[0].path, "/data");
}

#[tokio::test]
async fn network_packet_rates_follow_counters() {
    let platform = Arc::new(FakePlatform::linux_host());
    let collector = NetworkCollector::new(platform.clone(), Arc::new(NetworkRateCalculator::default()))
        .with_outbound_lookup(no_outbound_route);

    collector.collect(&CancellationToken::new()).await.unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let mut eth0 = counter("eth0", 1_000, 2_000);
    eth0.packets_sent = 500;
    eth0.packets_recv = 900;
    platform.set_counters(vec![eth0]);
    let metric = collector.collect(&CancellationToken::new()).await.unwrap();

    let eth0 = &metric.interfaces[0];
    assert_eq!(eth0.packets_recv, 900);
    assert!(eth0.packets_sent_per_sec > 0.0);
    assert!(eth0.packets_recv_per_sec > eth0.packets_sent_per_sec);
    assert_eq!(eth0.throughput_bytes_per_sec, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_network_collections_share_one_interval_per_batch() {
    let platform = Arc::new(FakePlatform {
        counters: std::sync::Mutex::new(vec![counter("eth0", 0, 0), counter("eth1", 0, 0)]),
        grow_counters: true,
        ..FakePlatform::default()
    });
    let collector = Arc::new(
        NetworkCollector::new(platform, Arc::new(NetworkRateCalculator::default()))
            .with_outbound_lookup(no_outbound_route),
    );

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let collector = collector.clone();
        tasks.spawn(async move {
            let mut metrics = Vec::new();
            for _ in 0..25 {
                metrics.push(collector.collect(&CancellationToken::new()).await.unwrap());
                tokio::task::yield_now().await;
            }
            metrics
        });
    }

    let mut checked = 0;
    while let Some(metrics) = tasks.join_next().await {
        for metric in metrics.unwrap() {
            let eth0 = metric.interfaces.iter().find(|i| i.name == "eth0").unwrap();
            let eth1 = metric.interfaces.iter().find(|i| i.name == "eth1").unwrap();
            assert_eq!(eth0.throughput_bytes_per_sec, eth1.throughput_bytes_per_sec);
            assert_eq!(eth0.packets_recv_per_sec, eth1.packets_recv_per_sec);
            checked += 1;
        }
    }
    assert_eq!(checked, 16 * 25);
}

#[tokio::test]
async fn heartbeat_refreshes_last_seen() {
    let store = Arc::new(MemoryStore::default());
    let host = HostCollector::new(Arc::new(FakePlatform::linux_host()))
        .with_outbound_lookup(eth0_outbound_route)
        .collect(&CancellationToken::new())
        .await
        .unwrap();
    let id = store.upsert_host(&host).await.unwrap();
    store.touch_host(id, 1_000).await.unwrap();

    let heartbeat = HostHeartbeat::new(store.clone(), id);
    assert_eq!(heartbeat.name(), "host");
    heartbeat.collect_and_save(&CancellationToken::new()).await.unwrap();

    let record = store.get_host(id).await.unwrap().unwrap();
    assert!(record.last_seen > 1_000);
    assert!(record.is_online(unix_millis()));

    assert!(heartbeat.collect_and_save(&cancelled()).await.is_err());
    assert!(HostHeartbeat::new(store, id + 1)
        .collect_and_save(&CancellationToken::new())
        .await
        .is_err());
}
