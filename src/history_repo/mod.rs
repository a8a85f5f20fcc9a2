// SQLite persistence: per-domain snapshot history and the host registry.

mod blob;

use crate::models::{HostInfo, MetricKind, unix_millis};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// One stored snapshot. `payload` is the snapshot's own binary encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub kind: MetricKind,
    pub host_id: i64,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

/// Persistence interface used by the domain services.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, record: &SnapshotRecord) -> anyhow::Result<()>;

    /// Most recent record of `kind`, optionally restricted to one host.
    async fn latest(
        &self,
        kind: MetricKind,
        host_id: Option<i64>,
    ) -> anyhow::Result<Option<SnapshotRecord>>;

    /// Records of `kind` with `from_ms <= timestamp <= to_ms`, oldest first.
    async fn range(
        &self,
        kind: MetricKind,
        from_ms: u64,
        to_ms: u64,
        host_id: Option<i64>,
    ) -> anyhow::Result<Vec<SnapshotRecord>>;
}

/// A host counts as online while its last heartbeat is at most this old.
pub const ONLINE_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub id: i64,
    #[serde(flatten)]
    pub info: HostInfo,
    /// Unix milliseconds of the last registration or heartbeat.
    pub last_seen: u64,
}

impl HostRecord {
    pub fn seconds_since_seen(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen) / 1000
    }

    pub fn is_online(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen) <= ONLINE_WINDOW.as_millis() as u64
    }
}

/// Registered hosts and their liveness.
#[async_trait]
pub trait HostRegistry: Send + Sync {
    /// Inserts or refreshes the host keyed by MAC address and returns its id.
    async fn upsert_host(&self, info: &HostInfo) -> anyhow::Result<i64>;

    /// Records that host `id` was seen at `seen_at` (unix milliseconds).
    async fn touch_host(&self, id: i64, seen_at: u64) -> anyhow::Result<()>;

    async fn get_host(&self, id: i64) -> anyhow::Result<Option<HostRecord>>;

    async fn list_hosts(&self) -> anyhow::Result<Vec<HostRecord>>;
}

pub struct HistoryRepo {
    pool: SqlitePool,
    retention_ms: i64,
}

impl HistoryRepo {
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        retention_days: u32,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        let retention_ms = (retention_days as i64) * 24 * 60 * 60 * 1000;
        Ok(Self { pool, retention_ms })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mac_address TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                ipv4 TEXT NOT NULL,
                info BLOB NOT NULL,
                last_seen INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                data BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metric_history_kind_created ON metric_history(kind, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes snapshots older than the retention window. Returns the number of rows removed.
    #[instrument(skip(self), fields(repo = "history", operation = "prune_old_data"))]
    pub async fn prune_old_data(&self) -> anyhow::Result<u64> {
        let cutoff = unix_millis() as i64 - self.retention_ms;
        let result = sqlx::query("DELETE FROM metric_history WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Prunes on a fixed period until `cancel` fires.
    pub fn spawn_pruner(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match self.prune_old_data().await {
                            Ok(n) => tracing::debug!(operation = "prune_old_data", rows = n, "Old data pruned"),
                            Err(e) => tracing::warn!(error = %e, operation = "prune_old_data", "Failed to prune old data"),
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::debug!("Pruner shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn parse_host_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<HostRecord> {
        let id: i64 = row.try_get("id")?;
        let data: Vec<u8> = row.try_get("info")?;
        let last_seen: i64 = row.try_get("last_seen")?;
        let payload = blob::blob_payload(&data, blob::BLOB_VERSION)
            .ok_or_else(|| anyhow::anyhow!("host {}: unknown blob version", id))?;
        let info = wincode::deserialize::<HostInfo>(payload)
            .map_err(|e| anyhow::anyhow!("wincode deserialize host: {}", e))?;
        Ok(HostRecord {
            id,
            info,
            last_seen: last_seen as u64,
        })
    }

    fn parse_snapshot_row(
        kind: MetricKind,
        row: &sqlx::sqlite::SqliteRow,
    ) -> anyhow::Result<Option<SnapshotRecord>> {
        let host_id: i64 = row.try_get("host_id")?;
        let created_at: i64 = row.try_get("created_at")?;
        let data: Vec<u8> = row.try_get("data")?;
        let Some(payload) = blob::blob_payload(&data, blob::BLOB_VERSION) else {
            tracing::debug!(kind = %kind, created_at, "unknown snapshot blob version, skipping");
            return Ok(None);
        };
        Ok(Some(SnapshotRecord {
            kind,
            host_id,
            timestamp: created_at as u64,
            payload: payload.to_vec(),
        }))
    }
}

#[async_trait]
impl SnapshotStore for HistoryRepo {
    #[instrument(skip(self, record), fields(repo = "history", operation = "save", kind = %record.kind))]
    async fn save(&self, record: &SnapshotRecord) -> anyhow::Result<()> {
        let data = blob::with_version_prefix(blob::BLOB_VERSION, &record.payload);
        sqlx::query(
            "INSERT INTO metric_history (host_id, kind, created_at, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.host_id)
        .bind(record.kind.as_str())
        .bind(record.timestamp as i64)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "history", operation = "latest"))]
    async fn latest(
        &self,
        kind: MetricKind,
        host_id: Option<i64>,
    ) -> anyhow::Result<Option<SnapshotRecord>> {
        let row = sqlx::query(
            "SELECT host_id, created_at, data FROM metric_history
             WHERE kind = $1 AND ($2 IS NULL OR host_id = $2)
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(host_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Self::parse_snapshot_row(kind, &row),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(repo = "history", operation = "range"))]
    async fn range(
        &self,
        kind: MetricKind,
        from_ms: u64,
        to_ms: u64,
        host_id: Option<i64>,
    ) -> anyhow::Result<Vec<SnapshotRecord>> {
        let rows = sqlx::query(
            "SELECT host_id, created_at, data FROM metric_history
             WHERE kind = $1 AND created_at >= $2 AND created_at <= $3 AND ($4 IS NULL OR host_id = $4)
             ORDER BY created_at ASC, id ASC",
        )
        .bind(kind.as_str())
        .bind(from_ms as i64)
        .bind(to_ms as i64)
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(record) = Self::parse_snapshot_row(kind, row)? {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl HostRegistry for HistoryRepo {
    #[instrument(skip(self, info), fields(repo = "history", operation = "upsert_host", mac = %info.mac_address))]
    async fn upsert_host(&self, info: &HostInfo) -> anyhow::Result<i64> {
        anyhow::ensure!(!info.mac_address.is_empty(), "host MAC address is empty");
        let blob = blob::with_version_prefix(
            blob::BLOB_VERSION,
            &wincode::serialize(info).map_err(|e| anyhow::anyhow!("wincode host: {}", e))?,
        );
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO hosts (mac_address, name, ipv4, info, last_seen)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(mac_address) DO UPDATE SET
                name = excluded.name,
                ipv4 = excluded.ipv4,
                info = excluded.info,
                last_seen = excluded.last_seen
            RETURNING id
            "#,
        )
        .bind(&info.mac_address)
        .bind(&info.name)
        .bind(&info.ipv4)
        .bind(&blob)
        .bind(unix_millis() as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    #[instrument(skip(self), fields(repo = "history", operation = "touch_host"))]
    async fn touch_host(&self, id: i64, seen_at: u64) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE hosts SET last_seen = $1 WHERE id = $2")
            .bind(seen_at as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        anyhow::ensure!(result.rows_affected() == 1, "host {} is not registered", id);
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "history", operation = "get_host"))]
    async fn get_host(&self, id: i64) -> anyhow::Result<Option<HostRecord>> {
        let row = sqlx::query("SELECT id, info, last_seen FROM hosts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::parse_host_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(repo = "history", operation = "list_hosts"))]
    async fn list_hosts(&self) -> anyhow::Result<Vec<HostRecord>> {
        let rows = sqlx::query("SELECT id, info, last_seen FROM hosts ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::parse_host_row).collect()
    }
}
