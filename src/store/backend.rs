//! Writer backend trait for published snapshots

use crate::metrics::{FunnelRow, LtvRecord, RetentionPoint};
use crate::model::ExceptionRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Everything one run publishes, assembled before any write happens
#[derive(Debug, Default)]
pub struct SnapshotTables {
    pub retention: Vec<RetentionPoint>,
    pub ltv: Vec<LtvRecord>,
    pub funnel: Vec<FunnelRow>,
    pub exceptions: Vec<ExceptionRecord>,
    /// Serialized RunConfig, versioned alongside the numbers it produced
    pub config_json: String,
}

impl SnapshotTables {
    pub fn row_count(&self) -> usize {
        self.retention.len() + self.ltv.len() + self.funnel.len() + self.exceptions.len()
    }
}

/// Backend trait for publishing one immutable snapshot
///
/// `publish` is all-or-nothing: on error, no partial snapshot may remain
/// visible to consumers and the previous run's tables stay intact.
#[async_trait]
pub trait SnapshotWriterBackend: Send {
    async fn publish(
        &mut self,
        run_id: &str,
        published_at: i64,
        tables: &SnapshotTables,
    ) -> Result<(), StoreError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Unified writer that routes to the configured backend
pub enum SnapshotWriter {
    Sqlite(super::sqlite::SqliteSnapshotStore),
    Jsonl(super::jsonl::JsonlSnapshotWriter),
}

impl SnapshotWriter {
    pub fn new(
        backend: crate::config::BackendType,
        path: &str,
    ) -> Result<Self, StoreError> {
        match backend {
            crate::config::BackendType::Sqlite => Ok(SnapshotWriter::Sqlite(
                super::sqlite::SqliteSnapshotStore::new(path)?,
            )),
            crate::config::BackendType::Jsonl => Ok(SnapshotWriter::Jsonl(
                super::jsonl::JsonlSnapshotWriter::new(path)?,
            )),
        }
    }

    pub async fn publish(
        &mut self,
        run_id: &str,
        published_at: i64,
        tables: &SnapshotTables,
    ) -> Result<(), StoreError> {
        match self {
            SnapshotWriter::Sqlite(w) => w.publish(run_id, published_at, tables).await,
            SnapshotWriter::Jsonl(w) => w.publish(run_id, published_at, tables).await,
        }
    }

    pub fn backend_type(&self) -> &'static str {
        match self {
            SnapshotWriter::Sqlite(w) => w.backend_type(),
            SnapshotWriter::Jsonl(w) => w.backend_type(),
        }
    }
}

/// Round money to cents for publication
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
