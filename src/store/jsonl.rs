//! JSONL snapshot writer - one directory per run, one file per output table

use super::backend::{round2, SnapshotTables, SnapshotWriterBackend, StoreError};
use async_trait::async_trait;
use serde_json::json;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Flat-file backend for consumers that ingest JSONL instead of SQLite
///
/// All-or-nothing publish is done by staging: tables are written into
/// `<base>/.staging_<run_id>/` and the directory is renamed to
/// `<base>/<run_id>/` only once every row is on disk. A crashed run leaves
/// a staging directory behind, never a half-visible snapshot.
pub struct JsonlSnapshotWriter {
    base_path: PathBuf,
}

impl JsonlSnapshotWriter {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        log::info!("jsonl snapshot writer ready at {}", base_path.display());
        Ok(Self { base_path })
    }

    fn write_table(
        dir: &PathBuf,
        name: &str,
        rows: Vec<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let file = fs::File::create(dir.join(format!("{}.jsonl", name)))?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            writeln!(writer, "{}", serde_json::to_string(&row)?)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotWriterBackend for JsonlSnapshotWriter {
    async fn publish(
        &mut self,
        run_id: &str,
        published_at: i64,
        tables: &SnapshotTables,
    ) -> Result<(), StoreError> {
        let final_dir = self.base_path.join(run_id);
        if final_dir.exists() {
            return Err(StoreError::Rejected(format!(
                "snapshot {} already published",
                run_id
            )));
        }

        let staging = self.base_path.join(format!(".staging_{}", run_id));
        fs::create_dir_all(&staging)?;

        Self::write_table(
            &staging,
            "retention_curve",
            tables
                .retention
                .iter()
                .map(|p| {
                    json!({
                        "cohort_month": p.cohort_month.to_string(),
                        "segment": p.segment.as_str(),
                        "period_offset": p.period_offset,
                        "cohort_size": p.cohort_size,
                        "active_count": p.active_count,
                        "retention_rate": p.retention_rate(),
                        "run_id": run_id,
                    })
                })
                .collect(),
        )?;

        Self::write_table(
            &staging,
            "ltv",
            tables
                .ltv
                .iter()
                .map(|r| {
                    json!({
                        "entity_id": r.entity.to_string(),
                        "as_of_month": r.as_of_month.to_string(),
                        "gross_revenue": round2(r.gross_revenue),
                        "net_revenue": round2(r.net_revenue),
                        "cumulative_net_ltv": round2(r.cumulative_net_ltv),
                        "has_unresolved_exception": r.has_unresolved_exception,
                        "run_id": run_id,
                    })
                })
                .collect(),
        )?;

        Self::write_table(
            &staging,
            "funnel",
            tables
                .funnel
                .iter()
                .map(|r| {
                    json!({
                        "cohort_month": r.cohort_month.to_string(),
                        "segment": r.segment.as_str(),
                        "stage": r.stage.as_str(),
                        "entity_count": r.entity_count,
                        "conversion_from_prior_stage": r.conversion_from_prior_stage,
                        "run_id": run_id,
                    })
                })
                .collect(),
        )?;

        Self::write_table(
            &staging,
            "exceptions",
            tables
                .exceptions
                .iter()
                .map(|e| {
                    json!({
                        "entity_id": e.entity.map(|id| id.to_string()),
                        "source_system": e.source_system.as_str(),
                        "kind": e.kind.as_str(),
                        "detail": e.detail,
                        "detected_at": e.detected_at,
                        "run_id": run_id,
                    })
                })
                .collect(),
        )?;

        Self::write_table(
            &staging,
            "runs",
            vec![json!({
                "run_id": run_id,
                "published_at": published_at,
                "config_json": tables.config_json,
            })],
        )?;

        fs::rename(&staging, &final_dir)?;
        log::info!(
            "published snapshot {} to {} ({} rows)",
            run_id,
            final_dir.display(),
            tables.row_count()
        );
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}
