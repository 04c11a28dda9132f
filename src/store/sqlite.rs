//! SQLite snapshot store

use super::backend::{round2, SnapshotTables, SnapshotWriterBackend, StoreError};
use super::schema;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite implementation of the metrics store
///
/// One database holds every published run; rows are append-only and keyed
/// by run id. Publish wraps all tables in a single transaction, so a failed
/// run rolls back completely and the last good snapshot keeps serving.
pub struct SqliteSnapshotStore {
    conn: Connection,
}

impl SqliteSnapshotStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        for table in schema::ALL_TABLES {
            conn.execute_batch(&table.create_sql())?;
        }

        log::info!("sqlite snapshot store ready");
        Ok(Self { conn })
    }

    /// The most recently published run, if any
    pub fn latest_run_id(&self) -> Result<Option<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT run_id FROM runs ORDER BY published_at DESC, run_id DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn write_all(
        &mut self,
        run_id: &str,
        published_at: i64,
        tables: &SnapshotTables,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            &schema::RUNS.insert_sql(),
            params![run_id, published_at, tables.config_json],
        )?;

        {
            let mut stmt = tx.prepare(&schema::RETENTION_CURVE.insert_sql())?;
            for point in &tables.retention {
                stmt.execute(params![
                    point.cohort_month.to_string(),
                    point.segment.as_str(),
                    point.period_offset,
                    point.cohort_size as i64,
                    point.active_count as i64,
                    point.retention_rate(),
                    run_id,
                ])?;
            }

            let mut stmt = tx.prepare(&schema::LTV.insert_sql())?;
            for record in &tables.ltv {
                stmt.execute(params![
                    record.entity.to_string(),
                    record.as_of_month.to_string(),
                    round2(record.gross_revenue),
                    round2(record.net_revenue),
                    round2(record.cumulative_net_ltv),
                    record.has_unresolved_exception as i64,
                    run_id,
                ])?;
            }

            let mut stmt = tx.prepare(&schema::FUNNEL.insert_sql())?;
            for row in &tables.funnel {
                stmt.execute(params![
                    row.cohort_month.to_string(),
                    row.segment.as_str(),
                    row.stage.as_str(),
                    row.entity_count as i64,
                    row.conversion_from_prior_stage,
                    run_id,
                ])?;
            }

            let mut stmt = tx.prepare(&schema::EXCEPTIONS.insert_sql())?;
            for exc in &tables.exceptions {
                stmt.execute(params![
                    exc.entity.map(|e| e.to_string()),
                    exc.source_system.as_str(),
                    exc.kind.as_str(),
                    exc.detail,
                    exc.detected_at,
                    run_id,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotWriterBackend for SqliteSnapshotStore {
    async fn publish(
        &mut self,
        run_id: &str,
        published_at: i64,
        tables: &SnapshotTables,
    ) -> Result<(), StoreError> {
        self.write_all(run_id, published_at, tables)?;
        log::info!(
            "published snapshot {} ({} rows across 4 tables)",
            run_id,
            tables.row_count()
        );
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
