//! One full reconciliation-and-metrics run

use super::ingestion::{ingest_stream, AdapterLine};
use crate::config::{ConfigError, RunConfig};
use crate::metrics::{CogsRateTable, CohortEngine, FunnelEngine, LtvEngine};
use crate::metrics::ltv::RateTableError;
use crate::normalize::JsonlFileSource;
use crate::reconcile::{QualityReport, ReconciliationValidator, TimelineSnapshot};
use crate::store::{SnapshotTables, SnapshotWriter, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Run-level failures: fatal to the run, block publish entirely
///
/// Per-entity and per-event problems never show up here; they go to the
/// exception ledger and the run publishes anyway.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    RateTable(#[from] RateTableError),
    #[error("adapter streams produced no usable events; refusing to publish")]
    EmptyStream,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub records_seen: u64,
    pub entity_count: usize,
    pub event_count: usize,
    pub exception_count: usize,
}

pub struct PipelineRun {
    config: RunConfig,
}

impl PipelineRun {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Execute one full batch run over the given adapter extracts
    ///
    /// Sources are drained in declared order through a single ingestion
    /// task, so identity decisions are serialized and the run is
    /// reproducible for unchanged inputs.
    pub async fn execute(&self, sources: Vec<JsonlFileSource>) -> Result<RunSummary, RunError> {
        let (tx, rx) = mpsc::channel::<AdapterLine>(self.config.channel_buffer);
        let ingest = tokio::spawn(ingest_stream(rx, self.config.fuzzy_match_threshold));

        for source in &sources {
            let system = source.source();
            for line in source.read_lines().await? {
                let message = AdapterLine { source: system, line };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        }
        drop(tx);

        let outcome = ingest.await.expect("ingestion task panicked");
        if outcome.records_seen == 0 {
            return Err(RunError::EmptyStream);
        }

        let validator = ReconciliationValidator::new(&self.config);
        let snapshot = Arc::new(validator.reconcile(
            outcome.events,
            &outcome.segments,
            outcome.exceptions,
        ));
        if snapshot.is_empty() {
            return Err(RunError::EmptyStream);
        }

        let rates = match self.config.cogs_rates_path.as_deref() {
            Some(path) => CogsRateTable::from_json_file(path)?,
            None => CogsRateTable::empty(),
        };

        let tables = compute_tables(&self.config, snapshot.clone(), rates).await?;

        let quality = QualityReport::new(&tables.exceptions, outcome.records_seen);
        for line in quality.render().lines() {
            log::info!("{}", line);
        }

        let run_id = next_run_id();
        let published_at = chrono::Utc::now().timestamp();
        let mut writer = SnapshotWriter::new(self.config.backend, &self.config.output_path)?;

        log::info!(
            "publishing {} via {} backend",
            run_id,
            writer.backend_type()
        );
        writer.publish(&run_id, published_at, &tables).await?;

        Ok(RunSummary {
            run_id,
            records_seen: outcome.records_seen,
            entity_count: snapshot.entity_count(),
            event_count: snapshot.event_count(),
            exception_count: tables.exceptions.len(),
        })
    }
}

/// Run ids: wall-clock millis plus a process-wide counter, so two runs in
/// the same millisecond still publish under distinct ids
fn next_run_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "run_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Fan the three engines out over one immutable snapshot
///
/// Engines are pure and read-only; each runs on a blocking worker against
/// the same `Arc`, which is what guarantees consistent cross-metric totals.
pub async fn compute_tables(
    config: &RunConfig,
    snapshot: Arc<TimelineSnapshot>,
    rates: CogsRateTable,
) -> Result<SnapshotTables, RunError> {
    let cohort_snapshot = snapshot.clone();
    let retention =
        tokio::task::spawn_blocking(move || CohortEngine::compute(&cohort_snapshot));

    let ltv_snapshot = snapshot.clone();
    let ltv = tokio::task::spawn_blocking(move || {
        LtvEngine::new(rates).compute(&ltv_snapshot)
    });

    let funnel_snapshot = snapshot.clone();
    let funnel_engine = FunnelEngine::new(config);
    let funnel =
        tokio::task::spawn_blocking(move || funnel_engine.compute(&funnel_snapshot));

    let (retention, ltv, funnel) = tokio::join!(retention, ltv, funnel);
    let retention = retention.expect("cohort engine panicked");
    let ltv = ltv.expect("ltv engine panicked");
    let (_stage_records, funnel_rows) = funnel.expect("funnel engine panicked");

    let mut exceptions = snapshot.exceptions.clone();
    exceptions.extend(ltv.exceptions);

    Ok(SnapshotTables {
        retention,
        ltv: ltv.records,
        funnel: funnel_rows,
        exceptions,
        config_json: serde_json::to_string(config)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::model::{EntityId, EventKind, Segment, SourceSystem, TimelineEvent};
    use crate::reconcile::EntityTimeline;
    use std::collections::{BTreeMap, BTreeSet};

    fn snapshot() -> Arc<TimelineSnapshot> {
        let event = TimelineEvent {
            entity: EntityId(1),
            kind: EventKind::Order,
            source_system: SourceSystem::Storefront,
            occurred_at: 1700000000,
            amount_gross: 100.0,
            amount_cogs: Some(40.0),
            amount_discount: 10.0,
            product_id: Some("P001".to_string()),
            funnel_stage: None,
            sequence: 0,
            corroborated_by: Vec::new(),
        };
        let mut entities = BTreeMap::new();
        entities.insert(
            EntityId(1),
            EntityTimeline {
                segment: Segment::D2c,
                events: vec![event],
            },
        );
        Arc::new(TimelineSnapshot {
            entities,
            exceptions: Vec::new(),
            flagged: BTreeSet::new(),
            end_ts: 1700000000,
        })
    }

    #[tokio::test]
    async fn test_compute_tables_is_idempotent() {
        let config = config::test_config();
        let snap = snapshot();

        let first = compute_tables(&config, snap.clone(), CogsRateTable::empty())
            .await
            .unwrap();
        let second = compute_tables(&config, snap, CogsRateTable::empty())
            .await
            .unwrap();

        // Byte-identical modulo run_id/published_at, which are not in scope here
        assert_eq!(
            serde_json::to_string(&first.retention).unwrap(),
            serde_json::to_string(&second.retention).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&first.ltv).unwrap(),
            serde_json::to_string(&second.ltv).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&first.funnel).unwrap(),
            serde_json::to_string(&second.funnel).unwrap()
        );
        assert_eq!(first.exceptions.len(), second.exceptions.len());
    }

    #[tokio::test]
    async fn test_cross_metric_totals_agree() {
        let config = config::test_config();
        let tables = compute_tables(&config, snapshot(), CogsRateTable::empty())
            .await
            .unwrap();

        assert_eq!(tables.retention.len(), 1);
        assert_eq!(tables.ltv.len(), 1);
        assert_eq!(tables.ltv[0].net_revenue, 50.0);
        // Same single entity visible to every engine
        assert_eq!(tables.retention[0].cohort_size, 1);
        let conversion = tables
            .funnel
            .iter()
            .find(|r| r.stage == crate::model::FunnelStage::Conversion)
            .unwrap();
        assert_eq!(conversion.entity_count, 1);
    }
}
