//! Async channel ingestion: raw lines in, resolved timeline events out

use crate::identity::{Confidence, IdentityResolver};
use crate::model::{
    EntityId, ExceptionKind, ExceptionRecord, Segment, SourceSystem, TimelineEvent,
};
use crate::normalize::{normalize_record, NormalizeError, RawRecord};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// One raw line tagged with the adapter stream it came from
///
/// The tag matters for malformed lines: a record too broken to parse still
/// gets ledgered against the right source.
#[derive(Debug, Clone)]
pub struct AdapterLine {
    pub source: SourceSystem,
    pub line: String,
}

/// Everything ingestion hands to reconciliation
#[derive(Debug)]
pub struct IngestOutcome {
    pub events: Vec<TimelineEvent>,
    pub segments: BTreeMap<EntityId, Segment>,
    pub exceptions: Vec<ExceptionRecord>,
    pub records_seen: u64,
}

/// Drain the adapter channel into resolved, normalized timeline events
///
/// This task is the single writer for all identity decisions: every
/// resolve and merge for the run happens here, in arrival order, so the
/// same source key can never mint two entities. Runs until the channel
/// closes (all producers done).
///
/// Events are re-attributed through the resolver's redirect table after the
/// drain: a merge proven by record 10,000 retroactively moves the events of
/// record 1.
pub async fn ingest_stream(
    mut rx: mpsc::Receiver<AdapterLine>,
    fuzzy_threshold: f64,
) -> IngestOutcome {
    let mut resolver = IdentityResolver::new(fuzzy_threshold);
    let mut events: Vec<TimelineEvent> = Vec::new();
    let mut exceptions: Vec<ExceptionRecord> = Vec::new();
    let mut records_seen: u64 = 0;
    let mut malformed: u64 = 0;
    let mut seq: u64 = 0;

    while let Some(AdapterLine { source, line }) = rx.recv().await {
        records_seen += 1;
        if records_seen % 10_000 == 0 {
            log::debug!("ingested {} records...", records_seen);
        }

        let record = match RawRecord::from_jsonl(&line) {
            Ok(record) => record,
            Err(e) => {
                malformed += 1;
                exceptions.push(ExceptionRecord::new(
                    ExceptionKind::MalformedRecord,
                    source,
                    format!("unparseable record ({}): {}", e, truncate(&line, 120)),
                    salvage_timestamp(&line),
                ));
                continue;
            }
        };

        let resolution = resolver.resolve(
            record.source_system,
            &record.source_key,
            record.segment(),
            &record.hints,
            record.timestamp,
        );
        exceptions.extend(resolution.exceptions);

        match normalize_record(&record, resolution.entity, seq) {
            Ok(new_events) => {
                seq += new_events.len() as u64;
                events.extend(new_events);
            }
            Err(NormalizeError::MalformedRecord { source, detail }) => {
                malformed += 1;
                exceptions.push(
                    ExceptionRecord::new(
                        ExceptionKind::MalformedRecord,
                        source,
                        detail,
                        record.timestamp,
                    )
                    .with_entity(resolution.entity),
                );
            }
        }
    }

    // Retroactive re-attribution: merges discovered late move earlier events
    for event in &mut events {
        event.entity = resolver.canonical(event.entity);
    }
    let mut segments = BTreeMap::new();
    for event in &events {
        if let Some(segment) = resolver.segment_of(event.entity) {
            segments.insert(event.entity, segment);
        }
    }

    let low_confidence = resolver
        .identities()
        .iter()
        .filter(|i| i.confidence == Confidence::Low)
        .count();
    log::info!(
        "ingestion done: {} records, {} events, {} entities ({} low-confidence bindings), {} malformed, {} merges",
        records_seen,
        events.len(),
        resolver.entity_count(),
        low_confidence,
        malformed,
        resolver.merge_audits().len()
    );

    IngestOutcome {
        events,
        segments,
        exceptions,
        records_seen,
    }
}

/// Pull a timestamp out of an otherwise unparseable line so the exception
/// stays in data-time; 0 when nothing is salvageable
fn salvage_timestamp(line: &str) -> i64 {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("timestamp").and_then(|t| t.as_i64()))
        .unwrap_or(0)
}

fn truncate(line: &str, max: usize) -> &str {
    match line.char_indices().nth(max) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
