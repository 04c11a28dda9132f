//! Immutable reconciled timeline shared by the metric engines

use crate::model::{EntityId, ExceptionRecord, Segment, TimelineEvent};
use std::collections::{BTreeMap, BTreeSet};

/// One entity's reconciled event history, sorted chronologically
#[derive(Debug, Clone)]
pub struct EntityTimeline {
    pub segment: Segment,
    pub events: Vec<TimelineEvent>,
}

/// The output of one completed reconciliation pass
///
/// Engines receive this behind an `Arc` and never mutate it; a run that
/// needs different data produces a new snapshot. `end_ts` is the latest
/// event timestamp and serves as the snapshot's "now" for grace windows and
/// funnel maturity, keeping every derived number a function of the data
/// alone.
#[derive(Debug)]
pub struct TimelineSnapshot {
    pub entities: BTreeMap<EntityId, EntityTimeline>,
    pub exceptions: Vec<ExceptionRecord>,
    /// Entities with at least one unresolved exception
    pub flagged: BTreeSet<EntityId>,
    /// Unix seconds, UTC: max `occurred_at` across all events
    pub end_ts: i64,
}

impl TimelineSnapshot {
    pub fn event_count(&self) -> usize {
        self.entities.values().map(|t| t.events.len()).sum()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
