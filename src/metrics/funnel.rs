//! Funnel stage attribution and stage-to-stage conversion

use crate::config::RunConfig;
use crate::model::{EntityId, EventKind, FunnelStage, MonthKey, Segment};
use crate::reconcile::TimelineSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stage reached by one entity
///
/// `inferred` marks stages backfilled from later evidence: a conversion
/// without an observed engagement still implies activation happened, and
/// hiding that would undercount the funnel. The inference stays visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelStageRecord {
    pub entity: EntityId,
    pub stage: FunnelStage,
    /// Unix seconds, UTC
    pub reached_at: i64,
    /// Sequence number of the timeline event that evidenced the stage; for
    /// inferred stages, the later event the inference came from
    pub source_sequence: u64,
    pub inferred: bool,
}

/// Aggregated funnel row per cohort, segment, and stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelRow {
    pub cohort_month: MonthKey,
    pub segment: Segment,
    pub stage: FunnelStage,
    pub entity_count: u64,
    /// Reached-this-stage / reached-prior-stage over mature entities;
    /// `None` for acquisition and for empty mature denominators
    pub conversion_from_prior_stage: Option<f64>,
}

pub struct FunnelEngine {
    activation_window_secs: i64,
    maturity_secs: i64,
}

impl FunnelEngine {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            activation_window_secs: config.activation_window_secs(),
            maturity_secs: config.funnel_maturity_secs(),
        }
    }

    /// Attribute every entity to the stages it reached and aggregate
    /// conversion rates per acquisition cohort
    pub fn compute(
        &self,
        snapshot: &TimelineSnapshot,
    ) -> (Vec<FunnelStageRecord>, Vec<FunnelRow>) {
        let mut records = Vec::new();

        struct Accum {
            // reached / mature-reached, indexed by stage position
            reached: [u64; 4],
            mature: [u64; 4],
        }
        let mut cohorts: BTreeMap<(MonthKey, Segment), Accum> = BTreeMap::new();

        for (&entity, timeline) in &snapshot.entities {
            let stages = self.stages_for(entity, timeline.events.as_slice());
            let Some(acquisition) = stages.first() else {
                continue;
            };
            debug_assert_eq!(acquisition.stage, FunnelStage::Acquisition);

            let cohort_month = MonthKey::from_timestamp(acquisition.reached_at);
            let is_mature = snapshot.end_ts - acquisition.reached_at >= self.maturity_secs;

            let accum = cohorts
                .entry((cohort_month, timeline.segment))
                .or_insert_with(|| Accum {
                    reached: [0; 4],
                    mature: [0; 4],
                });
            for record in &stages {
                let idx = record.stage as usize;
                accum.reached[idx] += 1;
                if is_mature {
                    accum.mature[idx] += 1;
                }
            }

            records.extend(stages);
        }

        let mut rows = Vec::new();
        for ((cohort_month, segment), accum) in cohorts {
            for stage in FunnelStage::all() {
                let idx = stage as usize;
                let conversion = stage.prior().and_then(|prior| {
                    let denom = accum.mature[prior as usize];
                    if denom == 0 {
                        None
                    } else {
                        Some(accum.mature[idx] as f64 / denom as f64)
                    }
                });
                rows.push(FunnelRow {
                    cohort_month,
                    segment,
                    stage,
                    entity_count: accum.reached[idx],
                    conversion_from_prior_stage: conversion,
                });
            }
        }

        log::info!(
            "computed funnel for {} cohort-months ({} stage records)",
            rows.len() / 4,
            records.len()
        );
        (records, rows)
    }

    /// Stage records for one entity, in stage order
    fn stages_for(
        &self,
        entity: EntityId,
        events: &[crate::model::TimelineEvent],
    ) -> Vec<FunnelStageRecord> {
        let Some(first) = events.first() else {
            return Vec::new();
        };
        let acquired_at = first.occurred_at;

        let mut records = vec![FunnelStageRecord {
            entity,
            stage: FunnelStage::Acquisition,
            reached_at: acquired_at,
            source_sequence: first.sequence,
            inferred: false,
        }];

        // Activation: engagement (or a CRM activation stage hint) within the
        // window after acquisition
        let activation = events.iter().find(|e| {
            let is_usage = e.kind == EventKind::Engagement
                || (e.kind == EventKind::CrmStageChange
                    && e.funnel_stage == Some(FunnelStage::Activation));
            is_usage && e.occurred_at - acquired_at <= self.activation_window_secs
        });

        let conversion = events.iter().find(|e| e.is_revenue());

        match (activation, conversion) {
            (Some(act), _) => records.push(FunnelStageRecord {
                entity,
                stage: FunnelStage::Activation,
                reached_at: act.occurred_at,
                source_sequence: act.sequence,
                inferred: false,
            }),
            // Sparse instrumentation: conversion proves activation happened
            (None, Some(conv)) => records.push(FunnelStageRecord {
                entity,
                stage: FunnelStage::Activation,
                reached_at: conv.occurred_at,
                source_sequence: conv.sequence,
                inferred: true,
            }),
            (None, None) => {}
        }

        if let Some(conv) = conversion {
            records.push(FunnelStageRecord {
                entity,
                stage: FunnelStage::Conversion,
                reached_at: conv.occurred_at,
                source_sequence: conv.sequence,
                inferred: false,
            });

            let conv_month = conv.month();
            let repeat = events
                .iter()
                .find(|e| e.is_revenue() && e.month() != conv_month);
            if let Some(rep) = repeat {
                records.push(FunnelStageRecord {
                    entity,
                    stage: FunnelStage::Repeat,
                    reached_at: rep.occurred_at,
                    source_sequence: rep.sequence,
                    inferred: false,
                });
            }
        }

        records
    }
}
