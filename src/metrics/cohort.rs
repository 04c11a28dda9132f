//! Monthly acquisition cohorts and period-over-period retention

use crate::model::{MonthKey, Segment};
use crate::reconcile::TimelineSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One point on a cohort's retention curve
///
/// `cohort_size` is fixed at formation and never recomputed; `active_count`
/// counts cohort entities with at least one qualifying revenue event in the
/// offset month. Append-only per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPoint {
    pub cohort_month: MonthKey,
    pub segment: Segment,
    pub period_offset: u32,
    pub cohort_size: u64,
    pub active_count: u64,
}

impl RetentionPoint {
    pub fn retention_rate(&self) -> f64 {
        if self.cohort_size == 0 {
            0.0
        } else {
            self.active_count as f64 / self.cohort_size as f64
        }
    }
}

pub struct CohortEngine;

impl CohortEngine {
    /// Compute the full retention curve for every cohort in the snapshot
    ///
    /// Entities join the cohort of their first revenue event's month, per
    /// segment. Curves extend to the snapshot's last month, so a cohort
    /// with no recent activity still reports zero-active points; absence
    /// of a row and absence of activity must not be confused downstream.
    pub fn compute(snapshot: &TimelineSnapshot) -> Vec<RetentionPoint> {
        struct Accum {
            size: u64,
            active_per_offset: BTreeMap<u32, u64>,
        }

        let end_month = MonthKey::from_timestamp(snapshot.end_ts);
        let mut cohorts: BTreeMap<(MonthKey, Segment), Accum> = BTreeMap::new();

        for timeline in snapshot.entities.values() {
            let mut revenue_months: BTreeSet<MonthKey> = BTreeSet::new();
            for event in &timeline.events {
                if event.is_revenue() {
                    revenue_months.insert(event.month());
                }
            }
            // Merged or inactive identities without revenue form no cohort
            let Some(&cohort_month) = revenue_months.iter().next() else {
                continue;
            };

            let accum = cohorts
                .entry((cohort_month, timeline.segment))
                .or_insert_with(|| Accum {
                    size: 0,
                    active_per_offset: BTreeMap::new(),
                });
            accum.size += 1;
            for month in revenue_months {
                let offset = month.offset_from(cohort_month) as u32;
                *accum.active_per_offset.entry(offset).or_insert(0) += 1;
            }
        }

        let mut points = Vec::new();
        for ((cohort_month, segment), accum) in cohorts {
            let max_offset = end_month.offset_from(cohort_month).max(0) as u32;
            for offset in 0..=max_offset {
                points.push(RetentionPoint {
                    cohort_month,
                    segment,
                    period_offset: offset,
                    cohort_size: accum.size,
                    active_count: accum.active_per_offset.get(&offset).copied().unwrap_or(0),
                });
            }
        }

        log::info!(
            "computed retention for {} cohort-months ({} points)",
            points
                .iter()
                .filter(|p| p.period_offset == 0)
                .count(),
            points.len()
        );
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        EntityId, EventKind, SourceSystem, TimelineEvent,
    };
    use crate::reconcile::EntityTimeline;
    use std::collections::{BTreeMap, BTreeSet};

    // 2023-01-15, 2023-02-15, 2023-03-15 (UTC)
    const JAN: i64 = 1673740800;
    const FEB: i64 = 1676419200;
    const MAR: i64 = 1678838400;

    fn order(entity: u64, occurred_at: i64, seq: u64) -> TimelineEvent {
        TimelineEvent {
            entity: EntityId(entity),
            kind: EventKind::Order,
            source_system: SourceSystem::Storefront,
            occurred_at,
            amount_gross: 50.0,
            amount_cogs: Some(20.0),
            amount_discount: 0.0,
            product_id: Some("P001".to_string()),
            funnel_stage: None,
            sequence: seq,
            corroborated_by: Vec::new(),
        }
    }

    fn snapshot_of(entities: Vec<(u64, Segment, Vec<TimelineEvent>)>) -> TimelineSnapshot {
        let end_ts = entities
            .iter()
            .flat_map(|(_, _, evs)| evs.iter().map(|e| e.occurred_at))
            .max()
            .unwrap_or(0);
        TimelineSnapshot {
            entities: entities
                .into_iter()
                .map(|(id, segment, events)| {
                    (EntityId(id), EntityTimeline { segment, events })
                })
                .collect::<BTreeMap<_, _>>(),
            exceptions: Vec::new(),
            flagged: BTreeSet::new(),
            end_ts,
        }
    }

    #[test]
    fn test_formation_period_is_fully_active() {
        let snapshot = snapshot_of(vec![
            (1, Segment::D2c, vec![order(1, JAN, 0)]),
            (2, Segment::D2c, vec![order(2, JAN + 3600, 0), order(2, MAR, 1)]),
        ]);

        let points = CohortEngine::compute(&snapshot);
        let p0 = points
            .iter()
            .find(|p| p.period_offset == 0)
            .expect("period 0 exists");

        assert_eq!(p0.cohort_size, 2);
        assert_eq!(p0.active_count, 2);
        assert_eq!(p0.retention_rate(), 1.0);
    }

    #[test]
    fn test_single_event_entity_stays_in_denominator() {
        let snapshot = snapshot_of(vec![
            (1, Segment::D2c, vec![order(1, JAN, 0)]),
            (2, Segment::D2c, vec![order(2, JAN, 0), order(2, MAR, 1)]),
        ]);

        let points = CohortEngine::compute(&snapshot);
        let offset2 = points
            .iter()
            .find(|p| p.period_offset == 2)
            .expect("offset 2 exists");

        // Entity 1 never returned: still in the denominator, not the numerator
        assert_eq!(offset2.cohort_size, 2);
        assert_eq!(offset2.active_count, 1);
        assert_eq!(offset2.retention_rate(), 0.5);
    }

    #[test]
    fn test_active_count_never_exceeds_cohort_size() {
        let snapshot = snapshot_of(vec![
            (1, Segment::D2c, vec![order(1, JAN, 0), order(1, FEB, 1), order(1, FEB + 60, 2)]),
            (2, Segment::D2c, vec![order(2, JAN, 0), order(2, MAR, 1)]),
        ]);

        for point in CohortEngine::compute(&snapshot) {
            assert!(point.active_count <= point.cohort_size);
        }
    }

    #[test]
    fn test_segments_form_independent_cohorts() {
        let snapshot = snapshot_of(vec![
            (1, Segment::D2c, vec![order(1, JAN, 0)]),
            (2, Segment::B2b, vec![order(2, JAN, 0)]),
        ]);

        let points = CohortEngine::compute(&snapshot);
        let d2c: Vec<_> = points.iter().filter(|p| p.segment == Segment::D2c).collect();
        let b2b: Vec<_> = points.iter().filter(|p| p.segment == Segment::B2b).collect();

        assert_eq!(d2c.iter().find(|p| p.period_offset == 0).unwrap().cohort_size, 1);
        assert_eq!(b2b.iter().find(|p| p.period_offset == 0).unwrap().cohort_size, 1);
    }

    #[test]
    fn test_quiet_months_emit_zero_active_points() {
        let snapshot = snapshot_of(vec![(
            1,
            Segment::D2c,
            vec![order(1, JAN, 0), order(1, MAR, 1)],
        )]);

        let points = CohortEngine::compute(&snapshot);
        // January cohort, curve through March: offsets 0, 1, 2
        assert_eq!(points.len(), 3);
        let offset1 = points.iter().find(|p| p.period_offset == 1).unwrap();
        assert_eq!(offset1.active_count, 0);
        assert_eq!(offset1.cohort_size, 1);
    }

    #[test]
    fn test_re_engagement_allowed() {
        // Retention is not forced to decrease: quiet February, active March
        let snapshot = snapshot_of(vec![
            (1, Segment::D2c, vec![order(1, JAN, 0), order(1, MAR, 1)]),
            (2, Segment::D2c, vec![order(2, JAN, 0), order(2, MAR, 2)]),
        ]);

        let points = CohortEngine::compute(&snapshot);
        let rate = |offset: u32| {
            points
                .iter()
                .find(|p| p.period_offset == offset)
                .unwrap()
                .retention_rate()
        };

        assert_eq!(rate(1), 0.0);
        assert_eq!(rate(2), 1.0);
    }
}
