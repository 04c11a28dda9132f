//! Duplicate collapse, conflict detection, and orphan detection

use super::snapshot::{EntityTimeline, TimelineSnapshot};
use crate::config::RunConfig;
use crate::model::{
    EntityId, EventKind, ExceptionKind, ExceptionRecord, Segment, TimelineEvent,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub struct ReconciliationValidator {
    duplicate_window_secs: i64,
    grace_secs: i64,
    conflict_epsilon: f64,
}

impl ReconciliationValidator {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            duplicate_window_secs: config.duplicate_window_secs(),
            grace_secs: config.orphan_grace_secs(),
            conflict_epsilon: config.conflict_epsilon,
        }
    }

    /// Reconcile normalized events into an immutable snapshot
    ///
    /// `exceptions` seeds the ledger with what upstream stages already found
    /// (malformed records, ambiguous identities, merge audits); this pass
    /// appends conflicts and orphans, then freezes everything.
    pub fn reconcile(
        &self,
        events: Vec<TimelineEvent>,
        segments: &BTreeMap<EntityId, Segment>,
        mut exceptions: Vec<ExceptionRecord>,
    ) -> TimelineSnapshot {
        let end_ts = events.iter().map(|e| e.occurred_at).max().unwrap_or(0);

        let mut grouped: BTreeMap<EntityId, Vec<TimelineEvent>> = BTreeMap::new();
        for event in events {
            grouped.entry(event.entity).or_default().push(event);
        }

        let mut entities = BTreeMap::new();
        for (entity, mut timeline) in grouped {
            timeline.sort_by_key(|e| e.order_key());
            let segment = segments.get(&entity).copied().unwrap_or(Segment::D2c);
            let reconciled =
                self.reconcile_entity(entity, segment, timeline, end_ts, &mut exceptions);
            entities.insert(
                entity,
                EntityTimeline {
                    segment,
                    events: reconciled,
                },
            );
        }

        let flagged: BTreeSet<EntityId> = exceptions
            .iter()
            .filter(|e| e.kind.flags_entity())
            .filter_map(|e| e.entity)
            .collect();

        log::info!(
            "reconciled {} entities, {} events, {} exceptions ({} entities flagged)",
            entities.len(),
            entities.values().map(|t: &EntityTimeline| t.events.len()).sum::<usize>(),
            exceptions.len(),
            flagged.len()
        );

        TimelineSnapshot {
            entities,
            exceptions,
            flagged,
            end_ts,
        }
    }

    fn reconcile_entity(
        &self,
        entity: EntityId,
        segment: Segment,
        timeline: Vec<TimelineEvent>,
        end_ts: i64,
        exceptions: &mut Vec<ExceptionRecord>,
    ) -> Vec<TimelineEvent> {
        let mut slots: Vec<Option<TimelineEvent>> = timeline.into_iter().map(Some).collect();
        // Indices of revenue events that found a counterpart in another source
        let mut settled: HashSet<usize> = HashSet::new();

        self.collapse_order_pairs(segment, &mut slots, &mut settled);
        self.match_payments(entity, &mut slots, &mut settled, exceptions);
        self.detect_orphans(entity, &slots, &settled, end_ts, exceptions);

        slots.into_iter().flatten().collect()
    }

    /// The same order reported by two sources collapses into the
    /// order-of-record source's event, with provenance kept
    fn collapse_order_pairs(
        &self,
        segment: Segment,
        slots: &mut [Option<TimelineEvent>],
        settled: &mut HashSet<usize>,
    ) {
        let record_source = segment.source_of_record();
        for i in 0..slots.len() {
            if !slots[i]
                .as_ref()
                .is_some_and(|e| e.kind == EventKind::Order && e.is_revenue())
            {
                continue;
            }

            for j in (i + 1)..slots.len() {
                // Re-read each pass: a collapse may have replaced the anchor
                let anchor = slots[i].clone().expect("anchor present");
                let Some(other) = slots[j].as_ref() else { continue };
                if other.occurred_at - anchor.occurred_at > self.duplicate_window_secs {
                    break;
                }
                if other.kind != EventKind::Order
                    || !other.is_revenue()
                    || other.source_system == anchor.source_system
                    || relative_diff(anchor.amount_gross, other.amount_gross)
                        > self.conflict_epsilon
                {
                    continue;
                }

                let other = slots[j].take().expect("slot checked above");
                let canonical = slots[i].as_mut().expect("anchor present");
                if other.source_system == record_source && canonical.source_system != record_source
                {
                    // Keep the order-of-record amounts, remember every
                    // superseded source
                    let mut provenance = std::mem::take(&mut canonical.corroborated_by);
                    provenance.push(canonical.source_system);
                    *canonical = TimelineEvent {
                        sequence: canonical.sequence,
                        ..other
                    };
                    canonical.corroborated_by.extend(provenance);
                } else {
                    canonical.corroborated_by.push(other.source_system);
                }
                settled.insert(i);
                log::debug!(
                    "collapsed duplicate order for {} ({} corroborates)",
                    canonical.entity,
                    canonical.corroborated_by.last().map(|s| s.as_str()).unwrap_or("?")
                );
            }
        }
    }

    /// Match payments to orders: compatible amounts collapse as duplicates,
    /// incompatible amounts are conflicts (order-of-record amount kept)
    fn match_payments(
        &self,
        entity: EntityId,
        slots: &mut [Option<TimelineEvent>],
        settled: &mut HashSet<usize>,
        exceptions: &mut Vec<ExceptionRecord>,
    ) {
        // Orders that already absorbed a payment: a second payment against
        // the same order is new money, not another duplicate
        let mut paid: HashSet<usize> = HashSet::new();

        for p in 0..slots.len() {
            let Some(payment) = slots[p].clone() else { continue };
            if !(payment.kind == EventKind::Payment && payment.is_revenue()) {
                continue;
            }

            // Best unconsumed order in the window: closest amount, then
            // closest in time, then earliest, so the choice is deterministic
            let mut best: Option<(f64, i64, usize)> = None;
            for (o, slot) in slots.iter().enumerate() {
                let Some(order) = slot.as_ref() else { continue };
                if order.kind != EventKind::Order
                    || !order.is_revenue()
                    || order.source_system == payment.source_system
                    || paid.contains(&o)
                {
                    continue;
                }
                let ts_gap = (order.occurred_at - payment.occurred_at).abs();
                if ts_gap > self.duplicate_window_secs {
                    continue;
                }
                let diff = relative_diff(order.amount_gross, payment.amount_gross);
                let key = (diff, ts_gap, o);
                if best.map_or(true, |b| key < b) {
                    best = Some(key);
                }
            }

            let Some((diff, _, o)) = best else { continue };

            if diff <= self.conflict_epsilon {
                let order = slots[o].as_mut().expect("candidate present");
                order.corroborated_by.push(payment.source_system);
            } else {
                let order = slots[o].as_ref().expect("candidate present");
                exceptions.push(
                    ExceptionRecord::new(
                        ExceptionKind::UnresolvedConflict,
                        payment.source_system,
                        format!(
                            "{} reports {:.2} but {} reports {:.2} for the same event",
                            order.source_system.as_str(),
                            order.amount_gross,
                            payment.source_system.as_str(),
                            payment.amount_gross,
                        ),
                        payment.occurred_at,
                    )
                    .with_entity(entity),
                );
            }
            paid.insert(o);
            settled.insert(o);
            slots[p] = None;
        }
    }

    /// Revenue events still missing a counterpart past the grace window
    fn detect_orphans(
        &self,
        entity: EntityId,
        slots: &[Option<TimelineEvent>],
        settled: &HashSet<usize>,
        end_ts: i64,
        exceptions: &mut Vec<ExceptionRecord>,
    ) {
        for (i, slot) in slots.iter().enumerate() {
            let Some(event) = slot.as_ref() else { continue };
            if !event.is_revenue() || settled.contains(&i) {
                continue;
            }
            if end_ts - event.occurred_at <= self.grace_secs {
                // Counterpart may still arrive next extraction
                continue;
            }

            let detail = match event.kind {
                EventKind::Payment => format!(
                    "payment of {:.2} with no matching order after grace window",
                    event.amount_gross
                ),
                _ => format!(
                    "order of {:.2} with no matching payment after grace window",
                    event.amount_gross
                ),
            };
            exceptions.push(
                ExceptionRecord::new(
                    ExceptionKind::OrphanEvent,
                    event.source_system,
                    detail,
                    event.occurred_at,
                )
                .with_entity(entity),
            );
        }
    }
}

fn relative_diff(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}
