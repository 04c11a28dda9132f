//! Per-entity cumulative net lifetime value

use crate::model::{
    EntityId, ExceptionKind, ExceptionRecord, MonthKey,
};
use crate::reconcile::TimelineSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateTableError {
    #[error("failed to read COGS rate table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse COGS rate table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Per-product COGS rates (fraction of gross) for events whose source did
/// not allocate cost
///
/// The absence of a rate is meaningful: treating it as zero cost would
/// silently inflate LTV, which is the exact failure this engine must refuse.
#[derive(Debug, Clone, Default)]
pub struct CogsRateTable {
    rates: HashMap<String, f64>,
}

impl CogsRateTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rates(rates: HashMap<String, f64>) -> Self {
        Self { rates }
    }

    /// Load `{"P001": 0.42, ...}` from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RateTableError> {
        let raw = std::fs::read_to_string(path)?;
        let rates: HashMap<String, f64> = serde_json::from_str(&raw)?;
        log::info!("loaded COGS rates for {} products", rates.len());
        Ok(Self { rates })
    }

    pub fn rate(&self, product_id: &str) -> Option<f64> {
        self.rates.get(product_id).copied()
    }
}

/// One LTV row: an entity's revenue position as of the end of a month
///
/// Rows exist only for months with events; `cumulative_net_ltv` carries
/// forward. Refund events make the cumulative figure decrease, which is
/// correct behavior, not an invariant violation; only rewriting published
/// history is prohibited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtvRecord {
    pub entity: EntityId,
    pub as_of_month: MonthKey,
    pub gross_revenue: f64,
    pub net_revenue: f64,
    pub cumulative_net_ltv: f64,
    pub has_unresolved_exception: bool,
}

#[derive(Debug, Default)]
pub struct LtvOutput {
    pub records: Vec<LtvRecord>,
    pub exceptions: Vec<ExceptionRecord>,
}

pub struct LtvEngine {
    rates: CogsRateTable,
}

impl LtvEngine {
    pub fn new(rates: CogsRateTable) -> Self {
        Self { rates }
    }

    /// Compute monthly and cumulative net LTV for every entity
    ///
    /// Net per event = gross − COGS − discount. An event carrying gross with
    /// no COGS and no applicable rate raises `UnratedProduct`: its gross is
    /// still reported, its net contribution is excluded until rated, and the
    /// entity's rows are flagged.
    pub fn compute(&self, snapshot: &TimelineSnapshot) -> LtvOutput {
        let mut output = LtvOutput::default();

        for (&entity, timeline) in &snapshot.entities {
            let mut monthly: BTreeMap<MonthKey, (f64, f64)> = BTreeMap::new();
            let mut unrated = false;

            for event in &timeline.events {
                if event.amount_gross == 0.0 {
                    continue;
                }
                let bucket = monthly.entry(event.month()).or_insert((0.0, 0.0));
                bucket.0 += event.amount_gross;

                let cogs = event.amount_cogs.or_else(|| {
                    event
                        .product_id
                        .as_deref()
                        .and_then(|p| self.rates.rate(p))
                        .map(|rate| event.amount_gross * rate)
                });

                match cogs {
                    Some(cogs) => {
                        bucket.1 += event.amount_gross - cogs - event.amount_discount;
                    }
                    None => {
                        unrated = true;
                        output.exceptions.push(
                            ExceptionRecord::new(
                                ExceptionKind::UnratedProduct,
                                event.source_system,
                                format!(
                                    "no COGS rate for {}; {:.2} gross excluded from net",
                                    event.product_id.as_deref().unwrap_or("unknown product"),
                                    event.amount_gross
                                ),
                                event.occurred_at,
                            )
                            .with_entity(entity),
                        );
                    }
                }
            }

            if monthly.is_empty() {
                continue;
            }

            let flagged = unrated || snapshot.flagged.contains(&entity);
            let mut cumulative = 0.0;
            for (month, (gross, net)) in monthly {
                cumulative += net;
                output.records.push(LtvRecord {
                    entity,
                    as_of_month: month,
                    gross_revenue: gross,
                    net_revenue: net,
                    cumulative_net_ltv: cumulative,
                    has_unresolved_exception: flagged,
                });
            }
        }

        log::info!(
            "computed {} LTV rows ({} unrated-product exceptions)",
            output.records.len(),
            output.exceptions.len()
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventKind, Segment, SourceSystem, TimelineEvent};
    use crate::reconcile::EntityTimeline;
    use std::collections::{BTreeMap, BTreeSet};

    const JAN: i64 = 1673740800;
    const FEB: i64 = 1676419200;
    const MAR: i64 = 1678838400;

    fn event(
        kind: EventKind,
        occurred_at: i64,
        gross: f64,
        cogs: Option<f64>,
        discount: f64,
        product: Option<&str>,
        seq: u64,
    ) -> TimelineEvent {
        TimelineEvent {
            entity: EntityId(1),
            kind,
            source_system: SourceSystem::Storefront,
            occurred_at,
            amount_gross: gross,
            amount_cogs: cogs,
            amount_discount: discount,
            product_id: product.map(String::from),
            funnel_stage: None,
            sequence: seq,
            corroborated_by: Vec::new(),
        }
    }

    fn snapshot_of(events: Vec<TimelineEvent>) -> TimelineSnapshot {
        let end_ts = events.iter().map(|e| e.occurred_at).max().unwrap_or(0);
        let mut entities = BTreeMap::new();
        entities.insert(
            EntityId(1),
            EntityTimeline {
                segment: Segment::D2c,
                events,
            },
        );
        TimelineSnapshot {
            entities,
            exceptions: Vec::new(),
            flagged: BTreeSet::new(),
            end_ts,
        }
    }

    #[test]
    fn test_net_is_gross_minus_cogs_minus_discount() {
        let snapshot = snapshot_of(vec![event(
            EventKind::Order,
            JAN,
            100.0,
            Some(40.0),
            10.0,
            Some("P001"),
            0,
        )]);

        let output = LtvEngine::new(CogsRateTable::empty()).compute(&snapshot);
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].gross_revenue, 100.0);
        assert_eq!(output.records[0].net_revenue, 50.0);
        assert_eq!(output.records[0].cumulative_net_ltv, 50.0);
        assert!(!output.records[0].has_unresolved_exception);
        assert!(output.exceptions.is_empty());
    }

    #[test]
    fn test_cumulative_carries_across_months() {
        let snapshot = snapshot_of(vec![
            event(EventKind::Order, JAN, 100.0, Some(40.0), 0.0, Some("P001"), 0),
            event(EventKind::Order, MAR, 50.0, Some(20.0), 0.0, Some("P001"), 1),
        ]);

        let output = LtvEngine::new(CogsRateTable::empty()).compute(&snapshot);
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].as_of_month, MonthKey::new(2023, 1));
        assert_eq!(output.records[0].cumulative_net_ltv, 60.0);
        assert_eq!(output.records[1].as_of_month, MonthKey::new(2023, 3));
        assert_eq!(output.records[1].cumulative_net_ltv, 90.0);
    }

    #[test]
    fn test_no_refunds_means_non_decreasing_cumulative() {
        let snapshot = snapshot_of(vec![
            event(EventKind::Order, JAN, 100.0, Some(40.0), 0.0, Some("P001"), 0),
            event(EventKind::Order, FEB, 30.0, Some(10.0), 0.0, Some("P001"), 1),
            event(EventKind::Order, MAR, 20.0, Some(5.0), 0.0, Some("P001"), 2),
        ]);

        let output = LtvEngine::new(CogsRateTable::empty()).compute(&snapshot);
        let mut prev = f64::MIN;
        for record in &output.records {
            assert!(record.cumulative_net_ltv >= prev);
            prev = record.cumulative_net_ltv;
        }
    }

    #[test]
    fn test_refund_decreases_cumulative_within_bound() {
        let snapshot = snapshot_of(vec![
            event(EventKind::Order, JAN, 100.0, Some(40.0), 0.0, Some("P001"), 0),
            event(EventKind::Refund, FEB, -25.0, Some(0.0), 0.0, Some("P001"), 1),
        ]);

        let output = LtvEngine::new(CogsRateTable::empty()).compute(&snapshot);
        assert_eq!(output.records[0].cumulative_net_ltv, 60.0);
        // Drop equals the refund amount, never more
        assert_eq!(output.records[1].cumulative_net_ltv, 35.0);
        assert_eq!(
            output.records[0].cumulative_net_ltv - output.records[1].cumulative_net_ltv,
            25.0
        );
    }

    #[test]
    fn test_rate_table_fills_missing_cogs() {
        let mut rates = HashMap::new();
        rates.insert("P003".to_string(), 0.48);

        let snapshot = snapshot_of(vec![event(
            EventKind::Order,
            JAN,
            100.0,
            None,
            0.0,
            Some("P003"),
            0,
        )]);

        let output = LtvEngine::new(CogsRateTable::from_rates(rates)).compute(&snapshot);
        assert_eq!(output.records[0].net_revenue, 52.0);
        assert!(output.exceptions.is_empty());
    }

    #[test]
    fn test_unrated_product_excludes_net_keeps_gross() {
        // Orphan payment: gross known, product and COGS unknown
        let snapshot = snapshot_of(vec![event(
            EventKind::Payment,
            JAN,
            75.0,
            None,
            0.0,
            None,
            0,
        )]);

        let output = LtvEngine::new(CogsRateTable::empty()).compute(&snapshot);
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].gross_revenue, 75.0);
        assert_eq!(output.records[0].net_revenue, 0.0);
        assert!(output.records[0].has_unresolved_exception);

        assert_eq!(output.exceptions.len(), 1);
        assert_eq!(output.exceptions[0].kind, ExceptionKind::UnratedProduct);
    }

    #[test]
    fn test_snapshot_flag_propagates_to_rows() {
        let mut snapshot = snapshot_of(vec![event(
            EventKind::Order,
            JAN,
            100.0,
            Some(40.0),
            0.0,
            Some("P001"),
            0,
        )]);
        snapshot.flagged.insert(EntityId(1));

        let output = LtvEngine::new(CogsRateTable::empty()).compute(&snapshot);
        assert!(output.records[0].has_unresolved_exception);
    }

    #[test]
    fn test_rate_table_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.json");
        std::fs::write(&path, r#"{"P001": 0.4, "P002": 0.55}"#).unwrap();

        let table = CogsRateTable::from_json_file(&path).unwrap();
        assert_eq!(table.rate("P001"), Some(0.4));
        assert_eq!(table.rate("P009"), None);
    }
}
