//! Raw record schema and the pure normalization function

use crate::identity::MatchHints;
use crate::model::{EntityId, EventKind, FunnelStage, Segment, SourceSystem, TimelineEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed record from {}: {detail}", .source.as_str())]
    MalformedRecord {
        source: SourceSystem,
        detail: String,
    },
}

/// One record of the normalized raw-event stream emitted by an adapter
///
/// The schema is the adapter contract: identifier, event type, timestamp,
/// amount fields, and matching metadata. Everything the core does
/// not require is optional here; requiredness per event type is enforced by
/// [`normalize_record`], not by serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub source_system: SourceSystem,
    pub source_key: String,
    pub event_type: String,
    /// Unix seconds, UTC
    pub timestamp: i64,
    #[serde(default)]
    pub amount_gross: Option<f64>,
    #[serde(default)]
    pub amount_cogs: Option<f64>,
    #[serde(default)]
    pub amount_discount: Option<f64>,
    /// Portion of an order already refunded at extraction time
    #[serde(default)]
    pub amount_refunded: Option<f64>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub segment: Option<Segment>,
    /// CRM pipeline stage carried by crm_stage_change records
    #[serde(default)]
    pub funnel_stage: Option<FunnelStage>,
    #[serde(default)]
    pub hints: MatchHints,
}

impl RawRecord {
    /// Parse a record from a JSONL line
    pub fn from_jsonl(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Segment of the entity this record belongs to
    ///
    /// CRM is a B2B system of record; every other source defaults to D2C
    /// unless the adapter says otherwise.
    pub fn segment(&self) -> Segment {
        self.segment.unwrap_or(match self.source_system {
            SourceSystem::Crm => Segment::B2b,
            _ => Segment::D2c,
        })
    }
}

/// Expand one raw record into canonical timeline events
///
/// Pure: the same record, entity, and base sequence always produce the same
/// events. A partially refunded order expands into an order event plus a
/// refund event (negative gross) at the same timestamp; `base_seq` numbers
/// the expansion so same-timestamp events stay ordered.
pub fn normalize_record(
    record: &RawRecord,
    entity: EntityId,
    base_seq: u64,
) -> Result<Vec<TimelineEvent>, NormalizeError> {
    let make = |kind: EventKind, gross: f64, seq: u64| TimelineEvent {
        entity,
        kind,
        source_system: record.source_system,
        occurred_at: record.timestamp,
        amount_gross: gross,
        amount_cogs: record.amount_cogs,
        amount_discount: record.amount_discount.unwrap_or(0.0),
        product_id: record.product_id.clone(),
        funnel_stage: record.funnel_stage,
        sequence: seq,
        corroborated_by: Vec::new(),
    };

    let require_gross = || {
        record.amount_gross.ok_or_else(|| NormalizeError::MalformedRecord {
            source: record.source_system,
            detail: format!(
                "{} record {} missing amount_gross",
                record.event_type, record.source_key
            ),
        })
    };

    match record.event_type.as_str() {
        "order" => {
            let gross = require_gross()?;
            let mut events = vec![make(EventKind::Order, gross, base_seq)];
            if let Some(refunded) = record.amount_refunded {
                if refunded > 0.0 {
                    let mut refund = make(EventKind::Refund, -refunded, base_seq + 1);
                    // Cost stays attached to the order event only
                    refund.amount_cogs = Some(0.0);
                    refund.amount_discount = 0.0;
                    events.push(refund);
                }
            }
            Ok(events)
        }
        "refund" => {
            let gross = require_gross()?;
            // Adapters report refund magnitude; the timeline carries it negative
            let mut refund = make(EventKind::Refund, -gross.abs(), base_seq);
            refund.amount_cogs = Some(0.0);
            refund.amount_discount = 0.0;
            Ok(vec![refund])
        }
        "payment" | "charge" => {
            let gross = require_gross()?;
            Ok(vec![make(EventKind::Payment, gross, base_seq)])
        }
        "subscription_change" => Ok(vec![make(
            EventKind::SubscriptionChange,
            record.amount_gross.unwrap_or(0.0),
            base_seq,
        )]),
        "crm_stage_change" => {
            if record.funnel_stage.is_none() {
                return Err(NormalizeError::MalformedRecord {
                    source: record.source_system,
                    detail: format!(
                        "crm_stage_change record {} missing funnel_stage",
                        record.source_key
                    ),
                });
            }
            Ok(vec![make(EventKind::CrmStageChange, 0.0, base_seq)])
        }
        "engagement" | "product_usage" => {
            Ok(vec![make(EventKind::Engagement, 0.0, base_seq)])
        }
        other => Err(NormalizeError::MalformedRecord {
            source: record.source_system,
            detail: format!("unknown event_type: {}", other),
        }),
    }
}
