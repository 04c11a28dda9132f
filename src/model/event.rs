//! Canonical timeline events and the identifiers they hang off

use super::month::MonthKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identifier for one D2C customer or one B2B account
///
/// Minted only by the identity resolver and immutable once assigned. Merged
/// entities keep their id; the resolver's redirect table maps retired ids to
/// their survivor, so an `EntityId` stays resolvable for audit forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:06}", self.0)
    }
}

/// The systems of record feeding the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceSystem {
    #[serde(rename = "storefront")]
    Storefront,
    #[serde(rename = "payment_processor")]
    PaymentProcessor,
    #[serde(rename = "crm")]
    Crm,
    #[serde(rename = "product_catalog")]
    ProductCatalog,
}

impl SourceSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::Storefront => "storefront",
            SourceSystem::PaymentProcessor => "payment_processor",
            SourceSystem::Crm => "crm",
            SourceSystem::ProductCatalog => "product_catalog",
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for SourceSystem {}

/// Customer segment; every entity belongs to exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "D2C")]
    D2c,
    #[serde(rename = "B2B")]
    B2b,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::D2c => "D2C",
            Segment::B2b => "B2B",
        }
    }

    /// The order-of-record source whose amounts win duplicate tie-breaks
    pub fn source_of_record(&self) -> SourceSystem {
        match self {
            Segment::D2c => SourceSystem::Storefront,
            Segment::B2b => SourceSystem::Crm,
        }
    }
}

/// Closed set of event kinds produced by adapter normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "order")]
    Order,
    #[serde(rename = "refund")]
    Refund,
    #[serde(rename = "payment")]
    Payment,
    #[serde(rename = "subscription_change")]
    SubscriptionChange,
    #[serde(rename = "crm_stage_change")]
    CrmStageChange,
    #[serde(rename = "engagement")]
    Engagement,
}

/// Funnel stages in order; an entity holds at most one record per stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FunnelStage {
    #[serde(rename = "acquisition")]
    Acquisition,
    #[serde(rename = "activation")]
    Activation,
    #[serde(rename = "conversion")]
    Conversion,
    #[serde(rename = "repeat")]
    Repeat,
}

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Acquisition => "acquisition",
            FunnelStage::Activation => "activation",
            FunnelStage::Conversion => "conversion",
            FunnelStage::Repeat => "repeat",
        }
    }

    pub fn all() -> [FunnelStage; 4] {
        [
            FunnelStage::Acquisition,
            FunnelStage::Activation,
            FunnelStage::Conversion,
            FunnelStage::Repeat,
        ]
    }

    pub fn prior(&self) -> Option<FunnelStage> {
        match self {
            FunnelStage::Acquisition => None,
            FunnelStage::Activation => Some(FunnelStage::Acquisition),
            FunnelStage::Conversion => Some(FunnelStage::Activation),
            FunnelStage::Repeat => Some(FunnelStage::Conversion),
        }
    }
}

/// One reconciled timeline event, immutable after normalization
///
/// `sequence` breaks ties when multiple events share `occurred_at` from the
/// same source. `amount_cogs` is `None` when the source did not allocate
/// cost; the LTV engine resolves it through the product rate table.
/// `corroborated_by` lists the secondary sources of a collapsed duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub entity: EntityId,
    pub kind: EventKind,
    pub source_system: SourceSystem,
    /// Unix seconds, UTC
    pub occurred_at: i64,
    pub amount_gross: f64,
    pub amount_cogs: Option<f64>,
    pub amount_discount: f64,
    pub product_id: Option<String>,
    /// Stage hint carried by CRM stage-change events
    pub funnel_stage: Option<FunnelStage>,
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corroborated_by: Vec<SourceSystem>,
}

impl TimelineEvent {
    pub fn month(&self) -> MonthKey {
        MonthKey::from_timestamp(self.occurred_at)
    }

    /// A qualifying revenue event for cohort formation, retention activity,
    /// and funnel conversion
    ///
    /// Payments count alongside orders: an orphan payment is still revenue
    /// the business collected, even when the order system missed it.
    pub fn is_revenue(&self) -> bool {
        matches!(self.kind, EventKind::Order | EventKind::Payment) && self.amount_gross > 0.0
    }

    /// Sort key: chronological, sequence breaks same-timestamp ties
    pub fn order_key(&self) -> (i64, u64) {
        (self.occurred_at, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_display() {
        assert_eq!(EntityId(42).to_string(), "E000042");
    }

    #[test]
    fn test_source_of_record_per_segment() {
        assert_eq!(Segment::D2c.source_of_record(), SourceSystem::Storefront);
        assert_eq!(Segment::B2b.source_of_record(), SourceSystem::Crm);
    }

    #[test]
    fn test_stage_ordering() {
        assert!(FunnelStage::Acquisition < FunnelStage::Activation);
        assert!(FunnelStage::Conversion < FunnelStage::Repeat);
        assert_eq!(FunnelStage::Repeat.prior(), Some(FunnelStage::Conversion));
        assert_eq!(FunnelStage::Acquisition.prior(), None);
    }

    #[test]
    fn test_event_kind_serde_names() {
        let json = serde_json::to_string(&EventKind::CrmStageChange).unwrap();
        assert_eq!(json, "\"crm_stage_change\"");
        let kind: EventKind = serde_json::from_str("\"engagement\"").unwrap();
        assert_eq!(kind, EventKind::Engagement);
    }
}
