//! Data-quality exception ledger entries

use super::event::{EntityId, SourceSystem};
use serde::{Deserialize, Serialize};

/// Exception taxonomy
///
/// The first five kinds are data-quality findings; `IdentityMerge` is the
/// audit record an explicit entity merge leaves behind. None of them block
/// downstream computation; affected rows are flagged, not dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionKind {
    MalformedRecord,
    UnresolvedConflict,
    OrphanEvent,
    UnratedProduct,
    IdentityMergeAmbiguous,
    IdentityMerge,
}

impl ExceptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::MalformedRecord => "MALFORMED_RECORD",
            ExceptionKind::UnresolvedConflict => "UNRESOLVED_CONFLICT",
            ExceptionKind::OrphanEvent => "ORPHAN_EVENT",
            ExceptionKind::UnratedProduct => "UNRATED_PRODUCT",
            ExceptionKind::IdentityMergeAmbiguous => "IDENTITY_MERGE_AMBIGUOUS",
            ExceptionKind::IdentityMerge => "IDENTITY_MERGE",
        }
    }

    /// Kinds that flag the affected entity's published metrics
    pub fn flags_entity(&self) -> bool {
        matches!(
            self,
            ExceptionKind::UnresolvedConflict
                | ExceptionKind::OrphanEvent
                | ExceptionKind::UnratedProduct
        )
    }
}

/// One exception ledger entry
///
/// `detected_at` is data-time (the timestamp of the triggering record), not
/// wall-clock, so identical inputs produce identical ledgers across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub entity: Option<EntityId>,
    pub source_system: SourceSystem,
    pub kind: ExceptionKind,
    pub detail: String,
    /// Unix seconds, UTC
    pub detected_at: i64,
}

impl ExceptionRecord {
    pub fn new(
        kind: ExceptionKind,
        source_system: SourceSystem,
        detail: impl Into<String>,
        detected_at: i64,
    ) -> Self {
        Self {
            entity: None,
            source_system,
            kind,
            detail: detail.into(),
            detected_at,
        }
    }

    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }
}
