//! Identity resolution across source systems
//!
//! Maps source-specific identifiers (storefront customer id, processor
//! customer id, CRM account id, catalog account id) to one canonical
//! [`EntityId`](crate::model::EntityId). The resolver is the only component
//! that mints ids; everything downstream references them.
//!
//! All resolution and merge decisions for a run are serialized behind the
//! single ingestion task that owns the resolver; two concurrent writers
//! could otherwise mint duplicate entities for the same key. When resolution
//! is scaled out, work must be partitioned with [`shard_for_key`] so one
//! worker owns each source key.

pub mod resolver;

pub use resolver::{
    Confidence, IdentityResolver, MatchHints, MergeAudit, Resolution, SourceIdentity,
};

use std::hash::{DefaultHasher, Hash, Hasher};

/// Stable shard assignment for a source key
///
/// The same key always lands on the same shard, so per-key resolution order
/// is preserved no matter how many workers drain the stream.
pub fn shard_for_key(source_key: &str, num_shards: usize) -> usize {
    debug_assert!(num_shards > 0);
    let mut hasher = DefaultHasher::new();
    source_key.hash(&mut hasher);
    (hasher.finish() % num_shards as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_assignment_is_stable() {
        let a = shard_for_key("C000123", 8);
        assert_eq!(a, shard_for_key("C000123", 8));
        assert!(a < 8);
    }
}
