//! Entity resolution: exact hint matching, B2B fuzzy matching, audited merges

use crate::model::{EntityId, ExceptionKind, ExceptionRecord, Segment, SourceSystem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// How a source identity was attached to its entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// The key itself minted the entity
    Exact,
    /// Deterministic hint match (tax id, email hash, phone hash)
    High,
    /// B2B fuzzy match at or above the configured threshold
    Low,
}

/// One source-system identifier bound to a canonical entity
///
/// A `(source_system, source_key)` pair maps to at most one entity; the
/// binding itself is never rewritten. When entities merge, the binding keeps
/// pointing at the retired id and reads resolve through the redirect table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub source_system: SourceSystem,
    pub source_key: String,
    pub entity: EntityId,
    pub confidence: Confidence,
    /// Unix seconds, UTC
    pub first_seen: i64,
}

/// Matching hints carried on raw records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchHints {
    pub email_hash: Option<String>,
    pub phone_hash: Option<String>,
    pub tax_id: Option<String>,
    pub company_name: Option<String>,
}

/// Audit record of an explicit entity merge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeAudit {
    pub retired: EntityId,
    pub survivor: EntityId,
    pub reason: String,
    /// Unix seconds, UTC (data-time of the record that proved the merge)
    pub occurred_at: i64,
}

/// Outcome of one resolve call
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Canonical entity after redirects
    pub entity: EntityId,
    pub confidence: Confidence,
    /// Ambiguous-fuzzy or merge-audit ledger entries produced by this call
    pub exceptions: Vec<ExceptionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HintKey {
    TaxId(String),
    Email(String),
    Phone(String),
}

#[derive(Debug)]
struct EntityMeta {
    segment: Segment,
    company_tokens: Vec<String>,
    hints: HashSet<HintKey>,
    merged_into: Option<EntityId>,
}

/// Resolver state for one run
///
/// Entities live in a BTreeMap so candidate scans and tie-breaks iterate in
/// id order, keeping fuzzy decisions deterministic across runs.
pub struct IdentityResolver {
    next_id: u64,
    bindings: HashMap<(SourceSystem, String), EntityId>,
    identities: Vec<SourceIdentity>,
    hint_index: HashMap<HintKey, EntityId>,
    entities: BTreeMap<EntityId, EntityMeta>,
    merges: Vec<MergeAudit>,
    fuzzy_threshold: f64,
}

impl IdentityResolver {
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self {
            next_id: 1,
            bindings: HashMap::new(),
            identities: Vec::new(),
            hint_index: HashMap::new(),
            entities: BTreeMap::new(),
            merges: Vec::new(),
            fuzzy_threshold,
        }
    }

    /// Resolve a source identifier to its canonical entity
    ///
    /// Order of attack: existing binding, then deterministic exact-hint
    /// match, then (B2B only) fuzzy company matching against the threshold.
    /// No match mints a fresh entity. An existing binding whose hints prove
    /// identity with a *different* entity triggers an audited merge.
    pub fn resolve(
        &mut self,
        source_system: SourceSystem,
        source_key: &str,
        segment: Segment,
        hints: &MatchHints,
        observed_at: i64,
    ) -> Resolution {
        let binding_key = (source_system, source_key.to_string());

        if let Some(&bound) = self.bindings.get(&binding_key) {
            let entity = self.canonical(bound);
            let mut exceptions = Vec::new();

            // Exact hints can later prove two entities identical
            if let Some(proven) = self.exact_hint_match(hints) {
                let proven = self.canonical(proven);
                if proven != entity {
                    let audit = self.merge(
                        proven.min(entity),
                        proven.max(entity),
                        source_system,
                        observed_at,
                        format!(
                            "exact hint on {}:{} proved identity",
                            source_system.as_str(),
                            source_key
                        ),
                    );
                    exceptions.push(audit);
                }
            }

            let entity = self.canonical(bound);
            self.absorb_hints(entity, hints);
            return Resolution {
                entity,
                confidence: Confidence::Exact,
                exceptions,
            };
        }

        if let Some(matched) = self.exact_hint_match(hints) {
            let entity = self.canonical(matched);
            self.bind(source_system, source_key, entity, Confidence::High, observed_at);
            self.absorb_hints(entity, hints);
            return Resolution {
                entity,
                confidence: Confidence::High,
                exceptions: Vec::new(),
            };
        }

        // Fuzzy matching is B2B-only: ~200 accounts tolerate manual review,
        // 50k D2C customers do not tolerate false-positive merges.
        if segment == Segment::B2b {
            if let Some((candidate, score)) = self.fuzzy_candidate(hints) {
                if score >= self.fuzzy_threshold {
                    log::info!(
                        "fuzzy-matched {}:{} to {} (score {:.2})",
                        source_system.as_str(),
                        source_key,
                        candidate,
                        score
                    );
                    self.bind(source_system, source_key, candidate, Confidence::Low, observed_at);
                    self.absorb_hints(candidate, hints);
                    return Resolution {
                        entity: candidate,
                        confidence: Confidence::Low,
                        exceptions: Vec::new(),
                    };
                }

                // Below threshold: never auto-merge, mint and flag for review
                let entity = self.mint(segment, hints, source_system, source_key, observed_at);
                let exc = ExceptionRecord::new(
                    ExceptionKind::IdentityMergeAmbiguous,
                    source_system,
                    format!(
                        "{} scored {:.2} against {} (threshold {:.2}); left unmerged",
                        source_key, score, candidate, self.fuzzy_threshold
                    ),
                    observed_at,
                )
                .with_entity(entity);
                return Resolution {
                    entity,
                    confidence: Confidence::Exact,
                    exceptions: vec![exc],
                };
            }
        }

        let entity = self.mint(segment, hints, source_system, source_key, observed_at);
        Resolution {
            entity,
            confidence: Confidence::Exact,
            exceptions: Vec::new(),
        }
    }

    /// Follow the redirect table to the surviving entity
    pub fn canonical(&self, id: EntityId) -> EntityId {
        let mut current = id;
        while let Some(meta) = self.entities.get(&current) {
            match meta.merged_into {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    pub fn segment_of(&self, id: EntityId) -> Option<Segment> {
        self.entities.get(&self.canonical(id)).map(|m| m.segment)
    }

    /// All source identities bound during this run
    pub fn identities(&self) -> &[SourceIdentity] {
        &self.identities
    }

    pub fn merge_audits(&self) -> &[MergeAudit] {
        &self.merges
    }

    pub fn entity_count(&self) -> usize {
        self.entities.values().filter(|m| m.merged_into.is_none()).count()
    }

    /// Retire `loser` into `survivor`, append-only
    ///
    /// Events are re-attributed at snapshot build by resolving through the
    /// redirect table; no history is rewritten here. Returns the ledger
    /// entry recording the merge.
    fn merge(
        &mut self,
        survivor: EntityId,
        loser: EntityId,
        source_system: SourceSystem,
        occurred_at: i64,
        reason: String,
    ) -> ExceptionRecord {
        debug_assert_ne!(survivor, loser);

        let loser_hints: Vec<HintKey> = self
            .entities
            .get(&loser)
            .map(|m| m.hints.iter().cloned().collect())
            .unwrap_or_default();
        for hint in loser_hints {
            self.hint_index.insert(hint, survivor);
        }

        if let Some(meta) = self.entities.get_mut(&loser) {
            meta.merged_into = Some(survivor);
        }

        let audit = MergeAudit {
            retired: loser,
            survivor,
            reason: reason.clone(),
            occurred_at,
        };
        log::info!("merged {} into {}: {}", loser, survivor, reason);
        self.merges.push(audit);

        ExceptionRecord::new(
            ExceptionKind::IdentityMerge,
            source_system,
            format!("{} merged into {}: {}", loser, survivor, reason),
            occurred_at,
        )
        .with_entity(survivor)
    }

    fn mint(
        &mut self,
        segment: Segment,
        hints: &MatchHints,
        source_system: SourceSystem,
        source_key: &str,
        observed_at: i64,
    ) -> EntityId {
        let entity = EntityId(self.next_id);
        self.next_id += 1;

        self.entities.insert(
            entity,
            EntityMeta {
                segment,
                company_tokens: hints
                    .company_name
                    .as_deref()
                    .map(normalize_company_name)
                    .unwrap_or_default(),
                hints: HashSet::new(),
                merged_into: None,
            },
        );
        self.bind(source_system, source_key, entity, Confidence::Exact, observed_at);
        self.absorb_hints(entity, hints);
        entity
    }

    fn bind(
        &mut self,
        source_system: SourceSystem,
        source_key: &str,
        entity: EntityId,
        confidence: Confidence,
        first_seen: i64,
    ) {
        self.bindings
            .insert((source_system, source_key.to_string()), entity);
        self.identities.push(SourceIdentity {
            source_system,
            source_key: source_key.to_string(),
            entity,
            confidence,
            first_seen,
        });
    }

    fn exact_hint_match(&self, hints: &MatchHints) -> Option<EntityId> {
        for key in Self::hint_keys(hints) {
            if let Some(&entity) = self.hint_index.get(&key) {
                return Some(entity);
            }
        }
        None
    }

    fn absorb_hints(&mut self, entity: EntityId, hints: &MatchHints) {
        for key in Self::hint_keys(hints) {
            self.hint_index.entry(key.clone()).or_insert(entity);
            if let Some(meta) = self.entities.get_mut(&entity) {
                meta.hints.insert(key);
            }
        }
        if let Some(name) = hints.company_name.as_deref() {
            if let Some(meta) = self.entities.get_mut(&entity) {
                if meta.company_tokens.is_empty() {
                    meta.company_tokens = normalize_company_name(name);
                }
            }
        }
    }

    fn hint_keys(hints: &MatchHints) -> Vec<HintKey> {
        let mut keys = Vec::new();
        if let Some(t) = hints.tax_id.as_ref() {
            keys.push(HintKey::TaxId(t.clone()));
        }
        if let Some(e) = hints.email_hash.as_ref() {
            keys.push(HintKey::Email(e.clone()));
        }
        if let Some(p) = hints.phone_hash.as_ref() {
            keys.push(HintKey::Phone(p.clone()));
        }
        keys
    }

    /// Best-scoring B2B candidate by normalized company name plus contact
    /// overlap; entities scanned in id order so ties break deterministically
    fn fuzzy_candidate(&self, hints: &MatchHints) -> Option<(EntityId, f64)> {
        let name = hints.company_name.as_deref()?;
        let tokens = normalize_company_name(name);
        if tokens.is_empty() {
            return None;
        }

        let mut best: Option<(EntityId, f64)> = None;
        for (&id, meta) in &self.entities {
            if meta.segment != Segment::B2b || meta.merged_into.is_some() {
                continue;
            }
            let name_score = token_jaccard(&tokens, &meta.company_tokens);
            if name_score == 0.0 {
                continue;
            }
            let contact_overlap = Self::hint_keys(hints)
                .iter()
                .any(|k| meta.hints.contains(k));
            let score = name_score * 0.7 + if contact_overlap { 0.3 } else { 0.0 };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((id, score));
            }
        }
        best
    }
}

/// Lowercase, strip punctuation, drop legal-suffix noise tokens
fn normalize_company_name(name: &str) -> Vec<String> {
    const NOISE: &[&str] = &["inc", "llc", "ltd", "co", "corp", "gmbh", "the"];
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !NOISE.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn token_jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let sa: HashSet<&String> = a.iter().collect();
    let sb: HashSet<&String> = b.iter().collect();
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(email: Option<&str>, tax: Option<&str>, company: Option<&str>) -> MatchHints {
        MatchHints {
            email_hash: email.map(String::from),
            phone_hash: None,
            tax_id: tax.map(String::from),
            company_name: company.map(String::from),
        }
    }

    #[test]
    fn test_same_key_resolves_to_same_entity() {
        let mut resolver = IdentityResolver::new(0.8);

        let a = resolver.resolve(
            SourceSystem::Storefront,
            "C001",
            Segment::D2c,
            &hints(Some("e1"), None, None),
            1000,
        );
        let b = resolver.resolve(
            SourceSystem::Storefront,
            "C001",
            Segment::D2c,
            &hints(Some("e1"), None, None),
            2000,
        );

        assert_eq!(a.entity, b.entity);
        assert_eq!(resolver.entity_count(), 1);
    }

    #[test]
    fn test_exact_hint_links_across_sources() {
        let mut resolver = IdentityResolver::new(0.8);

        let storefront = resolver.resolve(
            SourceSystem::Storefront,
            "C001",
            Segment::D2c,
            &hints(Some("e1"), None, None),
            1000,
        );
        let processor = resolver.resolve(
            SourceSystem::PaymentProcessor,
            "cus_991",
            Segment::D2c,
            &hints(Some("e1"), None, None),
            1500,
        );

        assert_eq!(storefront.entity, processor.entity);
        assert_eq!(processor.confidence, Confidence::High);
        assert_eq!(resolver.entity_count(), 1);
    }

    #[test]
    fn test_d2c_never_fuzzy_matches() {
        let mut resolver = IdentityResolver::new(0.1);

        resolver.resolve(
            SourceSystem::Storefront,
            "C001",
            Segment::D2c,
            &hints(Some("e1"), None, Some("Jane Smith")),
            1000,
        );
        let second = resolver.resolve(
            SourceSystem::Crm,
            "A100",
            Segment::D2c,
            &hints(Some("e2"), None, Some("Jane Smith")),
            2000,
        );

        // Identical names, disjoint hints: two entities, no exception
        assert_eq!(resolver.entity_count(), 2);
        assert!(second.exceptions.is_empty());
    }

    #[test]
    fn test_b2b_fuzzy_match_above_threshold() {
        let mut resolver = IdentityResolver::new(0.6);

        let crm = resolver.resolve(
            SourceSystem::Crm,
            "ACME-1",
            Segment::B2b,
            &hints(Some("acme@x"), Some("TAX1"), Some("Acme Widgets Inc")),
            1000,
        );
        let catalog = resolver.resolve(
            SourceSystem::ProductCatalog,
            "acct-77",
            Segment::B2b,
            &hints(Some("acme@x"), None, Some("Acme Widgets LLC")),
            2000,
        );

        // Name tokens identical after suffix stripping + shared email hint.
        // Email is an exact hint, so this attaches at High before fuzzy runs.
        assert_eq!(crm.entity, catalog.entity);
        assert_eq!(catalog.confidence, Confidence::High);

        // Without the contact hint the same name still clears 0.6 via fuzzy
        let third = resolver.resolve(
            SourceSystem::PaymentProcessor,
            "cus_acme",
            Segment::B2b,
            &hints(None, None, Some("Acme Widgets")),
            3000,
        );
        assert_eq!(third.entity, crm.entity);
        assert_eq!(third.confidence, Confidence::Low);
    }

    #[test]
    fn test_b2b_fuzzy_below_threshold_flags_ambiguous() {
        let mut resolver = IdentityResolver::new(0.9);

        resolver.resolve(
            SourceSystem::Crm,
            "ACME-1",
            Segment::B2b,
            &hints(None, None, Some("Acme Widgets International")),
            1000,
        );
        let second = resolver.resolve(
            SourceSystem::ProductCatalog,
            "acct-77",
            Segment::B2b,
            &hints(None, None, Some("Acme Widgets")),
            2000,
        );

        // Partial name overlap below 0.9: unmerged, flagged for review
        assert_eq!(resolver.entity_count(), 2);
        assert_eq!(second.exceptions.len(), 1);
        assert_eq!(
            second.exceptions[0].kind,
            ExceptionKind::IdentityMergeAmbiguous
        );
    }

    #[test]
    fn test_late_hint_proof_merges_with_audit() {
        let mut resolver = IdentityResolver::new(0.8);

        // Two entities minted independently (no shared hints yet)
        let a = resolver.resolve(
            SourceSystem::Storefront,
            "C001",
            Segment::D2c,
            &hints(Some("e1"), None, None),
            1000,
        );
        let b = resolver.resolve(
            SourceSystem::PaymentProcessor,
            "cus_991",
            Segment::D2c,
            &hints(Some("e2"), None, None),
            1100,
        );
        assert_ne!(a.entity, b.entity);

        // The processor key reappears carrying the storefront email: proof
        let proof = resolver.resolve(
            SourceSystem::PaymentProcessor,
            "cus_991",
            Segment::D2c,
            &hints(Some("e1"), None, None),
            2000,
        );

        assert_eq!(proof.entity, a.entity.min(b.entity));
        assert_eq!(resolver.canonical(b.entity), resolver.canonical(a.entity));
        assert_eq!(resolver.merge_audits().len(), 1);
        assert_eq!(proof.exceptions.len(), 1);
        assert_eq!(proof.exceptions[0].kind, ExceptionKind::IdentityMerge);

        // Retired id stays resolvable
        let retired = resolver.merge_audits()[0].retired;
        assert_eq!(resolver.canonical(retired), proof.entity);
    }

    #[test]
    fn test_normalize_company_name() {
        assert_eq!(
            normalize_company_name("The Acme Widgets, Inc."),
            vec!["acme", "widgets"]
        );
        assert_eq!(normalize_company_name("LLC"), Vec::<String>::new());
    }
}
