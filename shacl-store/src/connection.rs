//! Connection group for one validation pass
//!
//! A validation pass sees four views of the data:
//!
//! - `current()` — the dataset with the transaction applied (base + added −
//!   removed), what "the data" means for full validation;
//! - `previous()` — the pre-transaction state, used by the incremental
//!   skip optimization in the bulk joins;
//! - `added()` / `removed()` — the transaction deltas themselves, the
//!   narrow candidate sources incremental plans start from.
//!
//! [`RevalidationStats`] summarizes the shape of the transaction; the plan
//! compiler reads it to pick between the incremental strategies.

use crate::memory::MemorySail;
use crate::reader::SailReader;
use shacl_model::{Iri, Triple, TriplePattern};
use std::collections::HashSet;

/// Dataset statistics that drive plan strategy selection
#[derive(Debug, Clone)]
pub struct RevalidationStats {
    /// True when the base store held no triples before the transaction
    pub base_empty: bool,
    pub added_count: usize,
    pub removed_count: usize,
    added_predicates: HashSet<Iri>,
    removed_predicates: HashSet<Iri>,
}

impl RevalidationStats {
    pub fn has_added(&self) -> bool {
        self.added_count > 0
    }

    pub fn has_removed(&self) -> bool {
        self.removed_count > 0
    }

    /// Was this predicate added or removed by the transaction?
    pub fn predicate_touched(&self, predicate: &Iri) -> bool {
        self.added_predicates.contains(predicate) || self.removed_predicates.contains(predicate)
    }

    pub fn predicate_added(&self, predicate: &Iri) -> bool {
        self.added_predicates.contains(predicate)
    }

    pub fn predicate_removed(&self, predicate: &Iri) -> bool {
        self.removed_predicates.contains(predicate)
    }
}

/// The storage views for one validation pass
pub struct ConnectionsGroup {
    base: MemorySail,
    added: MemorySail,
    removed: MemorySail,
    stats: RevalidationStats,
}

impl ConnectionsGroup {
    /// Build a group from the pre-transaction base and the transaction deltas
    pub fn new(base: MemorySail, added: MemorySail, removed: MemorySail) -> Self {
        let stats = RevalidationStats {
            base_empty: base.is_empty(),
            added_count: added.size(),
            removed_count: removed.size(),
            added_predicates: added.iter().map(|t| t.predicate).collect(),
            removed_predicates: removed.iter().map(|t| t.predicate).collect(),
        };
        tracing::debug!(
            base_empty = stats.base_empty,
            added = stats.added_count,
            removed = stats.removed_count,
            "connection group opened"
        );
        ConnectionsGroup {
            base,
            added,
            removed,
            stats,
        }
    }

    /// A group with no transaction: full validation over the base alone
    pub fn without_transaction(base: MemorySail) -> Self {
        ConnectionsGroup::new(base, MemorySail::new(), MemorySail::new())
    }

    /// The dataset with the transaction applied
    pub fn current(&self) -> OverlayReader<'_> {
        OverlayReader {
            base: &self.base,
            added: &self.added,
            removed: &self.removed,
        }
    }

    /// The pre-transaction state
    ///
    /// Deltas are kept separate from the base, so the base sail *is* the
    /// previous state.
    pub fn previous(&self) -> &MemorySail {
        &self.base
    }

    /// Triples added by the transaction
    pub fn added(&self) -> &MemorySail {
        &self.added
    }

    /// Triples removed by the transaction
    pub fn removed(&self) -> &MemorySail {
        &self.removed
    }

    pub fn stats(&self) -> &RevalidationStats {
        &self.stats
    }
}

/// Base + added − removed, presented as a single reader
pub struct OverlayReader<'a> {
    base: &'a MemorySail,
    added: &'a MemorySail,
    removed: &'a MemorySail,
}

impl SailReader for OverlayReader<'_> {
    fn triples<'b>(&'b self, pattern: &TriplePattern) -> Box<dyn Iterator<Item = Triple> + 'b> {
        let base = self
            .base
            .triples(pattern)
            .filter(|t| !contains_triple(self.removed, t));
        // Skip added triples already present in base so the overlay never
        // yields duplicates.
        let added = self
            .added
            .triples(pattern)
            .filter(|t| !contains_triple(self.base, t) && !contains_triple(self.removed, t));
        Box::new(base.chain(added))
    }

    fn size(&self) -> usize {
        self.triples(&TriplePattern::any()).count()
    }
}

fn contains_triple(sail: &MemorySail, triple: &Triple) -> bool {
    sail.contains(
        &TriplePattern::any()
            .with_subject(triple.subject.clone())
            .with_predicate(triple.predicate.clone())
            .with_object(triple.object.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shacl_model::Term;

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Term::iri(s), Iri::new(p), Term::iri(o))
    }

    fn group() -> ConnectionsGroup {
        let base = MemorySail::from_triples([
            triple("http://ex/a", "http://ex/p", "http://ex/b"),
            triple("http://ex/c", "http://ex/p", "http://ex/d"),
        ]);
        let added = MemorySail::from_triples([triple("http://ex/e", "http://ex/q", "http://ex/f")]);
        let removed =
            MemorySail::from_triples([triple("http://ex/c", "http://ex/p", "http://ex/d")]);
        ConnectionsGroup::new(base, added, removed)
    }

    #[test]
    fn current_view_applies_deltas() {
        let group = group();
        let all: Vec<Triple> = group.current().triples(&TriplePattern::any()).collect();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&triple("http://ex/a", "http://ex/p", "http://ex/b")));
        assert!(all.contains(&triple("http://ex/e", "http://ex/q", "http://ex/f")));
    }

    #[test]
    fn previous_view_ignores_deltas() {
        let group = group();
        assert_eq!(group.previous().size(), 2);
        assert!(!contains_triple(
            group.previous(),
            &triple("http://ex/e", "http://ex/q", "http://ex/f")
        ));
    }

    #[test]
    fn stats_reflect_transaction_shape() {
        let group = group();
        let stats = group.stats();
        assert!(!stats.base_empty);
        assert!(stats.has_added());
        assert!(stats.has_removed());
        assert!(stats.predicate_touched(&Iri::new("http://ex/q")));
        assert!(stats.predicate_removed(&Iri::new("http://ex/p")));
        assert!(!stats.predicate_touched(&Iri::new("http://ex/zzz")));
    }

    #[test]
    fn overlay_never_duplicates_base_triples() {
        let base = MemorySail::from_triples([triple("http://ex/a", "http://ex/p", "http://ex/b")]);
        let added = MemorySail::from_triples([triple("http://ex/a", "http://ex/p", "http://ex/b")]);
        let group = ConnectionsGroup::new(base, added, MemorySail::new());
        assert_eq!(group.current().triples(&TriplePattern::any()).count(), 1);
    }
}
