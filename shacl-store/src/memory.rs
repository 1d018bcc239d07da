//! In-memory reference sail
//!
//! A BTreeSet-indexed triple store with SPO, POS and OSP orderings. Index
//! selection mirrors the usual triple-store playbook: pick the index whose
//! leading positions are bound by the pattern, range-scan the prefix, and
//! post-filter the rest.

use crate::reader::SailReader;
use shacl_model::{Iri, Term, Triple, TriplePattern};
use std::collections::BTreeSet;

/// Index key: terms reordered so the scan prefix comes first
type Spo = (Term, Iri, Term, Option<Iri>);
type Pos = (Iri, Term, Term, Option<Iri>);
type Osp = (Term, Term, Iri, Option<Iri>);

/// An in-memory triple store
#[derive(Debug, Default, Clone)]
pub struct MemorySail {
    spo: BTreeSet<Spo>,
    pos: BTreeSet<Pos>,
    osp: BTreeSet<Osp>,
}

impl MemorySail {
    pub fn new() -> Self {
        MemorySail::default()
    }

    pub fn from_triples(triples: impl IntoIterator<Item = Triple>) -> Self {
        let mut sail = MemorySail::new();
        for triple in triples {
            sail.add(triple);
        }
        sail
    }

    /// Add a triple; returns false if it was already present
    pub fn add(&mut self, triple: Triple) -> bool {
        let Triple {
            subject,
            predicate,
            object,
            context,
        } = triple;
        let fresh = self.spo.insert((
            subject.clone(),
            predicate.clone(),
            object.clone(),
            context.clone(),
        ));
        if fresh {
            self.pos.insert((
                predicate.clone(),
                object.clone(),
                subject.clone(),
                context.clone(),
            ));
            self.osp.insert((object, subject, predicate, context));
        }
        fresh
    }

    /// Remove a triple; returns false if it was not present
    pub fn remove(&mut self, triple: &Triple) -> bool {
        let key = (
            triple.subject.clone(),
            triple.predicate.clone(),
            triple.object.clone(),
            triple.context.clone(),
        );
        let removed = self.spo.remove(&key);
        if removed {
            self.pos.remove(&(
                triple.predicate.clone(),
                triple.object.clone(),
                triple.subject.clone(),
                triple.context.clone(),
            ));
            self.osp.remove(&(
                triple.object.clone(),
                triple.subject.clone(),
                triple.predicate.clone(),
                triple.context.clone(),
            ));
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = Triple> + '_ {
        self.spo.iter().map(|(s, p, o, c)| Triple {
            subject: s.clone(),
            predicate: p.clone(),
            object: o.clone(),
            context: c.clone(),
        })
    }
}

impl SailReader for MemorySail {
    fn triples<'a>(&'a self, pattern: &TriplePattern) -> Box<dyn Iterator<Item = Triple> + 'a> {
        let pattern = pattern.clone();

        // Choose the index with the longest bound prefix.
        match (&pattern.subject, &pattern.predicate, &pattern.object) {
            (Some(s), _, _) => {
                let s = s.clone();
                let lower = (s.clone(), Iri::new(""), Term::iri(""), None);
                Box::new(
                    self.spo
                        .range(lower..)
                        .take_while(move |(ts, _, _, _)| *ts == s)
                        .map(to_triple_spo)
                        .filter(move |t| pattern.matches(t)),
                )
            }
            (None, Some(p), _) => {
                let p = p.clone();
                let lower = (p.clone(), Term::iri(""), Term::iri(""), None);
                Box::new(
                    self.pos
                        .range(lower..)
                        .take_while(move |(tp, _, _, _)| *tp == p)
                        .map(|(p, o, s, c)| Triple {
                            subject: s.clone(),
                            predicate: p.clone(),
                            object: o.clone(),
                            context: c.clone(),
                        })
                        .filter(move |t| pattern.matches(t)),
                )
            }
            (None, None, Some(o)) => {
                let o = o.clone();
                let lower = (o.clone(), Term::iri(""), Iri::new(""), None);
                Box::new(
                    self.osp
                        .range(lower..)
                        .take_while(move |(to, _, _, _)| *to == o)
                        .map(|(o, s, p, c)| Triple {
                            subject: s.clone(),
                            predicate: p.clone(),
                            object: o.clone(),
                            context: c.clone(),
                        })
                        .filter(move |t| pattern.matches(t)),
                )
            }
            (None, None, None) => Box::new(
                self.spo
                    .iter()
                    .map(to_triple_spo)
                    .filter(move |t| pattern.matches(t)),
            ),
        }
    }

    fn size(&self) -> usize {
        self.spo.len()
    }
}

fn to_triple_spo((s, p, o, c): &Spo) -> Triple {
    Triple {
        subject: s.clone(),
        predicate: p.clone(),
        object: o.clone(),
        context: c.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shacl_model::vocab::xsd;

    fn triple(s: &str, p: &str, o: Term) -> Triple {
        Triple::new(Term::iri(s), Iri::new(p), o)
    }

    #[test]
    fn add_is_idempotent() {
        let mut sail = MemorySail::new();
        let t = triple("http://ex/a", "http://ex/p", Term::iri("http://ex/b"));
        assert!(sail.add(t.clone()));
        assert!(!sail.add(t));
        assert_eq!(sail.size(), 1);
    }

    #[test]
    fn pattern_lookup_by_each_position() {
        let mut sail = MemorySail::new();
        sail.add(triple("http://ex/a", "http://ex/p", Term::iri("http://ex/b")));
        sail.add(triple("http://ex/a", "http://ex/q", Term::string("x")));
        sail.add(triple("http://ex/c", "http://ex/p", Term::iri("http://ex/b")));

        let by_subject = TriplePattern::any().with_subject(Term::iri("http://ex/a"));
        assert_eq!(sail.triples(&by_subject).count(), 2);

        let by_predicate = TriplePattern::any().with_predicate(Iri::new("http://ex/p"));
        assert_eq!(sail.triples(&by_predicate).count(), 2);

        let by_object = TriplePattern::any().with_object(Term::iri("http://ex/b"));
        assert_eq!(sail.triples(&by_object).count(), 2);

        assert!(sail.contains(
            &TriplePattern::any()
                .with_subject(Term::iri("http://ex/a"))
                .with_object(Term::string("x"))
        ));
    }

    #[test]
    fn remove_updates_all_indexes() {
        let mut sail = MemorySail::new();
        let t = triple(
            "http://ex/a",
            "http://ex/age",
            Term::typed("1", xsd::INTEGER),
        );
        sail.add(t.clone());
        assert!(sail.remove(&t));
        assert!(!sail.remove(&t));
        assert!(sail.is_empty());
        assert_eq!(
            sail.triples(&TriplePattern::any().with_object(Term::typed("1", xsd::INTEGER)))
                .count(),
            0
        );
    }
}
