//! The `SailReader` trait: the engine's only view of storage

use crate::error::Result;
use crate::query;
use shacl_model::{Term, Triple, TriplePattern};
use std::collections::BTreeMap;

/// One result row of a declarative query: variable name to bound term.
/// Variables left unbound by an OPTIONAL block are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    bindings: BTreeMap<String, Term>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn bind(&mut self, var: impl Into<String>, term: Term) {
        self.bindings.insert(var.into(), term);
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    pub fn is_bound(&self, var: &str) -> bool {
        self.bindings.contains_key(var)
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(|k| k.as_str())
    }
}

/// Read access to a triple store
///
/// Connection handles behind this trait are assumed single-threaded and
/// non-reentrant; separate plans that must run concurrently need separate
/// handles onto the same snapshot.
pub trait SailReader {
    /// Stream all triples matching the pattern
    fn triples<'a>(&'a self, pattern: &TriplePattern) -> Box<dyn Iterator<Item = Triple> + 'a>;

    /// Membership test
    fn contains(&self, pattern: &TriplePattern) -> bool {
        self.triples(pattern).next().is_some()
    }

    /// Number of triples in the store
    fn size(&self) -> usize;

    /// Whether the store holds no triples at all
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Evaluate a declarative query against this reader
    ///
    /// The query text is the engine's SPARQL-like subset; see
    /// [`crate::query`] for the grammar and the bound-values injection
    /// convention. The default implementation parses the text and runs the
    /// reference evaluator over `triples()`; a real backend would hand the
    /// text to its own query engine instead.
    fn evaluate(&self, query_text: &str) -> Result<Vec<Row>> {
        let parsed = query::parse(query_text)?;
        query::evaluate(self, &parsed)
    }
}
