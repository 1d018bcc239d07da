//! Triples and triple patterns

use crate::term::{Iri, Term};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A subject-predicate-object triple with an optional graph context
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Iri,
    pub object: Term,
    pub context: Option<Iri>,
}

impl Triple {
    pub fn new(subject: Term, predicate: Iri, object: Term) -> Self {
        debug_assert!(subject.is_resource(), "literal in subject position");
        Triple {
            subject,
            predicate,
            object,
            context: None,
        }
    }

    pub fn with_context(mut self, context: Iri) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A triple pattern: each position optionally fixed, `None` = wildcard
///
/// The context position distinguishes "any context" (`ContextMatch::Any`)
/// from "exactly the default graph" (`ContextMatch::Default`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Option<Term>,
    pub predicate: Option<Iri>,
    pub object: Option<Term>,
    pub context: ContextMatch,
}

/// Context position of a [`TriplePattern`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContextMatch {
    /// Match triples in any context
    #[default]
    Any,
    /// Match only default-graph triples
    Default,
    /// Match only triples in the named context
    Named(Iri),
}

impl TriplePattern {
    pub fn any() -> Self {
        TriplePattern::default()
    }

    pub fn with_subject(mut self, subject: Term) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_predicate(mut self, predicate: Iri) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_object(mut self, object: Term) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_context(mut self, context: ContextMatch) -> Self {
        self.context = context;
        self
    }

    /// Does the triple match this pattern?
    pub fn matches(&self, triple: &Triple) -> bool {
        if let Some(s) = &self.subject {
            if s != &triple.subject {
                return false;
            }
        }
        if let Some(p) = &self.predicate {
            if p != &triple.predicate {
                return false;
            }
        }
        if let Some(o) = &self.object {
            if o != &triple.object {
                return false;
            }
        }
        match &self.context {
            ContextMatch::Any => true,
            ContextMatch::Default => triple.context.is_none(),
            ContextMatch::Named(c) => triple.context.as_ref() == Some(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Triple {
        Triple::new(
            Term::iri("http://ex/alice"),
            Iri::new("http://ex/knows"),
            Term::iri("http://ex/bob"),
        )
    }

    #[test]
    fn wildcard_pattern_matches_everything() {
        assert!(TriplePattern::any().matches(&sample()));
    }

    #[test]
    fn fixed_positions_must_match() {
        let t = sample();
        assert!(TriplePattern::any()
            .with_predicate(Iri::new("http://ex/knows"))
            .matches(&t));
        assert!(!TriplePattern::any()
            .with_predicate(Iri::new("http://ex/likes"))
            .matches(&t));
        assert!(!TriplePattern::any()
            .with_subject(Term::iri("http://ex/bob"))
            .matches(&t));
    }

    #[test]
    fn context_matching() {
        let default = sample();
        let named = sample().with_context(Iri::new("http://ex/g1"));

        let any = TriplePattern::any();
        assert!(any.matches(&default) && any.matches(&named));

        let only_default = TriplePattern::any().with_context(ContextMatch::Default);
        assert!(only_default.matches(&default));
        assert!(!only_default.matches(&named));

        let only_g1 =
            TriplePattern::any().with_context(ContextMatch::Named(Iri::new("http://ex/g1")));
        assert!(only_g1.matches(&named));
        assert!(!only_g1.matches(&default));
    }
}
