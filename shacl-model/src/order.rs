//! Deterministic total order over terms
//!
//! Every sorted plan node, merge join and dedup step in the engine relies
//! on this exact order, so it must be total and stable across runs:
//!
//! 1. Kind class: IRI < blank node < literal
//! 2. IRIs by string, blank nodes by identifier
//! 3. Literals by datatype IRI, then lexical form, then language tag
//!
//! Literal ordering here is an *identity* order, not value-space ordering:
//! `"01"^^xsd:integer` and `"1"^^xsd:integer` are distinct terms and sort
//! apart. Value-space comparison for range constraints lives in
//! [`crate::datatype::value_compare`].

use crate::term::{Literal, Term};
use std::cmp::Ordering;

fn kind_rank(term: &Term) -> u8 {
    match term {
        Term::Iri(_) => 0,
        Term::BlankNode(_) => 1,
        Term::Literal(_) => 2,
    }
}

fn literal_cmp(a: &Literal, b: &Literal) -> Ordering {
    a.datatype()
        .cmp(b.datatype())
        .then_with(|| a.lexical().cmp(b.lexical()))
        .then_with(|| a.language().cmp(&b.language()))
}

/// Compare two terms in the engine's total order
pub fn term_cmp(a: &Term, b: &Term) -> Ordering {
    match (a, b) {
        (Term::Iri(x), Term::Iri(y)) => x.cmp(y),
        (Term::BlankNode(x), Term::BlankNode(y)) => x.cmp(y),
        (Term::Literal(x), Term::Literal(y)) => literal_cmp(x, y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        term_cmp(self, other)
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::xsd;

    #[test]
    fn kind_classes_order() {
        let iri = Term::iri("http://ex/z");
        let bnode = Term::bnode("a");
        let lit = Term::string("a");

        assert!(iri < bnode);
        assert!(bnode < lit);
        assert!(iri < lit);
    }

    #[test]
    fn iris_order_by_string() {
        assert!(Term::iri("http://ex/a") < Term::iri("http://ex/b"));
    }

    #[test]
    fn literal_identity_order_is_total() {
        // Same value in value space, different terms: must not compare equal.
        let a = Term::typed("01", xsd::INTEGER);
        let b = Term::typed("1", xsd::INTEGER);
        assert_ne!(term_cmp(&a, &b), Ordering::Equal);
        // Antisymmetry
        assert_eq!(term_cmp(&a, &b), term_cmp(&b, &a).reverse());
    }

    #[test]
    fn lang_tag_breaks_ties() {
        let a = Term::lang_tagged("hi", "en");
        let b = Term::lang_tagged("hi", "no");
        assert!(a < b);
    }
}
