//! Pairwise predicate-vs-path comparison
//!
//! For every upstream target the values reachable via the shape's path are
//! compared as a set against the values of a fixed predicate. Invalid
//! values flow out on two sibling outputs keyed by which side they came
//! from, so the caller can report the correct property path per violation.

use crate::connections::ConnectionHandle;
use crate::error::Result;
use crate::plan::{attach_sorted, DynPlan, PushStep, PushView, SplitCore};
use crate::tuple::ValidationTuple;
use shacl_model::{term_cmp, value_compare, Iri, Term, TriplePattern};
use std::cmp::Ordering;

/// Which value set an invalid value originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvenanceSide {
    Path,
    Predicate,
}

/// Set operation applied to the (path values, predicate values) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairwiseOp {
    /// Violated by the symmetric difference of the two sets
    Equals,
    /// Violated by the intersection of the two sets
    Disjoint,
    /// Violated by any path value not strictly below every predicate value
    LessThan,
    /// Violated by any path value above some predicate value
    LessThanOrEquals,
}

const PATH_OUT: usize = 0;
const PREDICATE_OUT: usize = 1;

/// The two sibling outputs of a [`PairwiseCheck`]
pub struct PairwiseOutputs {
    pub path_invalid: DynPlan,
    pub predicate_invalid: DynPlan,
}

/// Per-target set comparison between path values and predicate values
pub struct PairwiseCheck;

impl PairwiseCheck {
    pub fn new(
        parent: DynPlan,
        conn: ConnectionHandle,
        path: Iri,
        predicate: Iri,
        op: PairwiseOp,
    ) -> PairwiseOutputs {
        let parent = attach_sorted(parent);
        let depth = parent.depth() + 1;
        let step = Box::new(PairwiseStep {
            parent: Some(parent),
            cursor: None,
            conn,
            path,
            predicate,
            op,
        });
        let core = SplitCore::new(step, vec![true, true]);
        PairwiseOutputs {
            path_invalid: PushView::new(&core, PATH_OUT, true, depth, "PairwiseCheckPath"),
            predicate_invalid: PushView::new(
                &core,
                PREDICATE_OUT,
                true,
                depth,
                "PairwiseCheckPredicate",
            ),
        }
    }
}

struct PairwiseStep {
    parent: Option<DynPlan>,
    cursor: Option<crate::plan::TupleIter>,
    conn: ConnectionHandle,
    path: Iri,
    predicate: Iri,
    op: PairwiseOp,
}

impl PairwiseStep {
    fn values_of(&self, target: &Term, predicate: &Iri) -> Vec<Term> {
        let pattern = TriplePattern::any()
            .with_subject(target.clone())
            .with_predicate(predicate.clone());
        let mut values: Vec<Term> = self
            .conn
            .triples(&pattern)
            .into_iter()
            .map(|t| t.object)
            .collect();
        values.sort_by(term_cmp);
        values.dedup();
        values
    }
}

/// A pair satisfies the order only when both sides are literals that
/// compare; anything else fails closed into a violation
fn pair_satisfies(a: &Term, b: &Term, strict: bool) -> bool {
    let (Term::Literal(a), Term::Literal(b)) = (a, b) else {
        return false;
    };
    match value_compare(a, b) {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => !strict,
        _ => false,
    }
}

impl PushStep for PairwiseStep {
    fn advance(&mut self, out: &mut dyn FnMut(usize, ValidationTuple)) -> Result<bool> {
        if self.cursor.is_none() {
            if let Some(parent) = self.parent.take() {
                self.cursor = Some(parent.iter()?);
            }
        }
        let Some(cursor) = &mut self.cursor else {
            return Ok(false);
        };
        let Some(tuple) = cursor.next()? else {
            return Ok(false);
        };

        let target = tuple.active_target().clone();
        let path_values = self.values_of(&target, &self.path);
        let predicate_values = self.values_of(&target, &self.predicate);

        match self.op {
            PairwiseOp::Equals => {
                for v in &path_values {
                    if !predicate_values.contains(v) {
                        out(PATH_OUT, tuple.set_value(v.clone()));
                    }
                }
                for v in &predicate_values {
                    if !path_values.contains(v) {
                        out(PREDICATE_OUT, tuple.set_value(v.clone()));
                    }
                }
            }
            PairwiseOp::Disjoint => {
                for v in &path_values {
                    if predicate_values.contains(v) {
                        out(PATH_OUT, tuple.set_value(v.clone()));
                    }
                }
            }
            PairwiseOp::LessThan | PairwiseOp::LessThanOrEquals => {
                let strict = self.op == PairwiseOp::LessThan;
                for v in &path_values {
                    let ok = predicate_values.iter().all(|w| pair_satisfies(v, w, strict));
                    if !ok {
                        out(PATH_OUT, tuple.set_value(v.clone()));
                    }
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::View;
    use crate::plan::drain;
    use crate::plan::testutil::FixedNode;
    use crate::tuple::Scope;
    use shacl_model::vocab::xsd;
    use shacl_model::Triple;
    use shacl_store::{ConnectionsGroup, MemorySail};
    use std::rc::Rc;

    fn int(n: i64) -> Term {
        Term::typed(n.to_string(), xsd::INTEGER)
    }

    fn handle(triples: Vec<Triple>) -> ConnectionHandle {
        let group = ConnectionsGroup::without_transaction(MemorySail::from_triples(triples));
        ConnectionHandle::new(Rc::new(group), View::Current)
    }

    fn target(name: &str) -> DynPlan {
        FixedNode::new(
            vec![ValidationTuple::new(
                Term::iri(format!("http://ex/{name}")),
                Scope::PropertyShape,
                false,
            )],
            true,
        )
    }

    fn triple(s: &str, p: &str, o: Term) -> Triple {
        Triple::new(
            Term::iri(format!("http://ex/{s}")),
            Iri::new(format!("http://ex/{p}")),
            o,
        )
    }

    #[test]
    fn equals_reports_symmetric_difference_per_side() {
        let conn = handle(vec![
            triple("a", "path", int(1)),
            triple("a", "path", int(2)),
            triple("a", "pred", int(2)),
            triple("a", "pred", int(3)),
        ]);
        let outputs = PairwiseCheck::new(
            target("a"),
            conn,
            Iri::new("http://ex/path"),
            Iri::new("http://ex/pred"),
            PairwiseOp::Equals,
        );
        let path = drain(outputs.path_invalid).unwrap();
        let pred = drain(outputs.predicate_invalid).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].value(), Some(&int(1)));
        assert_eq!(pred.len(), 1);
        assert_eq!(pred[0].value(), Some(&int(3)));
    }

    #[test]
    fn disjoint_reports_intersection() {
        let conn = handle(vec![
            triple("a", "path", int(1)),
            triple("a", "pred", int(1)),
            triple("a", "pred", int(2)),
        ]);
        let outputs = PairwiseCheck::new(
            target("a"),
            conn,
            Iri::new("http://ex/path"),
            Iri::new("http://ex/pred"),
            PairwiseOp::Disjoint,
        );
        let path = drain(outputs.path_invalid).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].value(), Some(&int(1)));
    }

    #[test]
    fn less_than_fails_closed_on_incomparable_values() {
        let conn = handle(vec![
            triple("a", "path", Term::iri("http://ex/not-a-literal")),
            triple("a", "pred", int(5)),
        ]);
        let outputs = PairwiseCheck::new(
            target("a"),
            conn,
            Iri::new("http://ex/path"),
            Iri::new("http://ex/pred"),
            PairwiseOp::LessThan,
        );
        let path = drain(outputs.path_invalid).unwrap();
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn less_than_or_equals_allows_ties() {
        let conn = handle(vec![
            triple("a", "path", int(5)),
            triple("a", "pred", int(5)),
        ]);
        let outputs = PairwiseCheck::new(
            target("a"),
            conn,
            Iri::new("http://ex/path"),
            Iri::new("http://ex/pred"),
            PairwiseOp::LessThanOrEquals,
        );
        let path = drain(outputs.path_invalid).unwrap();
        assert!(path.is_empty());
    }
}
