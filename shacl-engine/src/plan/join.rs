//! Merge joins over sorted tuple streams
//!
//! All joins here key on active-target equality and require both inputs in
//! sorted order; the left input's active targets must additionally be
//! unique (the right side may repeat). [`EqualsJoinValue`] tightens the key
//! to the (active-target, value) pair.

use crate::error::Result;
use crate::plan::{
    attach_sorted, DynPlan, PlanNode, PushStep, PushView, SplitCore, TupleCursor, TupleIter,
};
use crate::tuple::ValidationTuple;
use std::cmp::Ordering;

const JOINED: usize = 0;
const DISCARDED_LEFT: usize = 1;
const DISCARDED_RIGHT: usize = 2;

/// The three correlated outputs of an [`InnerJoin`]
///
/// Discarded outputs are present only when requested at build time;
/// unrequested fallthrough is dropped instead of buffered.
pub struct JoinOutputs {
    pub joined: DynPlan,
    pub discarded_left: Option<DynPlan>,
    pub discarded_right: Option<DynPlan>,
}

/// Sorted merge join on active-target equality with up to three outputs:
/// joined rows, unmatched left rows, unmatched right rows
pub struct InnerJoin;

impl InnerJoin {
    /// Joined output only; unmatched rows on either side are dropped
    pub fn new(left: DynPlan, right: DynPlan) -> DynPlan {
        InnerJoin::with_discarded(left, right, false, false).joined
    }

    pub fn with_discarded(
        left: DynPlan,
        right: DynPlan,
        keep_left: bool,
        keep_right: bool,
    ) -> JoinOutputs {
        let left = attach_sorted(left);
        let right = attach_sorted(right);
        let depth = left.depth().max(right.depth()) + 1;
        let step = Box::new(InnerJoinStep {
            left: Lookahead::new(left),
            right: Lookahead::new(right),
            left_matched: false,
            keep_left,
            keep_right,
        });
        // All consumed outputs buffer: siblings are read at unrelated rates.
        let core = SplitCore::new(step, vec![true, true, true]);
        JoinOutputs {
            joined: PushView::new(&core, JOINED, true, depth, "InnerJoin"),
            discarded_left: keep_left
                .then(|| PushView::new(&core, DISCARDED_LEFT, true, depth, "InnerJoinDiscardedLeft")),
            discarded_right: keep_right.then(|| {
                PushView::new(&core, DISCARDED_RIGHT, true, depth, "InnerJoinDiscardedRight")
            }),
        }
    }
}

/// Deferred-open lookahead over a plan's cursor
///
/// The cursor is opened on first use so that building a join does not touch
/// storage before the plan is pulled.
struct Lookahead {
    plan: Option<DynPlan>,
    cursor: Option<TupleIter>,
    head: Option<ValidationTuple>,
}

impl Lookahead {
    fn new(plan: DynPlan) -> Self {
        Lookahead {
            plan: Some(plan),
            cursor: None,
            head: None,
        }
    }

    fn peek(&mut self) -> Result<Option<&ValidationTuple>> {
        if self.cursor.is_none() {
            if let Some(plan) = self.plan.take() {
                let mut cursor = plan.iter()?;
                self.head = cursor.next()?;
                self.cursor = Some(cursor);
            }
        }
        Ok(self.head.as_ref())
    }

    fn take(&mut self) -> Result<Option<ValidationTuple>> {
        self.peek()?;
        let out = self.head.take();
        if let Some(cursor) = &mut self.cursor {
            self.head = cursor.next()?;
        }
        Ok(out)
    }
}

struct InnerJoinStep {
    left: Lookahead,
    right: Lookahead,
    left_matched: bool,
    keep_left: bool,
    keep_right: bool,
}

impl PushStep for InnerJoinStep {
    fn advance(&mut self, out: &mut dyn FnMut(usize, ValidationTuple)) -> Result<bool> {
        let cmp = match (self.left.peek()?, self.right.peek()?) {
            (None, None) => return Ok(false),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(l), Some(r)) => l.compare_active_target(r),
        };
        match cmp {
            Ordering::Less => {
                let matched = self.left_matched;
                self.left_matched = false;
                if let Some(left) = self.left.take()? {
                    if !matched && self.keep_left {
                        out(DISCARDED_LEFT, left);
                    }
                }
            }
            Ordering::Greater => {
                if let Some(right) = self.right.take()? {
                    if self.keep_right {
                        out(DISCARDED_RIGHT, right);
                    }
                }
            }
            Ordering::Equal => {
                // Left stays put so it can match every equal right row.
                self.left_matched = true;
                let joined = match (self.left.peek()?, self.right.take()?) {
                    (Some(left), Some(right)) => left.join(&right),
                    _ => return Ok(false),
                };
                out(JOINED, joined);
            }
        }
        Ok(true)
    }
}

/// Sorted merge join keeping every left row; matched rows take their value
/// from the right, unmatched rows pass through value-less
pub struct LeftOuterJoin {
    left: DynPlan,
    right: DynPlan,
    depth: usize,
}

impl LeftOuterJoin {
    pub fn new(left: DynPlan, right: DynPlan) -> DynPlan {
        let left = attach_sorted(left);
        let right = attach_sorted(right);
        let depth = left.depth().max(right.depth()) + 1;
        Box::new(LeftOuterJoin { left, right, depth })
    }
}

impl PlanNode for LeftOuterJoin {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        Ok(Box::new(LeftOuterJoinCursor {
            left: Lookahead::new(self.left),
            right: Lookahead::new(self.right),
            left_matched: false,
        }))
    }

    fn produces_sorted(&self) -> bool {
        true
    }

    fn requires_sorted_input(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "LeftOuterJoin"
    }
}

struct LeftOuterJoinCursor {
    left: Lookahead,
    right: Lookahead,
    left_matched: bool,
}

impl TupleCursor for LeftOuterJoinCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        loop {
            let cmp = match (self.left.peek()?, self.right.peek()?) {
                (None, _) => return Ok(None),
                (Some(_), None) => Ordering::Less,
                (Some(l), Some(r)) => l.compare_active_target(r),
            };
            match cmp {
                Ordering::Less => {
                    let matched = self.left_matched;
                    self.left_matched = false;
                    let left = self.left.take()?;
                    if !matched {
                        return Ok(left);
                    }
                }
                Ordering::Greater => {
                    self.right.take()?;
                }
                Ordering::Equal => {
                    self.left_matched = true;
                    let joined = match (self.left.peek()?, self.right.take()?) {
                        (Some(left), Some(right)) => left.join(&right),
                        _ => return Ok(None),
                    };
                    return Ok(Some(joined));
                }
            }
        }
    }
}

/// Merge join on (active-target, value) pair equality
///
/// Emits one tuple per pair present in both streams, with provenance
/// merged from both sides. Used to compare two sub-shape result streams
/// row for row.
pub struct EqualsJoinValue {
    left: DynPlan,
    right: DynPlan,
    depth: usize,
}

impl EqualsJoinValue {
    pub fn new(left: DynPlan, right: DynPlan) -> DynPlan {
        let left = attach_sorted(left);
        let right = attach_sorted(right);
        let depth = left.depth().max(right.depth()) + 1;
        Box::new(EqualsJoinValue { left, right, depth })
    }
}

impl PlanNode for EqualsJoinValue {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        Ok(Box::new(EqualsJoinValueCursor {
            left: Lookahead::new(self.left),
            right: Lookahead::new(self.right),
        }))
    }

    fn produces_sorted(&self) -> bool {
        true
    }

    fn requires_sorted_input(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "EqualsJoinValue"
    }
}

struct EqualsJoinValueCursor {
    left: Lookahead,
    right: Lookahead,
}

impl TupleCursor for EqualsJoinValueCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        loop {
            let cmp = match (self.left.peek()?, self.right.peek()?) {
                (None, _) | (_, None) => return Ok(None),
                (Some(l), Some(r)) => l
                    .compare_active_target(r)
                    .then_with(|| l.compare_value(r)),
            };
            match cmp {
                Ordering::Less => {
                    self.left.take()?;
                }
                Ordering::Greater => {
                    self.right.take()?;
                }
                Ordering::Equal => {
                    let joined = match (self.left.take()?, self.right.take()?) {
                        (Some(left), Some(right)) => left.join(&right),
                        _ => return Ok(None),
                    };
                    return Ok(Some(joined));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::drain;
    use crate::plan::testutil::{node_tuple, prop_tuple, FixedNode};
    use crate::tuple::Scope;
    use shacl_model::Term;

    fn left_targets(names: &[&str]) -> DynPlan {
        FixedNode::new(
            names
                .iter()
                .map(|n| {
                    ValidationTuple::new(
                        Term::iri(format!("http://ex/{n}")),
                        Scope::PropertyShape,
                        false,
                    )
                })
                .collect(),
            true,
        )
    }

    #[test]
    fn inner_join_partitions_into_three_outputs() {
        let left = left_targets(&["a", "b", "c"]);
        let right = FixedNode::new(
            vec![
                prop_tuple("b", "v1"),
                prop_tuple("b", "v2"),
                prop_tuple("d", "w"),
            ],
            true,
        );
        let outputs = InnerJoin::with_discarded(left, right, true, true);
        let joined = drain(outputs.joined).unwrap();
        let dl = drain(outputs.discarded_left.unwrap()).unwrap();
        let dr = drain(outputs.discarded_right.unwrap()).unwrap();

        assert_eq!(joined.len(), 2);
        assert!(joined.iter().all(|t| t.active_target().to_string() == "<http://ex/b>"));
        assert_eq!(joined[0].value(), Some(&Term::iri("http://ex/v1")));

        let dl_names: Vec<String> = dl.iter().map(|t| t.active_target().to_string()).collect();
        assert_eq!(dl_names, vec!["<http://ex/a>", "<http://ex/c>"]);

        assert_eq!(dr.len(), 1);
        assert_eq!(dr[0].active_target().to_string(), "<http://ex/d>");
    }

    #[test]
    fn inner_join_counts_add_up() {
        let left = left_targets(&["a", "b"]);
        let right = FixedNode::new(
            vec![prop_tuple("a", "v1"), prop_tuple("a", "v2")],
            true,
        );
        let outputs = InnerJoin::with_discarded(left, right, true, true);
        let joined = drain(outputs.joined).unwrap().len();
        let dr = drain(outputs.discarded_right.unwrap()).unwrap().len();
        assert_eq!(joined + dr, 2);
    }

    #[test]
    fn left_outer_join_keeps_unmatched_lefts() {
        let left = left_targets(&["a", "b"]);
        let right = FixedNode::new(vec![prop_tuple("b", "v")], true);
        let out = drain(LeftOuterJoin::new(left, right)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].value(), None);
        assert_eq!(out[1].value(), Some(&Term::iri("http://ex/v")));
    }

    #[test]
    fn equals_join_value_matches_pairs_only() {
        let left = FixedNode::new(
            vec![prop_tuple("a", "v1"), prop_tuple("b", "v2")],
            true,
        );
        let right = FixedNode::new(
            vec![prop_tuple("a", "v1"), prop_tuple("b", "v9")],
            true,
        );
        let out = drain(EqualsJoinValue::new(left, right)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target().to_string(), "<http://ex/a>");
    }

    #[test]
    fn pulling_only_discarded_right_still_drives_the_join() {
        let left = FixedNode::new(vec![node_tuple("a")], true);
        let right = FixedNode::new(vec![prop_tuple("z", "v")], true);
        let outputs = InnerJoin::with_discarded(left, right, false, true);
        let dr = drain(outputs.discarded_right.unwrap()).unwrap();
        assert_eq!(dr.len(), 1);
    }
}
