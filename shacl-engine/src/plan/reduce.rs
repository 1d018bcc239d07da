//! Set-membership filtering of one stream against another
//!
//! All three nodes fully materialize the comparison stream into a hash set
//! before the first tuple of the filtered stream is produced. No order is
//! required on either input; the parent's order survives untouched.

use crate::error::Result;
use crate::plan::{DynPlan, PlanNode, TupleCursor, TupleIter};
use crate::tuple::ValidationTuple;
use shacl_model::Term;
use std::collections::HashSet;

/// The bound value when there is one, else the active target
fn membership_key(tuple: &ValidationTuple) -> &Term {
    tuple.value().unwrap_or_else(|| tuple.active_target())
}

fn collect_keys(plan: DynPlan, key: fn(&ValidationTuple) -> &Term) -> Result<HashSet<Term>> {
    let mut cursor = plan.iter()?;
    let mut set = HashSet::new();
    while let Some(tuple) = cursor.next()? {
        set.insert(key(&tuple).clone());
    }
    Ok(set)
}

/// Keeps parent tuples whose active target also occurs as an active target
/// in the reduction stream
pub struct ReduceTargets {
    parent: DynPlan,
    reduction: DynPlan,
    depth: usize,
}

impl ReduceTargets {
    pub fn new(parent: DynPlan, reduction: DynPlan) -> DynPlan {
        let depth = parent.depth().max(reduction.depth()) + 1;
        Box::new(ReduceTargets {
            parent,
            reduction,
            depth,
        })
    }
}

impl PlanNode for ReduceTargets {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let targets = collect_keys(self.reduction, |t| t.active_target())?;
        Ok(Box::new(MembershipCursor {
            parent: self.parent.iter()?,
            set: targets,
            key: |t| t.active_target(),
            keep_members: true,
        }))
    }

    fn produces_sorted(&self) -> bool {
        self.parent.produces_sorted()
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "ReduceTargets"
    }
}

/// Keeps parent tuples whose value occurs among the values of the
/// comparison stream
pub struct ValuesIn {
    parent: DynPlan,
    values: DynPlan,
    depth: usize,
}

impl ValuesIn {
    pub fn new(parent: DynPlan, values: DynPlan) -> DynPlan {
        let depth = parent.depth().max(values.depth()) + 1;
        Box::new(ValuesIn {
            parent,
            values,
            depth,
        })
    }
}

impl PlanNode for ValuesIn {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let set = collect_keys(self.values, membership_key)?;
        Ok(Box::new(MembershipCursor {
            parent: self.parent.iter()?,
            set,
            key: membership_key,
            keep_members: true,
        }))
    }

    fn produces_sorted(&self) -> bool {
        self.parent.produces_sorted()
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "ValuesIn"
    }
}

/// Drops parent tuples whose value occurs among the values of the
/// comparison stream; the complement of [`ValuesIn`]
pub struct NotValuesIn {
    parent: DynPlan,
    values: DynPlan,
    depth: usize,
}

impl NotValuesIn {
    pub fn new(parent: DynPlan, values: DynPlan) -> DynPlan {
        let depth = parent.depth().max(values.depth()) + 1;
        Box::new(NotValuesIn {
            parent,
            values,
            depth,
        })
    }
}

impl PlanNode for NotValuesIn {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let set = collect_keys(self.values, membership_key)?;
        Ok(Box::new(MembershipCursor {
            parent: self.parent.iter()?,
            set,
            key: membership_key,
            keep_members: false,
        }))
    }

    fn produces_sorted(&self) -> bool {
        self.parent.produces_sorted()
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "NotValuesIn"
    }
}

struct MembershipCursor {
    parent: TupleIter,
    set: HashSet<Term>,
    key: fn(&ValidationTuple) -> &Term,
    keep_members: bool,
}

impl TupleCursor for MembershipCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        while let Some(tuple) = self.parent.next()? {
            if self.set.contains((self.key)(&tuple)) == self.keep_members {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::drain;
    use crate::plan::testutil::{node_tuple, prop_tuple, targets, FixedNode};

    #[test]
    fn reduce_targets_keeps_overlap_only() {
        let parent = FixedNode::new(
            vec![node_tuple("a"), node_tuple("b"), node_tuple("c")],
            true,
        );
        let reduction = FixedNode::new(vec![node_tuple("b"), node_tuple("c")], true);
        let out = drain(ReduceTargets::new(parent, reduction)).unwrap();
        let names: Vec<String> = targets(&out).iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["<http://ex/b>", "<http://ex/c>"]);
    }

    #[test]
    fn values_in_filters_on_bound_value() {
        let parent = FixedNode::new(
            vec![prop_tuple("a", "v1"), prop_tuple("b", "v2")],
            true,
        );
        let values = FixedNode::new(vec![prop_tuple("x", "v2")], true);
        let out = drain(ValuesIn::new(parent, values)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target().to_string(), "<http://ex/b>");
    }

    #[test]
    fn not_values_in_is_the_complement() {
        let parent = FixedNode::new(
            vec![prop_tuple("a", "v1"), prop_tuple("b", "v2")],
            true,
        );
        let values = FixedNode::new(vec![prop_tuple("x", "v2")], true);
        let out = drain(NotValuesIn::new(parent, values)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target().to_string(), "<http://ex/a>");
    }

    #[test]
    fn empty_comparison_stream_drops_everything_or_nothing() {
        let parent = FixedNode::new(vec![node_tuple("a")], true);
        let out = drain(ValuesIn::new(parent, FixedNode::new(Vec::new(), true))).unwrap();
        assert!(out.is_empty());

        let parent = FixedNode::new(vec![node_tuple("a")], true);
        let out = drain(NotValuesIn::new(parent, FixedNode::new(Vec::new(), true))).unwrap();
        assert_eq!(out.len(), 1);
    }
}
