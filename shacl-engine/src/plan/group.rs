//! Grouped counting over sorted streams
//!
//! Both nodes group consecutive tuples sharing an active target. A target
//! with no path values still forms a group when the upstream plan
//! left-outer-joined candidates against the values: its single tuple
//! carries no value and counts as zero, which is what lets min-count
//! violations by absence produce a row at all.

use crate::error::Result;
use crate::plan::{attach_sorted, DynPlan, PlanNode, TupleCursor, TupleIter};
use crate::tuple::ValidationTuple;

/// Decides from a value count whether the group's target is emitted
pub type CountPredicate = Box<dyn Fn(usize) -> bool>;

/// Decides from the full group whether the group's target is emitted
pub type GroupPredicate = Box<dyn Fn(&[ValidationTuple]) -> bool>;

/// Counts value-carrying tuples per target and emits the targets whose
/// count satisfies the predicate
pub struct GroupByCount {
    parent: DynPlan,
    predicate: CountPredicate,
    depth: usize,
}

impl GroupByCount {
    pub fn new(parent: DynPlan, predicate: CountPredicate) -> DynPlan {
        let parent = attach_sorted(parent);
        let depth = parent.depth() + 1;
        Box::new(GroupByCount {
            parent,
            predicate,
            depth,
        })
    }
}

impl PlanNode for GroupByCount {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let predicate = self.predicate;
        Ok(Box::new(GroupCursor {
            parent: self.parent.iter()?,
            lookahead: None,
            done: false,
            emit: Box::new(move |group: &[ValidationTuple]| {
                let count = group.iter().filter(|t| t.value().is_some()).count();
                predicate(count)
            }),
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
        "GroupByCount"
    }
}

/// Collects each target's group and emits the target when the predicate
/// holds over the collected tuples
pub struct GroupByFilter {
    parent: DynPlan,
    predicate: GroupPredicate,
    depth: usize,
}

impl GroupByFilter {
    pub fn new(parent: DynPlan, predicate: GroupPredicate) -> DynPlan {
        let parent = attach_sorted(parent);
        let depth = parent.depth() + 1;
        Box::new(GroupByFilter {
            parent,
            predicate,
            depth,
        })
    }
}

impl PlanNode for GroupByFilter {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        Ok(Box::new(GroupCursor {
            parent: self.parent.iter()?,
            lookahead: None,
            done: false,
            emit: self.predicate,
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
        "GroupByFilter"
    }
}

struct GroupCursor {
    parent: TupleIter,
    lookahead: Option<ValidationTuple>,
    done: bool,
    emit: GroupPredicate,
}

impl GroupCursor {
    fn pull(&mut self) -> Result<Option<ValidationTuple>> {
        if let Some(t) = self.lookahead.take() {
            return Ok(Some(t));
        }
        if self.done {
            return Ok(None);
        }
        let next = self.parent.next()?;
        if next.is_none() {
            self.done = true;
        }
        Ok(next)
    }
}

impl TupleCursor for GroupCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        loop {
            let head = match self.pull()? {
                Some(t) => t,
                None => return Ok(None),
            };
            let mut group = vec![head];
            loop {
                match self.pull()? {
                    Some(t) if t.same_target_as(&group[0]) => group.push(t),
                    Some(t) => {
                        self.lookahead = Some(t);
                        break;
                    }
                    None => break,
                }
            }
            if (self.emit)(&group) {
                return Ok(Some(group[0].trim_to_target()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::drain;
    use crate::plan::testutil::{prop_tuple, FixedNode};
    use crate::tuple::Scope;
    use shacl_model::Term;

    fn valueless(name: &str) -> ValidationTuple {
        ValidationTuple::new(
            Term::iri(format!("http://ex/{name}")),
            Scope::PropertyShape,
            false,
        )
    }

    #[test]
    fn min_count_emits_targets_below_threshold() {
        let input = FixedNode::new(
            vec![
                prop_tuple("a", "v1"),
                prop_tuple("a", "v2"),
                valueless("b"),
            ],
            true,
        );
        let out = drain(GroupByCount::new(input, Box::new(|count| count < 2))).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target().to_string(), "<http://ex/b>");
        assert!(out[0].value().is_none());
    }

    #[test]
    fn zero_count_group_still_produces_a_row() {
        let input = FixedNode::new(vec![valueless("a")], true);
        let out = drain(GroupByCount::new(input, Box::new(|count| count < 1))).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn max_count_emits_targets_above_threshold() {
        let input = FixedNode::new(
            vec![
                prop_tuple("a", "v1"),
                prop_tuple("a", "v2"),
                prop_tuple("b", "w"),
            ],
            true,
        );
        let out = drain(GroupByCount::new(input, Box::new(|count| count > 1))).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target().to_string(), "<http://ex/a>");
    }

    #[test]
    fn group_by_filter_sees_the_whole_group() {
        let input = FixedNode::new(
            vec![
                prop_tuple("a", "v1"),
                prop_tuple("a", "v1"),
                prop_tuple("b", "w"),
            ],
            true,
        );
        // Fires when any value repeats within the group.
        let out = drain(GroupByFilter::new(
            input,
            Box::new(|group| {
                group.iter().enumerate().any(|(i, t)| {
                    group[..i].iter().any(|u| u.value() == t.value() && t.value().is_some())
                })
            }),
        ))
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target().to_string(), "<http://ex/a>");
    }
}
