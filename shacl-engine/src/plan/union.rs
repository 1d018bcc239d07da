//! N-ary sorted merge

use crate::error::Result;
use crate::plan::{attach_sorted, DynPlan, EmptyNode, PlanNode, TupleCursor, TupleIter};
use crate::tuple::ValidationTuple;
use std::cmp::Ordering;

/// Merges any number of sorted children into one sorted stream
///
/// Construction flattens: zero children collapse to an empty plan and a
/// single child is returned untouched. Duplicates across children are kept;
/// put a [`crate::plan::Unique`] on top when set semantics are wanted.
pub struct UnionNode {
    children: Vec<DynPlan>,
    depth: usize,
}

impl UnionNode {
    pub fn new(children: Vec<DynPlan>) -> DynPlan {
        let mut children: Vec<DynPlan> = children.into_iter().map(attach_sorted).collect();
        match children.len() {
            0 => Box::new(EmptyNode),
            1 => children.pop().unwrap_or_else(|| Box::new(EmptyNode)),
            _ => {
                let depth = children.iter().map(|c| c.depth()).max().unwrap_or(0) + 1;
                Box::new(UnionNode { children, depth })
            }
        }
    }
}

impl PlanNode for UnionNode {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let mut lanes = Vec::with_capacity(self.children.len());
        for child in self.children {
            let mut cursor = child.iter()?;
            let head = cursor.next()?;
            lanes.push(Lane { cursor, head });
        }
        Ok(Box::new(UnionCursor { lanes }))
    }

    fn produces_sorted(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "UnionNode"
    }
}

struct Lane {
    cursor: TupleIter,
    head: Option<ValidationTuple>,
}

struct UnionCursor {
    lanes: Vec<Lane>,
}

fn merge_order(a: &ValidationTuple, b: &ValidationTuple) -> Ordering {
    a.compare_full_target(b).then_with(|| a.compare_value(b))
}

impl TupleCursor for UnionCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        let mut best: Option<usize> = None;
        for (idx, lane) in self.lanes.iter().enumerate() {
            let Some(candidate) = &lane.head else {
                continue;
            };
            let better = match best {
                None => true,
                Some(current) => {
                    // best is always Some(head) here
                    match &self.lanes[current].head {
                        Some(leader) => merge_order(candidate, leader) == Ordering::Less,
                        None => true,
                    }
                }
            };
            if better {
                best = Some(idx);
            }
        }
        let Some(idx) = best else {
            return Ok(None);
        };
        let lane = &mut self.lanes[idx];
        let out = lane.head.take();
        lane.head = lane.cursor.next()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::drain;
    use crate::plan::testutil::{node_tuple, targets, FixedNode};

    #[test]
    fn merges_in_sorted_order() {
        let left = FixedNode::new(vec![node_tuple("a"), node_tuple("c")], true);
        let right = FixedNode::new(vec![node_tuple("b"), node_tuple("d")], true);
        let out = drain(UnionNode::new(vec![left, right])).unwrap();
        let names: Vec<String> = targets(&out).iter().map(|t| t.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "<http://ex/a>",
                "<http://ex/b>",
                "<http://ex/c>",
                "<http://ex/d>"
            ]
        );
    }

    #[test]
    fn single_child_is_returned_untouched() {
        let only = FixedNode::new(vec![node_tuple("a")], true);
        let node = UnionNode::new(vec![only]);
        assert_eq!(node.name(), "Fixed");
    }

    #[test]
    fn empty_union_produces_nothing() {
        let out = drain(UnionNode::new(Vec::new())).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn unsorted_children_are_sorted_first() {
        let child = FixedNode::new(vec![node_tuple("b"), node_tuple("a")], false);
        let other = FixedNode::new(vec![node_tuple("c")], true);
        let out = drain(UnionNode::new(vec![child, other])).unwrap();
        let names: Vec<String> = targets(&out).iter().map(|t| t.to_string()).collect();
        assert_eq!(
            names,
            vec!["<http://ex/a>", "<http://ex/b>", "<http://ex/c>"]
        );
    }
}
