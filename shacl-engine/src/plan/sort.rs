//! Sorting barrier between unsorted producers and order-requiring consumers

use crate::error::Result;
use crate::plan::{check_cancelled, CancelFlag, DynPlan, PlanNode, TupleIter, VecCursor};
use crate::tuple::ValidationTuple;

/// Above this many tuples the sort switches to a parallel sort
const PARALLEL_SORT_THRESHOLD: usize = 8192;

/// How often the materialization loop checks the cancel flag
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Materializes its input and emits it in full-target order
///
/// A no-op wrapper is never built: [`Sort::new`] returns the parent
/// untouched when it already sorts.
pub struct Sort {
    parent: DynPlan,
    cancel: Option<CancelFlag>,
    depth: usize,
}

impl Sort {
    pub fn new(parent: DynPlan) -> DynPlan {
        Sort::build(parent, None)
    }

    pub fn with_cancel(parent: DynPlan, cancel: CancelFlag) -> DynPlan {
        Sort::build(parent, Some(cancel))
    }

    fn build(parent: DynPlan, cancel: Option<CancelFlag>) -> DynPlan {
        if parent.produces_sorted() {
            return parent;
        }
        let depth = parent.depth() + 1;
        Box::new(Sort {
            parent,
            cancel,
            depth,
        })
    }
}

impl PlanNode for Sort {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let mut cursor = self.parent.iter()?;
        let mut tuples: Vec<ValidationTuple> = Vec::new();
        while let Some(tuple) = cursor.next()? {
            tuples.push(tuple);
            if tuples.len() % CANCEL_CHECK_INTERVAL == 0 {
                if let Some(flag) = &self.cancel {
                    check_cancelled(flag)?;
                }
            }
        }
        // Ties on the target chain are broken by the bound value so that
        // exact repeats end up adjacent for downstream dedup.
        if tuples.len() > PARALLEL_SORT_THRESHOLD {
            rayon::slice::ParallelSliceMut::par_sort_unstable_by(&mut tuples[..], |a, b| {
                a.compare_full_target(b).then_with(|| a.compare_value(b))
            });
        } else {
            tuples.sort_by(|a, b| a.compare_full_target(b).then_with(|| a.compare_value(b)));
        }
        if let Some(flag) = &self.cancel {
            check_cancelled(flag)?;
        }
        Ok(Box::new(VecCursor::new(tuples)))
    }

    fn produces_sorted(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "Sort"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::testutil::{node_tuple, targets, FixedNode};
    use crate::plan::drain;
    use std::sync::atomic::Ordering;
    use std::sync::{atomic::AtomicBool, Arc};

    #[test]
    fn sorts_by_active_target() {
        let input = FixedNode::new(
            vec![node_tuple("c"), node_tuple("a"), node_tuple("b")],
            false,
        );
        let sorted = Sort::new(input);
        assert!(sorted.produces_sorted());
        let out = drain(sorted).unwrap();
        let names: Vec<String> = targets(&out).iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["<http://ex/a>", "<http://ex/b>", "<http://ex/c>"]);
    }

    #[test]
    fn already_sorted_parent_is_not_wrapped() {
        let input = FixedNode::new(vec![node_tuple("a"), node_tuple("b")], true);
        let node = Sort::new(input);
        assert_eq!(node.name(), "Fixed");
    }

    #[test]
    fn cancellation_surfaces_as_error() {
        let flag = Arc::new(AtomicBool::new(false));
        flag.store(true, Ordering::Relaxed);
        let input = FixedNode::new(
            (0..2048).map(|i| node_tuple(&format!("n{i:05}"))).collect(),
            false,
        );
        let sorted = Sort::with_cancel(input, flag);
        assert!(drain(sorted).is_err());
    }
}
