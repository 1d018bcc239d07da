//! Duplicate elimination over sorted streams

use crate::error::Result;
use crate::plan::{attach_sorted, DynPlan, PlanNode, TupleCursor, TupleIter};
use crate::tuple::ValidationTuple;

/// Removes duplicates from a sorted stream
///
/// Plain mode drops exact repeats of the same chain. Compress mode
/// collapses every run of tuples sharing a target chain into one
/// representative whose compressed set carries all the originals, so later
/// violation marking still reaches each source tuple.
pub struct Unique {
    parent: DynPlan,
    compress: bool,
    depth: usize,
}

impl Unique {
    pub fn new(parent: DynPlan, compress: bool) -> DynPlan {
        let parent = attach_sorted(parent);
        let depth = parent.depth() + 1;
        Box::new(Unique {
            parent,
            compress,
            depth,
        })
    }
}

impl PlanNode for Unique {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        Ok(Box::new(UniqueCursor {
            parent: self.parent.iter()?,
            compress: self.compress,
            lookahead: None,
            done: false,
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
        "Unique"
    }
}

struct UniqueCursor {
    parent: TupleIter,
    compress: bool,
    lookahead: Option<ValidationTuple>,
    done: bool,
}

impl UniqueCursor {
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

    fn same_group(&self, a: &ValidationTuple, b: &ValidationTuple) -> bool {
        if self.compress {
            a.target_chain(false) == b.target_chain(false)
        } else {
            a.compare_full_target(b) == std::cmp::Ordering::Equal
                && a.compare_value(b) == std::cmp::Ordering::Equal
        }
    }
}

impl TupleCursor for UniqueCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        let head = match self.pull()? {
            Some(t) => t,
            None => return Ok(None),
        };

        let mut group = vec![head];
        loop {
            match self.pull()? {
                Some(t) if self.same_group(&group[0], &t) => group.push(t),
                Some(t) => {
                    self.lookahead = Some(t);
                    break;
                }
                None => break,
            }
        }

        if group.len() == 1 {
            let mut iter = group.into_iter();
            return Ok(iter.next());
        }

        if self.compress {
            // The representative's own chain stands in for the whole run;
            // provenance lives in the compressed set.
            let sources: Vec<ValidationTuple> = group
                .iter()
                .flat_map(|t| {
                    if t.compressed().is_empty() {
                        vec![t.clone()]
                    } else {
                        t.compressed().to_vec()
                    }
                })
                .collect();
            Ok(Some(group[0].with_compressed(sources)))
        } else {
            // Exact repeats: keep the first, fold in any provenance the
            // dropped repeats carried.
            let mut merged = group[0].compressed().to_vec();
            for t in &group[1..] {
                for src in t.compressed() {
                    if !merged.contains(src) {
                        merged.push(src.clone());
                    }
                }
            }
            if merged.is_empty() {
                let mut iter = group.into_iter();
                Ok(iter.next())
            } else {
                Ok(Some(group[0].with_compressed(merged)))
            }
        }
    }
}
