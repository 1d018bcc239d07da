//! Bulked joins against external storage
//!
//! The left side is a local sorted stream; per batch of up to [`BULK_SIZE`]
//! rows one query is executed with the batch's active targets spliced in as
//! a bound-values table. This amortizes per-row query overhead into one
//! round trip per batch, which is the engine's main lever against large
//! stores.

use crate::connections::{ConnectionHandle, View};
use crate::error::Result;
use crate::plan::{attach_sorted, DynPlan, PlanNode, TupleCursor, TupleIter};
use crate::tuple::{Scope, ValidationTuple};
use shacl_model::{Term, TriplePattern};
use shacl_store::inject_bindings;
use std::collections::VecDeque;

/// Left rows gathered per external query
pub const BULK_SIZE: usize = 128;

/// Emits one joined tuple per (left, matching right row); unmatched lefts
/// are dropped
pub struct BulkedExternalInnerJoin {
    inner: BulkJoin,
}

impl BulkedExternalInnerJoin {
    pub fn new(
        left: DynPlan,
        conn: ConnectionHandle,
        template: String,
        target_var: &'static str,
        value_var: &'static str,
        skip_based_on_previous: bool,
    ) -> DynPlan {
        Box::new(BulkedExternalInnerJoin {
            inner: BulkJoin::new(
                left,
                conn,
                template,
                target_var,
                value_var,
                skip_based_on_previous,
                false,
            ),
        })
    }
}

impl PlanNode for BulkedExternalInnerJoin {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        self.inner.open()
    }

    fn produces_sorted(&self) -> bool {
        true
    }

    fn requires_sorted_input(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        self.inner.depth
    }

    fn name(&self) -> &'static str {
        "BulkedExternalInnerJoin"
    }
}

/// Keeps every left row; lefts with no right match pass through value-less
pub struct BulkedExternalLeftOuterJoin {
    inner: BulkJoin,
}

impl BulkedExternalLeftOuterJoin {
    pub fn new(
        left: DynPlan,
        conn: ConnectionHandle,
        template: String,
        target_var: &'static str,
        value_var: &'static str,
        skip_based_on_previous: bool,
    ) -> DynPlan {
        Box::new(BulkedExternalLeftOuterJoin {
            inner: BulkJoin::new(
                left,
                conn,
                template,
                target_var,
                value_var,
                skip_based_on_previous,
                true,
            ),
        })
    }
}

impl PlanNode for BulkedExternalLeftOuterJoin {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        self.inner.open()
    }

    fn produces_sorted(&self) -> bool {
        true
    }

    fn requires_sorted_input(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        self.inner.depth
    }

    fn name(&self) -> &'static str {
        "BulkedExternalLeftOuterJoin"
    }
}

struct BulkJoin {
    left: DynPlan,
    conn: ConnectionHandle,
    template: String,
    target_var: &'static str,
    value_var: &'static str,
    skip_based_on_previous: bool,
    outer: bool,
    depth: usize,
}

impl BulkJoin {
    #[allow(clippy::too_many_arguments)]
    fn new(
        left: DynPlan,
        conn: ConnectionHandle,
        template: String,
        target_var: &'static str,
        value_var: &'static str,
        skip_based_on_previous: bool,
        outer: bool,
    ) -> BulkJoin {
        let left = attach_sorted(left);
        let depth = left.depth() + 1;
        BulkJoin {
            left,
            conn,
            template,
            target_var,
            value_var,
            skip_based_on_previous,
            outer,
            depth,
        }
    }

    fn open(self) -> Result<TupleIter> {
        let previous = self
            .skip_based_on_previous
            .then(|| self.conn.reroot(View::Previous));
        Ok(Box::new(BulkJoinCursor {
            left: self.left.iter()?,
            conn: self.conn,
            previous,
            template: self.template,
            target_var: self.target_var,
            value_var: self.value_var,
            outer: self.outer,
            pending: VecDeque::new(),
            done: false,
        }))
    }
}

struct BulkJoinCursor {
    left: TupleIter,
    conn: ConnectionHandle,
    /// Pre-transaction snapshot used to skip querying for untouched targets
    previous: Option<ConnectionHandle>,
    template: String,
    target_var: &'static str,
    value_var: &'static str,
    outer: bool,
    pending: VecDeque<ValidationTuple>,
    done: bool,
}

impl BulkJoinCursor {
    /// A target untouched by the transaction cannot have gained or lost
    /// path values, so it is left out of the query batch
    fn touched(&self, target: &Term) -> bool {
        let Some(previous) = &self.previous else {
            return true;
        };
        let as_subject = TriplePattern::any().with_subject(target.clone());
        if previous.contains(&as_subject) {
            return true;
        }
        let as_object = TriplePattern::any().with_object(target.clone());
        previous.contains(&as_object)
    }

    fn refill(&mut self) -> Result<bool> {
        let mut lefts: Vec<ValidationTuple> = Vec::with_capacity(BULK_SIZE);
        while lefts.len() < BULK_SIZE {
            match self.left.next()? {
                Some(tuple) => lefts.push(tuple),
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if lefts.is_empty() {
            return Ok(false);
        }

        let mut keys: Vec<Vec<Term>> = lefts
            .iter()
            .filter(|t| self.touched(t.active_target()))
            .map(|t| vec![t.active_target().clone()])
            .collect();
        keys.dedup();

        let mut rights: Vec<(Term, Term)> = Vec::new();
        if !keys.is_empty() {
            let query = inject_bindings(&self.template, &[self.target_var], &keys);
            for row in self.conn.evaluate(&query)? {
                if let (Some(target), Some(value)) =
                    (row.get(self.target_var), row.get(self.value_var))
                {
                    rights.push((target.clone(), value.clone()));
                }
            }
            rights.sort_by(|a, b| {
                shacl_model::term_cmp(&a.0, &b.0).then_with(|| shacl_model::term_cmp(&a.1, &b.1))
            });
        }

        for left in lefts {
            let target = left.active_target();
            let start = rights.partition_point(|(t, _)| {
                shacl_model::term_cmp(t, target) == std::cmp::Ordering::Less
            });
            let mut matched = false;
            for (t, value) in rights[start..].iter() {
                if t != target {
                    break;
                }
                matched = true;
                let right =
                    ValidationTuple::pair(t.clone(), value.clone(), Scope::PropertyShape, true);
                self.pending.push_back(left.join(&right));
            }
            if !matched && self.outer {
                self.pending.push_back(left);
            }
        }
        Ok(true)
    }
}

impl TupleCursor for BulkJoinCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        loop {
            if let Some(tuple) = self.pending.pop_front() {
                return Ok(Some(tuple));
            }
            if self.done {
                return Ok(None);
            }
            if !self.refill()? {
                return Ok(None);
            }
        }
    }
}
