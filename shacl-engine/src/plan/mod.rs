//! Plan node protocol
//!
//! A validation plan is a graph of nodes rooted at source nodes and pulled
//! lazily from the top. Nodes are single-use: `iter` consumes the node, so
//! the one-shot contract is enforced by ownership rather than a runtime
//! flag. Cursors release their resources on drop.
//!
//! Some nodes produce several correlated outputs from one pass over a
//! shared parent (a filter's true/false branches, an inner join's three
//! outputs). Those are modeled as [`PushView`]s over a shared driver: each
//! view owns an output queue, and pulling any view advances the driver
//! until that view's queue is non-empty. Queues are either buffered
//! (unread siblings may accumulate) or unbuffered (plan topology
//! guarantees lockstep consumption; more than one pending tuple is a
//! topology bug caught by a debug assertion).

use crate::error::Result;
use crate::trace::SharedTrace;
use crate::tuple::ValidationTuple;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod bulk;
pub mod filter;
pub mod group;
pub mod join;
pub mod pairwise;
pub mod reduce;
pub mod select;
pub mod sort;
pub mod union;
pub mod unique;

pub use bulk::{BulkedExternalInnerJoin, BulkedExternalLeftOuterJoin};
pub use filter::{
    DatatypeFilter, ExternalPredicateObjectFilter, FilterNode, FilterOutputs, LanguageInFilter,
    LengthFilter, NodeKindFilter, PatternFilter, RangeBound, RangeFilter, TripleExistsFilter,
    TupleFilter, ValueInFilter,
};
pub use group::{GroupByCount, GroupByFilter};
pub use join::{EqualsJoinValue, InnerJoin, JoinOutputs, LeftOuterJoin};
pub use pairwise::{PairwiseCheck, PairwiseOp, PairwiseOutputs, ProvenanceSide};
pub use reduce::{NotValuesIn, ReduceTargets, ValuesIn};
pub use select::{BindSelect, Select, UnorderedSelect, ValuesBackedNode};
pub use sort::Sort;
pub use union::UnionNode;
pub use unique::Unique;

/// Cooperative cancellation flag shared between the caller and the plan
pub type CancelFlag = Arc<AtomicBool>;

/// Check the flag, surfacing cancellation as a dedicated error
pub fn check_cancelled(flag: &CancelFlag) -> Result<()> {
    if flag.load(Ordering::Relaxed) {
        Err(crate::error::ShaclError::Interrupted)
    } else {
        Ok(())
    }
}

/// One-shot cursor over validation tuples
pub trait TupleCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>>;
}

/// Boxed cursor
pub type TupleIter = Box<dyn TupleCursor>;

/// A node in a validation plan
pub trait PlanNode {
    /// Consume the node, producing its cursor. Single use by construction.
    fn iter(self: Box<Self>) -> Result<TupleIter>;

    /// Does the output come in active-target order?
    fn produces_sorted(&self) -> bool;

    /// Does this node require its input in active-target order?
    fn requires_sorted_input(&self) -> bool {
        false
    }

    /// Distance to the deepest source, for diagnostics
    fn depth(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Boxed plan node
pub type DynPlan = Box<dyn PlanNode>;

/// Insert a [`Sort`] in front of a consumer that requires sorted input
/// when the producer does not already sort
pub fn attach_sorted(node: DynPlan) -> DynPlan {
    if node.produces_sorted() {
        node
    } else {
        Sort::new(node)
    }
}

/// Collect every tuple a plan produces
pub fn drain(plan: DynPlan) -> Result<Vec<ValidationTuple>> {
    let mut cursor = plan.iter()?;
    let mut out = Vec::new();
    while let Some(tuple) = cursor.next()? {
        out.push(tuple);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Trivial nodes and cursors
// ---------------------------------------------------------------------------

/// A plan that produces nothing; the degenerate case of several builders
pub struct EmptyNode;

impl PlanNode for EmptyNode {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        Ok(Box::new(VecCursor::new(Vec::new())))
    }

    fn produces_sorted(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "Empty"
    }
}

/// Cursor over a materialized vector
pub struct VecCursor {
    items: std::vec::IntoIter<ValidationTuple>,
}

impl VecCursor {
    pub fn new(items: Vec<ValidationTuple>) -> Self {
        VecCursor {
            items: items.into_iter(),
        }
    }
}

impl TupleCursor for VecCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        Ok(self.items.next())
    }
}

/// Wrap a node so every produced tuple is reported to the trace sink
pub struct TraceNode {
    parent: DynPlan,
    sink: SharedTrace,
}

impl TraceNode {
    /// Wraps only when the sink is live, otherwise returns the node as-is
    pub fn wrap(parent: DynPlan, sink: &SharedTrace) -> DynPlan {
        if sink.enabled() {
            Box::new(TraceNode {
                parent,
                sink: Rc::clone(sink),
            })
        } else {
            parent
        }
    }
}

impl PlanNode for TraceNode {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let name = self.parent.name();
        let depth = self.parent.depth();
        let sink = self.sink;
        let inner = self.parent.iter()?;
        Ok(Box::new(TraceCursor {
            inner,
            sink,
            name,
            depth,
        }))
    }

    fn produces_sorted(&self) -> bool {
        self.parent.produces_sorted()
    }

    fn requires_sorted_input(&self) -> bool {
        self.parent.requires_sorted_input()
    }

    fn depth(&self) -> usize {
        self.parent.depth()
    }

    fn name(&self) -> &'static str {
        "Trace"
    }
}

struct TraceCursor {
    inner: TupleIter,
    sink: SharedTrace,
    name: &'static str,
    depth: usize,
}

impl TupleCursor for TraceCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        let next = self.inner.next()?;
        if let Some(tuple) = &next {
            self.sink.tuple(self.name, self.depth, tuple);
        }
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Shared push driver for multi-output nodes
// ---------------------------------------------------------------------------

/// One evaluation step of a multi-output node: push zero or more tuples
/// into sibling queues, return false once the underlying input is drained
pub(crate) trait PushStep {
    fn advance(&mut self, out: &mut dyn FnMut(usize, ValidationTuple)) -> Result<bool>;
}

/// Shared state between sibling [`PushView`]s
pub(crate) struct SplitCore {
    queues: Vec<VecDeque<ValidationTuple>>,
    buffered: Vec<bool>,
    exhausted: bool,
    step: Box<dyn PushStep>,
}

impl SplitCore {
    pub(crate) fn new(step: Box<dyn PushStep>, buffered: Vec<bool>) -> Rc<RefCell<SplitCore>> {
        let queues = buffered.iter().map(|_| VecDeque::new()).collect();
        Rc::new(RefCell::new(SplitCore {
            queues,
            buffered,
            exhausted: false,
            step,
        }))
    }

    /// Drive the step until the given output has a tuple or input runs out
    fn fill(&mut self, output: usize) -> Result<Option<ValidationTuple>> {
        loop {
            if let Some(tuple) = self.queues[output].pop_front() {
                return Ok(Some(tuple));
            }
            if self.exhausted {
                return Ok(None);
            }
            let SplitCore {
                queues,
                buffered,
                step,
                ..
            } = self;
            let mut sink = |idx: usize, tuple: ValidationTuple| {
                debug_assert!(
                    buffered[idx] || queues[idx].is_empty(),
                    "unbuffered sibling received a second tuple before being read"
                );
                queues[idx].push_back(tuple);
            };
            if !step.advance(&mut sink)? {
                self.exhausted = true;
            }
        }
    }
}

/// One output of a multi-output node, usable as an ordinary plan node
pub struct PushView {
    core: Rc<RefCell<SplitCore>>,
    output: usize,
    sorted: bool,
    depth: usize,
    name: &'static str,
}

impl PushView {
    pub(crate) fn new(
        core: &Rc<RefCell<SplitCore>>,
        output: usize,
        sorted: bool,
        depth: usize,
        name: &'static str,
    ) -> DynPlan {
        Box::new(PushView {
            core: Rc::clone(core),
            output,
            sorted,
            depth,
            name,
        })
    }
}

impl PlanNode for PushView {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        Ok(Box::new(PushCursor {
            core: self.core,
            output: self.output,
        }))
    }

    fn produces_sorted(&self) -> bool {
        self.sorted
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

struct PushCursor {
    core: Rc<RefCell<SplitCore>>,
    output: usize,
}

impl TupleCursor for PushCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        self.core.borrow_mut().fill(self.output)
    }
}
