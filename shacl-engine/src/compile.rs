//! Shape-to-plan compilation
//!
//! Each constraint kind has a builder that composes source, filter, join
//! and aggregation nodes into a plan whose output is exactly the set of
//! violating (target[, value]) tuples. Plans are one-shot, so builders are
//! pure: the same shape can be compiled any number of times against the
//! same context.
//!
//! Two modes: full revalidation scans every target from the current state;
//! incremental mode sources candidates from the transaction's deltas and
//! re-checks them against the current state, with a fast path for the
//! empty-base-store case.

use crate::connections::{ConnectionHandle, View};
use crate::error::{Result, ShaclError};
use crate::plan::{
    DatatypeFilter, DynPlan, EmptyNode, EqualsJoinValue, ExternalPredicateObjectFilter,
    FilterNode, GroupByCount, GroupByFilter, InnerJoin, LanguageInFilter, LengthFilter,
    NodeKindFilter, PairwiseCheck, PairwiseOp, PatternFilter, PlanNode, RangeBound, RangeFilter,
    TraceNode, TripleExistsFilter, TupleCursor, TupleIter, UnionNode, Unique, ValueInFilter,
};
use crate::plan::bulk::{BulkedExternalInnerJoin, BulkedExternalLeftOuterJoin};
use crate::shape::{ConstraintComponent, ConstraintKind, Shape};
use crate::targets::{delta_target_plan, target_plan, TargetMembershipFilter};
use crate::trace::SharedTrace;
use crate::tuple::{Scope, ValidationTuple};
use crate::violation::ViolationRecord;
use shacl_store::{ConnectionsGroup, RevalidationStats, BINDING_INJECTION_MARKER};
use shacl_model::{Iri, Literal};
use std::rc::Rc;
use tracing::{debug, warn};

/// How target candidates are sourced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every target from a full scan of the current state
    Full,
    /// Candidates from the transaction deltas only
    Incremental,
}

/// Everything a builder needs to assemble plans
pub struct CompileContext {
    conn: ConnectionHandle,
    mode: ValidationMode,
    trace: SharedTrace,
    /// Disables the empty-base fast path, forcing the general plan shape
    force_fallback: bool,
}

impl CompileContext {
    pub fn new(group: Rc<ConnectionsGroup>, mode: ValidationMode) -> CompileContext {
        CompileContext {
            conn: ConnectionHandle::new(group, View::Current),
            mode,
            trace: crate::trace::noop(),
            force_fallback: false,
        }
    }

    pub fn with_trace(mut self, trace: SharedTrace) -> CompileContext {
        self.trace = trace;
        self
    }

    pub fn with_force_fallback(mut self, force_fallback: bool) -> CompileContext {
        self.force_fallback = force_fallback;
        self
    }

    fn stats(&self) -> &RevalidationStats {
        self.conn.group().stats()
    }

    fn incremental(&self) -> bool {
        self.mode == ValidationMode::Incremental
    }
}

/// How a plan's rows are shaped, which drives OR-composition strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanData {
    /// One row per (target, value) pair
    TripleBased,
    /// One row per target
    Aggregated,
}

struct ViolationPlan {
    plan: DynPlan,
    data: PlanData,
}

/// Compile a shape into one plan producing its violation tuples, with
/// violation records attached
///
/// Returns `None` for deactivated shapes, shapes without constraints, and
/// shapes the engine cannot support; the latter two log a warning rather
/// than failing the run.
pub fn compile_shape(ctx: &CompileContext, shape: &Shape) -> Result<Option<DynPlan>> {
    if shape.deactivated {
        warn!(shape = %shape.id, "skipping deactivated shape");
        return Ok(None);
    }
    let mut plans: Vec<DynPlan> = Vec::new();
    for constraint in &shape.constraints {
        match build_constraint(ctx, shape, constraint) {
            Ok(Some(vp)) => {
                let attached = AttachViolation::new(vp.plan, shape, constraint.kind());
                plans.push(TraceNode::wrap(attached, &ctx.trace));
            }
            Ok(None) => {}
            Err(ShaclError::UnsupportedShape { shape, message }) => {
                warn!(%shape, %message, "deactivating unsupported shape");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
    }
    if plans.is_empty() {
        debug!(shape = %shape.id, "shape compiled to no plan");
        return Ok(None);
    }
    Ok(Some(Unique::new(UnionNode::new(plans), false)))
}

fn unsupported(shape: &Shape, message: &str) -> ShaclError {
    ShaclError::UnsupportedShape {
        shape: shape.id.to_string(),
        message: message.to_string(),
    }
}

fn scope_of(shape: &Shape) -> Scope {
    if shape.is_property_shape() {
        Scope::PropertyShape
    } else {
        Scope::NodeShape
    }
}

/// The shape's target set under the active mode
fn targets_for(ctx: &CompileContext, shape: &Shape) -> DynPlan {
    let scope = scope_of(shape);
    if shape.targets.is_empty() {
        return Box::new(EmptyNode);
    }
    match ctx.mode {
        ValidationMode::Full => target_plan(&ctx.conn, &shape.targets, scope),
        ValidationMode::Incremental => {
            // Only hand the path to the candidate enumerator when the
            // transaction actually touched it.
            let path = shape
                .path
                .as_ref()
                .filter(|p| ctx.stats().predicate_touched(p));
            let candidates = delta_target_plan(&ctx.conn, &shape.targets, path, scope);
            let membership =
                TargetMembershipFilter::new(ctx.conn.clone(), shape.targets.clone());
            FilterNode::keep(candidates, membership)
        }
    }
}

fn value_query(path: &Iri) -> String {
    format!(
        "SELECT ?a ?c WHERE {{ {BINDING_INJECTION_MARKER} ?a <{}> ?c . }}",
        path.as_str()
    )
}

/// One (target, value) row per path value in the current state
fn current_values(ctx: &CompileContext, targets: DynPlan, path: &Iri) -> DynPlan {
    BulkedExternalInnerJoin::new(
        targets,
        ctx.conn.clone(),
        value_query(path),
        "a",
        "c",
        false,
    )
}

/// Rows counted for cardinality: the bare candidate targets (so empty
/// groups survive) unioned with their path values
fn counting_rows(ctx: &CompileContext, shape: &Shape, path: &Iri) -> DynPlan {
    let bare = targets_for(ctx, shape);
    if ctx.incremental() && ctx.stats().base_empty && !ctx.force_fallback {
        // Empty base: every path value the current state can hold came in
        // through this transaction's additions.
        let added = BulkedExternalInnerJoin::new(
            targets_for(ctx, shape),
            ctx.conn.reroot(View::Added),
            value_query(path),
            "a",
            "c",
            false,
        );
        return UnionNode::new(vec![bare, added]);
    }
    if ctx.incremental() {
        // General incremental form: values added by the transaction, plus
        // pre-transaction values that were not retracted. The previous-state
        // join skips targets the previous state never saw.
        let added = BulkedExternalInnerJoin::new(
            targets_for(ctx, shape),
            ctx.conn.reroot(View::Added),
            value_query(path),
            "a",
            "c",
            false,
        );
        let previous = BulkedExternalInnerJoin::new(
            targets_for(ctx, shape),
            ctx.conn.reroot(View::Previous),
            value_query(path),
            "a",
            "c",
            true,
        );
        let surviving = FilterNode::reject(
            previous,
            TripleExistsFilter::new(ctx.conn.reroot(View::Removed), path.clone()),
        );
        return Unique::new(UnionNode::new(vec![bare, added, surviving]), false);
    }
    let values = BulkedExternalLeftOuterJoin::new(
        bare,
        ctx.conn.clone(),
        value_query(path),
        "a",
        "c",
        false,
    );
    values
}

fn require_path<'s>(shape: &'s Shape, what: &str) -> Result<&'s Iri> {
    shape
        .path
        .as_ref()
        .ok_or_else(|| unsupported(shape, &format!("{what} requires a property path")))
}

/// The stream a value constraint filters: path values for property shapes,
/// the focus nodes themselves for node shapes
fn value_stream(ctx: &CompileContext, shape: &Shape) -> DynPlan {
    match &shape.path {
        Some(path) => current_values(ctx, targets_for(ctx, shape), path),
        None => targets_for(ctx, shape),
    }
}

fn build_constraint(
    ctx: &CompileContext,
    shape: &Shape,
    constraint: &ConstraintComponent,
) -> Result<Option<ViolationPlan>> {
    let plan = match constraint {
        ConstraintComponent::MinCount(n) => {
            let path = require_path(shape, "sh:minCount")?;
            let n = *n;
            ViolationPlan {
                plan: GroupByCount::new(
                    counting_rows(ctx, shape, path),
                    Box::new(move |count| count < n),
                ),
                data: PlanData::Aggregated,
            }
        }
        ConstraintComponent::MaxCount(n) => {
            let path = require_path(shape, "sh:maxCount")?;
            let n = *n;
            ViolationPlan {
                plan: GroupByCount::new(
                    counting_rows(ctx, shape, path),
                    Box::new(move |count| count > n),
                ),
                data: PlanData::Aggregated,
            }
        }
        ConstraintComponent::Datatype(datatype) => reject_filter(
            ctx,
            shape,
            DatatypeFilter::new(datatype.clone()),
        ),
        ConstraintComponent::Class(class) => reject_filter(
            ctx,
            shape,
            ExternalPredicateObjectFilter::new(
                ctx.conn.clone(),
                Iri::new(shacl_model::vocab::rdf::TYPE),
                vec![class.clone()],
            ),
        ),
        ConstraintComponent::NodeKind(kind) => {
            reject_filter(ctx, shape, NodeKindFilter::new(*kind))
        }
        ConstraintComponent::Pattern { pattern, flags } => reject_filter(
            ctx,
            shape,
            PatternFilter::new(pattern, flags.as_deref())?,
        ),
        ConstraintComponent::MinLength(n) => {
            reject_filter(ctx, shape, LengthFilter::min(*n))
        }
        ConstraintComponent::MaxLength(n) => {
            reject_filter(ctx, shape, LengthFilter::max(*n))
        }
        ConstraintComponent::MinInclusive(bound) => {
            reject_range(ctx, shape, bound, RangeBound::MinInclusive)
        }
        ConstraintComponent::MinExclusive(bound) => {
            reject_range(ctx, shape, bound, RangeBound::MinExclusive)
        }
        ConstraintComponent::MaxInclusive(bound) => {
            reject_range(ctx, shape, bound, RangeBound::MaxInclusive)
        }
        ConstraintComponent::MaxExclusive(bound) => {
            reject_range(ctx, shape, bound, RangeBound::MaxExclusive)
        }
        ConstraintComponent::In(values) => reject_filter(
            ctx,
            shape,
            ValueInFilter::new(values.iter().cloned()),
        ),
        ConstraintComponent::HasValue(value) => {
            let path = require_path(shape, "sh:hasValue")?;
            let value = value.clone();
            ViolationPlan {
                plan: GroupByFilter::new(
                    counting_rows(ctx, shape, path),
                    Box::new(move |group| !group.iter().any(|t| t.value() == Some(&value))),
                ),
                data: PlanData::Aggregated,
            }
        }
        ConstraintComponent::LanguageIn(ranges) => reject_filter(
            ctx,
            shape,
            LanguageInFilter::new(ranges.clone()),
        ),
        ConstraintComponent::UniqueLang => {
            let path = require_path(shape, "sh:uniqueLang")?;
            ViolationPlan {
                plan: GroupByFilter::new(
                    current_values(ctx, targets_for(ctx, shape), path),
                    Box::new(|group| has_duplicate_language(group)),
                ),
                data: PlanData::Aggregated,
            }
        }
        ConstraintComponent::Equals(predicate) => {
            pairwise(ctx, shape, predicate, PairwiseOp::Equals)?
        }
        ConstraintComponent::Disjoint(predicate) => {
            pairwise(ctx, shape, predicate, PairwiseOp::Disjoint)?
        }
        ConstraintComponent::LessThan(predicate) => {
            pairwise(ctx, shape, predicate, PairwiseOp::LessThan)?
        }
        ConstraintComponent::LessThanOrEquals(predicate) => {
            pairwise(ctx, shape, predicate, PairwiseOp::LessThanOrEquals)?
        }
        ConstraintComponent::And(children) => {
            return build_and(ctx, shape, children);
        }
        ConstraintComponent::Or(children) => {
            return build_or(ctx, shape, children);
        }
        ConstraintComponent::Not(child) => {
            return build_not(ctx, shape, child);
        }
    };
    Ok(Some(plan))
}

fn reject_filter(
    ctx: &CompileContext,
    shape: &Shape,
    filter: impl crate::plan::TupleFilter + 'static,
) -> ViolationPlan {
    ViolationPlan {
        plan: FilterNode::reject(value_stream(ctx, shape), filter),
        data: PlanData::TripleBased,
    }
}

fn reject_range(
    ctx: &CompileContext,
    shape: &Shape,
    bound: &Literal,
    kind: RangeBound,
) -> ViolationPlan {
    reject_filter(ctx, shape, RangeFilter::new(bound.clone(), kind))
}

fn has_duplicate_language(group: &[ValidationTuple]) -> bool {
    let mut seen: Vec<String> = Vec::new();
    for tuple in group {
        let Some(lit) = tuple.value().and_then(|v| v.as_literal()) else {
            continue;
        };
        let Some(tag) = lit.language() else {
            continue;
        };
        let tag = tag.to_ascii_lowercase();
        if seen.contains(&tag) {
            return true;
        }
        seen.push(tag);
    }
    false
}

fn pairwise(
    ctx: &CompileContext,
    shape: &Shape,
    predicate: &Iri,
    op: PairwiseOp,
) -> Result<ViolationPlan> {
    let path = require_path(shape, "pair constraints")?;
    let outputs = PairwiseCheck::new(
        targets_for(ctx, shape),
        ctx.conn.clone(),
        path.clone(),
        predicate.clone(),
        op,
    );
    let plan = match op {
        PairwiseOp::Equals => {
            UnionNode::new(vec![outputs.path_invalid, outputs.predicate_invalid])
        }
        _ => outputs.path_invalid,
    };
    Ok(ViolationPlan {
        plan,
        data: PlanData::TripleBased,
    })
}

/// A nested shape inherits the enclosing shape's targets and path where it
/// declares none of its own
fn inherit(parent: &Shape, child: &Shape) -> Shape {
    let mut child = child.clone();
    if child.targets.is_empty() {
        child.targets = parent.targets.clone();
    }
    if child.path.is_none() {
        child.path = parent.path.clone();
    }
    child
}

/// Raw violation plan for a whole nested shape: the union of its
/// constraints' plans, without violation records attached
fn child_violations(ctx: &CompileContext, shape: &Shape) -> Result<Option<ViolationPlan>> {
    if shape.deactivated {
        return Ok(None);
    }
    let mut plans: Vec<DynPlan> = Vec::new();
    let mut data = PlanData::TripleBased;
    for constraint in &shape.constraints {
        let Some(vp) = build_constraint(ctx, shape, constraint)? else {
            continue;
        };
        if vp.data == PlanData::Aggregated {
            data = PlanData::Aggregated;
        }
        plans.push(vp.plan);
    }
    if plans.is_empty() {
        return Ok(None);
    }
    Ok(Some(ViolationPlan {
        plan: Unique::new(UnionNode::new(plans), false),
        data,
    }))
}

/// Collapse a plan to one row per target
fn aggregate(plan: DynPlan) -> DynPlan {
    GroupByFilter::new(plan, Box::new(|_| true))
}

/// AND violates when any child violates
fn build_and(
    ctx: &CompileContext,
    parent: &Shape,
    children: &[Shape],
) -> Result<Option<ViolationPlan>> {
    let mut plans: Vec<DynPlan> = Vec::new();
    let mut live = 0usize;
    for child in children {
        let child = inherit(parent, child);
        if child.deactivated {
            continue;
        }
        live += 1;
        if let Some(vp) = child_violations(ctx, &child)? {
            plans.push(vp.plan);
        }
    }
    if live == 0 {
        warn!(shape = %parent.id, "every child of sh:and is deactivated");
        return Ok(None);
    }
    if plans.is_empty() {
        return Ok(None);
    }
    Ok(Some(ViolationPlan {
        plan: Unique::new(UnionNode::new(plans), true),
        data: PlanData::Aggregated,
    }))
}

/// OR violates only when every child violates the same target; the
/// combination strategy depends on the children's row shapes
fn build_or(
    ctx: &CompileContext,
    parent: &Shape,
    children: &[Shape],
) -> Result<Option<ViolationPlan>> {
    let mut plans: Vec<ViolationPlan> = Vec::new();
    let mut live = 0usize;
    for child in children {
        let child = inherit(parent, child);
        if child.deactivated {
            continue;
        }
        live += 1;
        match child_violations(ctx, &child)? {
            Some(vp) => plans.push(vp),
            // A child with no plan violates nothing, so the intersection
            // is empty.
            None => return Ok(None),
        }
    }
    if live == 0 {
        warn!(shape = %parent.id, "every child of sh:or is deactivated");
        return Ok(None);
    }
    let triple_based = plans.iter().all(|vp| vp.data == PlanData::TripleBased);
    let mut iter = plans.into_iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };
    if triple_based {
        // Row-for-row comparison over (target, value) pairs.
        let plan = iter.fold(first.plan, |acc, vp| EqualsJoinValue::new(acc, vp.plan));
        Ok(Some(ViolationPlan {
            plan,
            data: PlanData::TripleBased,
        }))
    } else {
        // Mixed row shapes: force every child down to unique targets and
        // intersect on the target sets.
        let plan = iter.fold(aggregate(first.plan), |acc, vp| {
            InnerJoin::new(acc, aggregate(vp.plan))
        });
        Ok(Some(ViolationPlan {
            plan,
            data: PlanData::Aggregated,
        }))
    }
}

/// NOT violates when the child holds; structured children are rewritten by
/// De Morgan before falling back to target-set subtraction
fn build_not(
    ctx: &CompileContext,
    parent: &Shape,
    child: &Shape,
) -> Result<Option<ViolationPlan>> {
    let child = inherit(parent, child);
    if child.deactivated {
        return Ok(None);
    }

    // De Morgan rewrite for purely logical children.
    if let [only] = child.constraints.as_slice() {
        match only {
            ConstraintComponent::And(grandchildren) => {
                let negated: Vec<Shape> = grandchildren
                    .iter()
                    .map(|g| negate_shape(&child, g))
                    .collect();
                return build_or(ctx, &child, &negated);
            }
            ConstraintComponent::Or(grandchildren) => {
                let negated: Vec<Shape> = grandchildren
                    .iter()
                    .map(|g| negate_shape(&child, g))
                    .collect();
                return build_and(ctx, &child, &negated);
            }
            _ => {}
        }
    }

    // General form: every checkable target minus the targets the child
    // already flags.
    let Some(vp) = child_violations(ctx, &child)? else {
        // Child flags nothing, so every target satisfies it.
        return Ok(Some(ViolationPlan {
            plan: targets_for(ctx, &child),
            data: PlanData::Aggregated,
        }));
    };
    let outputs = InnerJoin::with_discarded(
        targets_for(ctx, &child),
        aggregate(vp.plan),
        true,
        false,
    );
    drop(outputs.joined);
    let Some(satisfying) = outputs.discarded_left else {
        return Ok(None);
    };
    Ok(Some(ViolationPlan {
        plan: satisfying,
        data: PlanData::Aggregated,
    }))
}

/// Wrap a shape in a synthetic `sh:not`
fn negate_shape(parent: &Shape, inner: &Shape) -> Shape {
    let mut wrapper = Shape::node(parent.id.clone());
    wrapper.targets = parent.targets.clone();
    wrapper.path = parent.path.clone();
    wrapper.constraints = vec![ConstraintComponent::Not(Box::new(inner.clone()))];
    wrapper
}

// ---------------------------------------------------------------------------
// Violation attachment
// ---------------------------------------------------------------------------

/// Terminal node stamping a violation record onto every tuple
pub struct AttachViolation {
    parent: DynPlan,
    shape_id: shacl_model::Term,
    path: Option<Iri>,
    constraint: ConstraintKind,
    severity: crate::shape::Severity,
    message: Option<String>,
    depth: usize,
}

impl AttachViolation {
    pub fn new(parent: DynPlan, shape: &Shape, constraint: ConstraintKind) -> DynPlan {
        let depth = parent.depth() + 1;
        Box::new(AttachViolation {
            parent,
            shape_id: shape.id.clone(),
            path: shape.path.clone(),
            constraint,
            severity: shape.severity,
            message: shape.message.clone(),
            depth,
        })
    }
}

impl PlanNode for AttachViolation {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        Ok(Box::new(AttachCursor {
            parent: self.parent.iter()?,
            shape_id: self.shape_id,
            path: self.path,
            constraint: self.constraint,
            severity: self.severity,
            message: self.message,
        }))
    }

    fn produces_sorted(&self) -> bool {
        self.parent.produces_sorted()
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "AttachViolation"
    }
}

struct AttachCursor {
    parent: TupleIter,
    shape_id: shacl_model::Term,
    path: Option<Iri>,
    constraint: ConstraintKind,
    severity: crate::shape::Severity,
    message: Option<String>,
}

impl TupleCursor for AttachCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        let Some(tuple) = self.parent.next()? else {
            return Ok(None);
        };
        Ok(Some(tuple.add_violation(|t| ViolationRecord {
            focus: t.active_target().clone(),
            value: t.value().cloned(),
            path: self.path.clone(),
            shape: self.shape_id.clone(),
            constraint: self.constraint,
            severity: self.severity,
            message: self.message.clone(),
            contexts: t.contexts().to_vec(),
        })))
    }
}
