//! Per-tuple value filters with true/false branch outputs
//!
//! Every filter applies a stateless predicate over a tuple's bound value
//! (falling back to the active target when no value is bound) and routes
//! the tuple to the matching branch. Predicates that cannot decide — an
//! incomparable datatype, a non-literal where a literal is needed — fail
//! closed: the tuple goes to the false branch, never into an error.

use crate::connections::ConnectionHandle;
use crate::error::{Result, ShaclError};
use crate::plan::{DynPlan, PushStep, PushView, SplitCore, TupleIter};
use crate::shape::NodeKind;
use crate::tuple::ValidationTuple;
use regex::Regex;
use shacl_model::{
    language_range_matches, valid_lexical, value_compare, Iri, Literal, Term, TriplePattern,
};
use std::cmp::Ordering;
use std::collections::HashSet;

/// A stateless per-tuple predicate
pub trait TupleFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool;

    fn name(&self) -> &'static str;
}

/// The element a filter inspects: the bound value when present, else the
/// active target
fn subject_of(tuple: &ValidationTuple) -> &Term {
    tuple.value().unwrap_or_else(|| tuple.active_target())
}

const TRUE_OUT: usize = 0;
const FALSE_OUT: usize = 1;

/// Both branches of a split filter
pub struct FilterOutputs {
    pub true_branch: DynPlan,
    pub false_branch: DynPlan,
}

/// Wraps a [`TupleFilter`] as plan nodes
pub struct FilterNode;

impl FilterNode {
    /// Only the tuples satisfying the filter
    pub fn keep(parent: DynPlan, filter: impl TupleFilter + 'static) -> DynPlan {
        FilterNode::build(parent, filter, true, false)
            .true_branch
            .unwrap_or_else(|| Box::new(crate::plan::EmptyNode))
    }

    /// Only the tuples failing the filter
    pub fn reject(parent: DynPlan, filter: impl TupleFilter + 'static) -> DynPlan {
        FilterNode::build(parent, filter, false, true)
            .false_branch
            .unwrap_or_else(|| Box::new(crate::plan::EmptyNode))
    }

    /// Both branches, sharing one pass over the parent
    pub fn split(parent: DynPlan, filter: impl TupleFilter + 'static) -> FilterOutputs {
        let outputs = FilterNode::build(parent, filter, true, true);
        FilterOutputs {
            true_branch: outputs
                .true_branch
                .unwrap_or_else(|| Box::new(crate::plan::EmptyNode)),
            false_branch: outputs
                .false_branch
                .unwrap_or_else(|| Box::new(crate::plan::EmptyNode)),
        }
    }

    fn build(
        parent: DynPlan,
        filter: impl TupleFilter + 'static,
        want_true: bool,
        want_false: bool,
    ) -> BuiltOutputs {
        let sorted = parent.produces_sorted();
        let depth = parent.depth() + 1;
        let name = filter.name();
        let step = Box::new(FilterStep {
            parent: Some(parent),
            cursor: None,
            filter: Box::new(filter),
            want_true,
            want_false,
        });
        let core = SplitCore::new(step, vec![true, true]);
        BuiltOutputs {
            true_branch: want_true.then(|| PushView::new(&core, TRUE_OUT, sorted, depth, name)),
            false_branch: want_false.then(|| PushView::new(&core, FALSE_OUT, sorted, depth, name)),
        }
    }
}

struct BuiltOutputs {
    true_branch: Option<DynPlan>,
    false_branch: Option<DynPlan>,
}

struct FilterStep {
    parent: Option<DynPlan>,
    cursor: Option<TupleIter>,
    filter: Box<dyn TupleFilter>,
    want_true: bool,
    want_false: bool,
}

impl PushStep for FilterStep {
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
        if self.filter.test(&tuple) {
            if self.want_true {
                out(TRUE_OUT, tuple);
            }
        } else if self.want_false {
            out(FALSE_OUT, tuple);
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Concrete filters
// ---------------------------------------------------------------------------

/// Literal with the expected datatype and a lexical form valid for it
pub struct DatatypeFilter {
    datatype: Iri,
}

impl DatatypeFilter {
    pub fn new(datatype: Iri) -> Self {
        DatatypeFilter { datatype }
    }
}

impl TupleFilter for DatatypeFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        match subject_of(tuple) {
            Term::Literal(lit) => {
                lit.datatype() == &self.datatype
                    && valid_lexical(self.datatype.as_str(), lit.lexical())
            }
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "DatatypeFilter"
    }
}

/// String length bounds over the value's string form; blank nodes have no
/// string form and always fail
pub struct LengthFilter {
    min: Option<usize>,
    max: Option<usize>,
}

impl LengthFilter {
    pub fn min(min: usize) -> Self {
        LengthFilter {
            min: Some(min),
            max: None,
        }
    }

    pub fn max(max: usize) -> Self {
        LengthFilter {
            min: None,
            max: Some(max),
        }
    }
}

fn string_form(term: &Term) -> Option<&str> {
    match term {
        Term::Iri(iri) => Some(iri.as_str()),
        Term::Literal(lit) => Some(lit.lexical()),
        Term::BlankNode(_) => None,
    }
}

impl TupleFilter for LengthFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        let Some(s) = string_form(subject_of(tuple)) else {
            return false;
        };
        let len = s.chars().count();
        self.min.map_or(true, |min| len >= min) && self.max.map_or(true, |max| len <= max)
    }

    fn name(&self) -> &'static str {
        "LengthFilter"
    }
}

/// Regex match over the value's string form, compiled once at build time
pub struct PatternFilter {
    regex: Regex,
}

impl PatternFilter {
    /// `flags` uses SHACL's flag letters: `i` case-insensitive, `s`
    /// dot-matches-newline, `m` multi-line, `x` ignore-whitespace, `q`
    /// literal (the pattern is escaped and the other letters are moot)
    pub fn new(pattern: &str, flags: Option<&str>) -> Result<Self> {
        let flags = flags.unwrap_or("");
        let source = if flags.contains('q') {
            regex::escape(pattern)
        } else {
            let mut inline = String::new();
            for f in ['i', 's', 'm', 'x'] {
                if flags.contains(f) {
                    inline.push(f);
                }
            }
            if inline.is_empty() {
                pattern.to_string()
            } else {
                format!("(?{inline}){pattern}")
            }
        };
        let regex = Regex::new(&source).map_err(|e| ShaclError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(PatternFilter { regex })
    }
}

impl TupleFilter for PatternFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        match string_form(subject_of(tuple)) {
            Some(s) => self.regex.is_match(s),
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "PatternFilter"
    }
}

/// Which side of the bound a [`RangeFilter`] accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    MinInclusive,
    MinExclusive,
    MaxInclusive,
    MaxExclusive,
}

/// Typed comparison against a fixed bound; incomparable values fail closed
pub struct RangeFilter {
    bound: Literal,
    kind: RangeBound,
}

impl RangeFilter {
    pub fn new(bound: Literal, kind: RangeBound) -> Self {
        RangeFilter { bound, kind }
    }
}

impl TupleFilter for RangeFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        let Term::Literal(value) = subject_of(tuple) else {
            return false;
        };
        // None means the operands do not share a comparable value space;
        // an incomparable value can never positively satisfy the bound.
        match (value_compare(value, &self.bound), self.kind) {
            (Some(Ordering::Greater), RangeBound::MinInclusive | RangeBound::MinExclusive) => true,
            (Some(Ordering::Equal), RangeBound::MinInclusive | RangeBound::MaxInclusive) => true,
            (Some(Ordering::Less), RangeBound::MaxInclusive | RangeBound::MaxExclusive) => true,
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "RangeFilter"
    }
}

/// Language-tagged literal whose tag matches one of the given ranges
pub struct LanguageInFilter {
    ranges: Vec<String>,
}

impl LanguageInFilter {
    pub fn new(ranges: Vec<String>) -> Self {
        LanguageInFilter { ranges }
    }
}

impl TupleFilter for LanguageInFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        let Term::Literal(lit) = subject_of(tuple) else {
            return false;
        };
        let Some(tag) = lit.language() else {
            return false;
        };
        self.ranges
            .iter()
            .any(|range| range.eq_ignore_ascii_case(tag) || language_range_matches(range, tag))
    }

    fn name(&self) -> &'static str {
        "LanguageInFilter"
    }
}

/// Node classification: IRI / blank node / literal and their unions
pub struct NodeKindFilter {
    kind: NodeKind,
}

impl NodeKindFilter {
    pub fn new(kind: NodeKind) -> Self {
        NodeKindFilter { kind }
    }
}

impl TupleFilter for NodeKindFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        self.kind.matches(subject_of(tuple))
    }

    fn name(&self) -> &'static str {
        "NodeKindFilter"
    }
}

/// Membership in a fixed value set
pub struct ValueInFilter {
    values: HashSet<Term>,
}

impl ValueInFilter {
    pub fn new(values: impl IntoIterator<Item = Term>) -> Self {
        ValueInFilter {
            values: values.into_iter().collect(),
        }
    }
}

impl TupleFilter for ValueInFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        self.values.contains(subject_of(tuple))
    }

    fn name(&self) -> &'static str {
        "ValueInFilter"
    }
}

/// Storage-backed membership test: does the value appear as the subject of
/// the given predicate with one of the given objects?
///
/// The class-constraint filter is the main user: predicate `rdf:type`,
/// objects the allowed classes. One lookup per tuple per object, so the
/// object list is expected to be small.
pub struct ExternalPredicateObjectFilter {
    conn: ConnectionHandle,
    predicate: Iri,
    objects: Vec<Term>,
}

impl ExternalPredicateObjectFilter {
    pub fn new(conn: ConnectionHandle, predicate: Iri, objects: Vec<Term>) -> Self {
        ExternalPredicateObjectFilter {
            conn,
            predicate,
            objects,
        }
    }
}

impl TupleFilter for ExternalPredicateObjectFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        let subject = subject_of(tuple);
        if subject.is_literal() {
            return false;
        }
        self.objects.iter().any(|object| {
            let pattern = TriplePattern::any()
                .with_subject(subject.clone())
                .with_predicate(self.predicate.clone())
                .with_object(object.clone());
            self.conn.contains(&pattern)
        })
    }

    fn name(&self) -> &'static str {
        "ExternalPredicateObjectFilter"
    }
}

/// Does the (active-target, path, value) triple exist in the filter's view?
///
/// Used against a transaction's removed overlay to drop rows whose backing
/// triple was retracted.
pub struct TripleExistsFilter {
    conn: ConnectionHandle,
    predicate: Iri,
}

impl TripleExistsFilter {
    pub fn new(conn: ConnectionHandle, predicate: Iri) -> Self {
        TripleExistsFilter { conn, predicate }
    }
}

impl TupleFilter for TripleExistsFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        let Some(value) = tuple.value() else {
            return false;
        };
        let pattern = TriplePattern::any()
            .with_subject(tuple.active_target().clone())
            .with_predicate(self.predicate.clone())
            .with_object(value.clone());
        self.conn.contains(&pattern)
    }

    fn name(&self) -> &'static str {
        "TripleExistsFilter"
    }
}
