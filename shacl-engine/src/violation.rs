//! Violation records attached to tuples
//!
//! A record is constructed once and never mutated; tuples accumulate
//! records as plan nodes mark them invalid, and compression merges the
//! records of collapsed tuples without dropping any.

use crate::shape::{ConstraintKind, Severity};
use shacl_model::{Iri, Term};

/// One constraint violation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViolationRecord {
    /// The node under validation
    pub focus: Term,
    /// The offending value, when the constraint applies to a path value
    pub value: Option<Term>,
    /// Property path from focus to value, when the shape has one
    pub path: Option<Iri>,
    /// Identifier of the shape whose constraint fired
    pub shape: Term,
    pub constraint: ConstraintKind,
    pub severity: Severity,
    pub message: Option<String>,
    /// Graph contexts the contributing triples came from
    pub contexts: Vec<Iri>,
}
