//! Driving compiled plans to exhaustion
//!
//! The validator compiles one plan per shape and pulls each to the end,
//! collecting every violation record the tuples carry. Per-shape plans are
//! independent; a storage error in any one of them terminates the run with
//! that error, while cancellation surfaces as its own error kind.

use crate::compile::{compile_shape, CompileContext, ValidationMode};
use crate::error::Result;
use crate::plan::{check_cancelled, CancelFlag};
use crate::shape::Shape;
use crate::trace::SharedTrace;
use crate::tuple::ValidationTuple;
use crate::violation::ViolationRecord;
use shacl_store::ConnectionsGroup;
use std::rc::Rc;
use tracing::{debug, info};

/// How often the drive loop checks the cancel flag
const CANCEL_CHECK_INTERVAL: usize = 256;

/// The outcome of one validation pass
#[derive(Debug, Default)]
pub struct ValidationReport {
    results: Vec<ViolationRecord>,
}

impl ValidationReport {
    pub fn conforms(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[ViolationRecord] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ViolationRecord> {
        self.results
    }
}

/// Validates a set of shapes against a connection group
pub struct Validator {
    shapes: Vec<Shape>,
    trace: SharedTrace,
    force_fallback: bool,
}

impl Validator {
    pub fn new(shapes: Vec<Shape>) -> Validator {
        Validator {
            shapes,
            trace: crate::trace::noop(),
            force_fallback: false,
        }
    }

    pub fn with_trace(mut self, trace: SharedTrace) -> Validator {
        self.trace = trace;
        self
    }

    /// Disable the empty-base fast path; used to cross-check plan shapes
    pub fn with_force_fallback(mut self, force_fallback: bool) -> Validator {
        self.force_fallback = force_fallback;
        self
    }

    /// Validate, picking the mode from the transaction shape: deltas
    /// present means incremental, otherwise a full pass
    pub fn validate(&self, group: Rc<ConnectionsGroup>) -> Result<ValidationReport> {
        let stats = group.stats();
        let mode = if stats.has_added() || stats.has_removed() {
            ValidationMode::Incremental
        } else {
            ValidationMode::Full
        };
        self.validate_with_mode(group, mode, None)
    }

    pub fn validate_with_mode(
        &self,
        group: Rc<ConnectionsGroup>,
        mode: ValidationMode,
        cancel: Option<CancelFlag>,
    ) -> Result<ValidationReport> {
        let ctx = CompileContext::new(group, mode)
            .with_trace(Rc::clone(&self.trace))
            .with_force_fallback(self.force_fallback);
        let mut report = ValidationReport::default();
        for shape in &self.shapes {
            if let Some(flag) = &cancel {
                check_cancelled(flag)?;
            }
            let Some(plan) = compile_shape(&ctx, shape)? else {
                continue;
            };
            debug!(shape = %shape.id, ?mode, "driving validation plan");
            let mut cursor = plan.iter()?;
            let mut pulled = 0usize;
            while let Some(tuple) = cursor.next()? {
                collect_records(&tuple, &mut report.results);
                pulled += 1;
                if pulled % CANCEL_CHECK_INTERVAL == 0 {
                    if let Some(flag) = &cancel {
                        check_cancelled(flag)?;
                    }
                }
            }
        }
        info!(
            violations = report.results.len(),
            conforms = report.conforms(),
            "validation pass finished"
        );
        Ok(report)
    }
}

fn collect_records(tuple: &ValidationTuple, out: &mut Vec<ViolationRecord>) {
    for record in tuple.violations() {
        if !out.contains(record) {
            out.push(record.clone());
        }
    }
    for compressed in tuple.compressed() {
        collect_records(compressed, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{ConstraintComponent, TargetSelect};
    use shacl_model::vocab::rdf;
    use shacl_model::{Iri, Term, Triple};
    use shacl_store::MemorySail;

    fn iri(s: &str) -> Term {
        Term::iri(format!("http://ex/{s}"))
    }

    fn type_triple(s: &str, class: &str) -> Triple {
        Triple::new(iri(s), Iri::new(rdf::TYPE), iri(class))
    }

    fn knows(s: &str, o: &str) -> Triple {
        Triple::new(iri(s), Iri::new("http://ex/knows"), iri(o))
    }

    fn min_knows_shape() -> Shape {
        Shape::property(iri("shape"), Iri::new("http://ex/knows"))
            .with_target(TargetSelect::Class(iri("Person")))
            .with_constraint(ConstraintComponent::MinCount(1))
    }

    #[test]
    fn full_pass_reports_and_then_conforms_incrementally() {
        let validator = Validator::new(vec![min_knows_shape()]);

        let group = Rc::new(ConnectionsGroup::without_transaction(
            MemorySail::from_triples(vec![type_triple("alice", "Person")]),
        ));
        let report = validator.validate(group).unwrap();
        assert!(!report.conforms());
        assert_eq!(report.results()[0].focus, iri("alice"));

        // The fix arrives as a transaction delta.
        let group = Rc::new(ConnectionsGroup::new(
            MemorySail::from_triples(vec![type_triple("alice", "Person")]),
            MemorySail::from_triples(vec![knows("alice", "bob")]),
            MemorySail::new(),
        ));
        let report = validator.validate(group).unwrap();
        assert!(report.conforms());
    }

    #[test]
    fn cancellation_stops_the_run() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let flag = Arc::new(AtomicBool::new(true));
        flag.store(true, Ordering::Relaxed);
        let validator = Validator::new(vec![min_knows_shape()]);
        let group = Rc::new(ConnectionsGroup::without_transaction(
            MemorySail::from_triples(vec![type_triple("alice", "Person")]),
        ));
        let err = validator
            .validate_with_mode(group, ValidationMode::Full, Some(flag))
            .unwrap_err();
        assert!(matches!(err, crate::error::ShaclError::Interrupted));
    }
}
