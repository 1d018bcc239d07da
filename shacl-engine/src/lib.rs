//! Incremental SHACL constraint validation as composable dataflow plans
//!
//! Shapes compile into graphs of lazily-pulled plan nodes over streams of
//! [`tuple::ValidationTuple`]s: source nodes read targets and path values
//! from storage, filters and merge joins narrow them down, and the tuples
//! a plan finally yields are exactly the constraint's violations. A
//! transaction's added/removed deltas let the compiler build narrow
//! incremental plans instead of rescanning the store.
//!
//! Entry point: [`validate::Validator`] over a
//! [`shacl_store::ConnectionsGroup`] and a list of [`shape::Shape`]s.

pub mod compile;
pub mod connections;
pub mod error;
pub mod plan;
pub mod shape;
pub mod targets;
pub mod trace;
pub mod tuple;
pub mod validate;
pub mod violation;

pub use compile::{compile_shape, CompileContext, ValidationMode};
pub use connections::{ConnectionHandle, View};
pub use error::{Result, ShaclError};
pub use shape::{ConstraintComponent, ConstraintKind, NodeKind, Severity, Shape, TargetSelect};
pub use trace::{NoopTrace, RecordingTrace, SharedTrace, TraceSink};
pub use tuple::{Scope, ValidationTuple};
pub use validate::{ValidationReport, Validator};
pub use violation::ViolationRecord;
