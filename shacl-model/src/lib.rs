//! RDF data model for the SHACL validation engine
//!
//! This crate provides the term and triple types the plan engine operates
//! on, together with the two comparison regimes the engine needs:
//!
//! - a deterministic **total order** over terms (`term_cmp`, also exposed as
//!   `Ord` on [`Term`]) that every sorted plan node and merge join depends on;
//! - a partial **value-space comparison** (`value_compare`) used by range
//!   constraints, which refuses to compare incomparable operands instead of
//!   guessing.
//!
//! Vocabulary constants for XSD, RDF and SHACL live in [`vocab`].

pub mod datatype;
pub mod lang;
pub mod order;
pub mod term;
pub mod triple;
pub mod vocab;

pub use datatype::{valid_lexical, value_compare};
pub use lang::language_range_matches;
pub use order::term_cmp;
pub use term::{BNode, Iri, Literal, Term};
pub use triple::{ContextMatch, Triple, TriplePattern};
