//! Storage surface for the SHACL validation engine
//!
//! The plan engine only ever touches storage through the narrow
//! [`SailReader`] trait: pattern-matched triple lookup, membership testing,
//! and evaluation of a declarative query string with a documented
//! bound-values injection point. Everything else about the underlying store
//! is out of scope.
//!
//! [`MemorySail`] is the executable reference implementation, and
//! [`ConnectionsGroup`] bundles the views a validation pass needs: the base
//! store, the transaction's added/removed overlays, the pre-transaction
//! state, and dataset statistics that drive plan strategy selection.

pub mod connection;
pub mod error;
pub mod memory;
pub mod query;
pub mod reader;

pub use connection::{ConnectionsGroup, OverlayReader, RevalidationStats};
pub use error::{Result, StoreError};
pub use memory::MemorySail;
pub use query::{inject_bindings, term_to_query_text, BINDING_INJECTION_MARKER};
pub use reader::{Row, SailReader};
