//! Connection handles held by plan nodes
//!
//! Plan nodes keep a cheap cloneable handle naming which view of the
//! connection group they read (current / previous / added / removed).
//! Handles are single-threaded, matching the non-reentrant connection
//! discipline of the storage layer.

use shacl_model::{Triple, TriplePattern};
use shacl_store::{ConnectionsGroup, Result as StoreResult, Row, SailReader};
use std::rc::Rc;

/// Which view of the connection group a node reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Dataset with the transaction applied
    Current,
    /// Pre-transaction state
    Previous,
    /// Transaction additions only
    Added,
    /// Transaction removals only
    Removed,
}

/// A cloneable handle onto one view of the connection group
#[derive(Clone)]
pub struct ConnectionHandle {
    group: Rc<ConnectionsGroup>,
    view: View,
}

impl ConnectionHandle {
    pub fn new(group: Rc<ConnectionsGroup>, view: View) -> Self {
        ConnectionHandle { group, view }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn group(&self) -> &Rc<ConnectionsGroup> {
        &self.group
    }

    /// Same group, different view
    pub fn reroot(&self, view: View) -> ConnectionHandle {
        ConnectionHandle {
            group: Rc::clone(&self.group),
            view,
        }
    }

    fn with_reader<R>(&self, f: impl FnOnce(&dyn SailReader) -> R) -> R {
        match self.view {
            View::Current => {
                let reader = self.group.current();
                f(&reader)
            }
            View::Previous => f(self.group.previous()),
            View::Added => f(self.group.added()),
            View::Removed => f(self.group.removed()),
        }
    }

    /// Materialized pattern scan
    pub fn triples(&self, pattern: &TriplePattern) -> Vec<Triple> {
        self.with_reader(|r| r.triples(pattern).collect())
    }

    pub fn contains(&self, pattern: &TriplePattern) -> bool {
        self.with_reader(|r| r.contains(pattern))
    }

    pub fn is_empty(&self) -> bool {
        self.with_reader(|r| r.is_empty())
    }

    /// Evaluate a declarative query against this view
    pub fn evaluate(&self, query: &str) -> StoreResult<Vec<Row>> {
        self.with_reader(|r| r.evaluate(query))
    }
}
