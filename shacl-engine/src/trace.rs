//! Execution trace sink
//!
//! Tracing is an injected capability, not global state: plan construction
//! threads a shared sink through every node it builds, and the default
//! no-op sink keeps the hot path free of overhead.

use crate::tuple::ValidationTuple;
use std::rc::Rc;

/// Receives every tuple a traced node produces
pub trait TraceSink {
    /// Called once per tuple leaving the named node
    fn tuple(&self, node: &'static str, depth: usize, tuple: &ValidationTuple);

    /// Whether tracing is live; nodes skip the wrapper entirely when not
    fn enabled(&self) -> bool {
        true
    }
}

/// The default sink: does nothing
#[derive(Debug, Default)]
pub struct NoopTrace;

impl TraceSink for NoopTrace {
    fn tuple(&self, _node: &'static str, _depth: usize, _tuple: &ValidationTuple) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// A sink that records everything, for tests and debugging
#[derive(Debug, Default)]
pub struct RecordingTrace {
    events: std::cell::RefCell<Vec<(&'static str, ValidationTuple)>>,
}

impl RecordingTrace {
    pub fn new() -> Self {
        RecordingTrace::default()
    }

    pub fn events(&self) -> Vec<(&'static str, ValidationTuple)> {
        self.events.borrow().clone()
    }
}

impl TraceSink for RecordingTrace {
    fn tuple(&self, node: &'static str, _depth: usize, tuple: &ValidationTuple) {
        self.events.borrow_mut().push((node, tuple.clone()));
    }
}

/// Shared handle to a sink
pub type SharedTrace = Rc<dyn TraceSink>;

/// A fresh no-op handle
pub fn noop() -> SharedTrace {
    Rc::new(NoopTrace)
}
