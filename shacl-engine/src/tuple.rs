//! Validation tuples: the rows flowing through every plan node
//!
//! A tuple is an immutable chain of terms describing a path from a target
//! node to an optional trailing value, plus scope metadata, accumulated
//! violation records, and — after a compressing dedup — the set of source
//! tuples it stands for. Every transformation returns a new tuple.

use crate::violation::ViolationRecord;
use shacl_model::{term_cmp, Iri, Term};
use std::cmp::Ordering;
use std::sync::Arc;

/// Whether the tuple's trailing chain element is the target itself or a
/// value reached from the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    None,
    NodeShape,
    PropertyShape,
}

/// An immutable validation tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidationTuple {
    chain: Arc<[Term]>,
    scope: Scope,
    /// For property-shape scope: has a value been bound at the chain tail?
    property_shape_scope_with_value: bool,
    violations: Vec<ViolationRecord>,
    /// Tuples collapsed into this one by a compressing dedup, kept so all
    /// violation provenance survives. Sorted by [`full_order`].
    compressed: Vec<ValidationTuple>,
    contexts: Vec<Iri>,
}

/// Deterministic order over tuples used to normalize `compressed` sets:
/// chain elements in term order, then chain length, then scope, then the
/// has-value flag.
pub fn full_order(a: &ValidationTuple, b: &ValidationTuple) -> Ordering {
    for (x, y) in a.chain.iter().zip(b.chain.iter()) {
        let ord = term_cmp(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.chain
        .len()
        .cmp(&b.chain.len())
        .then_with(|| scope_rank(a.scope).cmp(&scope_rank(b.scope)))
        .then_with(|| {
            a.property_shape_scope_with_value
                .cmp(&b.property_shape_scope_with_value)
        })
}

fn scope_rank(scope: Scope) -> u8 {
    match scope {
        Scope::None => 0,
        Scope::NodeShape => 1,
        Scope::PropertyShape => 2,
    }
}

impl ValidationTuple {
    /// A single-element tuple
    pub fn new(target: Term, scope: Scope, has_value: bool) -> Self {
        ValidationTuple {
            chain: Arc::from(vec![target]),
            scope,
            property_shape_scope_with_value: has_value,
            violations: Vec::new(),
            compressed: Vec::new(),
            contexts: Vec::new(),
        }
    }

    /// A (target, value) pair tuple
    pub fn pair(target: Term, value: Term, scope: Scope, has_value: bool) -> Self {
        ValidationTuple {
            chain: Arc::from(vec![target, value]),
            scope,
            property_shape_scope_with_value: has_value,
            violations: Vec::new(),
            compressed: Vec::new(),
            contexts: Vec::new(),
        }
    }

    /// A tuple over an arbitrary chain; the chain must be non-empty
    pub fn from_chain(chain: Vec<Term>, scope: Scope, has_value: bool) -> Self {
        assert!(!chain.is_empty(), "tuple chain must not be empty");
        ValidationTuple {
            chain: Arc::from(chain),
            scope,
            property_shape_scope_with_value: has_value,
            violations: Vec::new(),
            compressed: Vec::new(),
            contexts: Vec::new(),
        }
    }

    pub fn with_contexts(mut self, contexts: Vec<Iri>) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn contexts(&self) -> &[Iri] {
        &self.contexts
    }

    pub fn chain(&self) -> &[Term] {
        &self.chain
    }

    /// True when the chain tail is a bound value
    pub fn has_value(&self) -> bool {
        self.property_shape_scope_with_value || self.scope == Scope::NodeShape
    }

    /// The bound value, when there is one
    pub fn value(&self) -> Option<&Term> {
        if self.has_value() {
            self.chain.last()
        } else {
            None
        }
    }

    /// The node under validation: the element just before an optional
    /// trailing value
    pub fn active_target(&self) -> &Term {
        if !self.property_shape_scope_with_value || self.scope != Scope::PropertyShape {
            return &self.chain[self.chain.len() - 1];
        }
        debug_assert!(self.chain.len() >= 2);
        &self.chain[self.chain.len() - 2]
    }

    pub fn same_target_as(&self, other: &ValidationTuple) -> bool {
        self.active_target() == other.active_target()
    }

    pub fn compare_active_target(&self, other: &ValidationTuple) -> Ordering {
        term_cmp(self.active_target(), other.active_target())
    }

    /// Compare bound values; an absent value sorts first
    pub fn compare_value(&self, other: &ValidationTuple) -> Ordering {
        match (self.value(), other.value()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => term_cmp(a, b),
        }
    }

    /// Number of chain elements, optionally excluding a trailing value
    pub fn full_chain_size(&self, include_value: bool) -> usize {
        if !include_value && self.property_shape_scope_with_value {
            self.chain.len() - 1
        } else {
            self.chain.len()
        }
    }

    /// The target part of the chain; for property-shape scope the trailing
    /// value is excluded unless asked for
    pub fn target_chain(&self, include_value: bool) -> &[Term] {
        if self.scope == Scope::PropertyShape && self.has_value() && !include_value {
            &self.chain[..self.chain.len() - 1]
        } else {
            &self.chain
        }
    }

    /// Lexicographic comparison over the target chains, then chain size
    pub fn compare_full_target(&self, other: &ValidationTuple) -> Ordering {
        let a = self.target_chain(false);
        let b = other.target_chain(false);
        for (x, y) in a.iter().zip(b.iter()) {
            let ord = term_cmp(x, y);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.full_chain_size(true).cmp(&other.full_chain_size(true))
    }

    pub fn violations(&self) -> &[ViolationRecord] {
        &self.violations
    }

    pub fn compressed(&self) -> &[ValidationTuple] {
        &self.compressed
    }

    /// Attach a violation record, also to every compressed source tuple
    pub fn add_violation<F>(&self, make: F) -> ValidationTuple
    where
        F: Fn(&ValidationTuple) -> ViolationRecord,
    {
        self.add_violation_dyn(&make)
    }

    fn add_violation_dyn(
        &self,
        make: &dyn Fn(&ValidationTuple) -> ViolationRecord,
    ) -> ValidationTuple {
        let mut violations = self.violations.clone();
        violations.push(make(self));
        let compressed = self
            .compressed
            .iter()
            .map(|t| t.add_violation_dyn(make))
            .collect();
        ValidationTuple {
            chain: Arc::clone(&self.chain),
            scope: self.scope,
            property_shape_scope_with_value: self.property_shape_scope_with_value,
            violations,
            compressed,
            contexts: self.contexts.clone(),
        }
    }

    /// Replace this tuple's compressed set
    pub fn with_compressed(&self, mut compressed: Vec<ValidationTuple>) -> ValidationTuple {
        compressed.sort_by(full_order);
        ValidationTuple {
            chain: Arc::clone(&self.chain),
            scope: self.scope,
            property_shape_scope_with_value: self.property_shape_scope_with_value,
            violations: self.violations.clone(),
            compressed,
            contexts: self.contexts.clone(),
        }
    }

    /// Bind (or replace) the trailing value. Only valid in property-shape
    /// scope: on a node-shape tuple it would change the target itself.
    pub fn set_value(&self, value: Term) -> ValidationTuple {
        if self.value() == Some(&value) {
            return self.clone();
        }
        debug_assert_eq!(
            self.scope,
            Scope::PropertyShape,
            "set_value on a node-shape tuple would change the target"
        );

        let mut chain: Vec<Term> = if self.property_shape_scope_with_value {
            self.chain[..self.chain.len() - 1].to_vec()
        } else {
            self.chain.to_vec()
        };
        chain.push(value.clone());

        let compressed = self.compressed.iter().map(|t| t.set_value(value.clone()));
        ValidationTuple {
            chain: Arc::from(chain),
            scope: self.scope,
            property_shape_scope_with_value: true,
            violations: self.violations.clone(),
            compressed: compressed.collect(),
            contexts: self.contexts.clone(),
        }
    }

    /// Drop a bound value, keeping only the target chain
    pub fn trim_to_target(&self) -> ValidationTuple {
        if self.scope == Scope::PropertyShape && self.property_shape_scope_with_value {
            let chain = self.chain[..self.chain.len() - 1].to_vec();
            let compressed = self.compressed.iter().map(|t| t.trim_to_target()).collect();
            return ValidationTuple {
                chain: Arc::from(chain),
                scope: self.scope,
                property_shape_scope_with_value: false,
                violations: self.violations.clone(),
                compressed,
                contexts: self.contexts.clone(),
            };
        }
        self.clone()
    }

    /// Reinterpret a property-shape tuple in node-shape scope, fanning out
    /// over any compressed source tuples
    pub fn shift_to_node_shape(&self) -> Vec<ValidationTuple> {
        debug_assert_eq!(self.scope, Scope::PropertyShape);

        let shift_one = |t: &ValidationTuple| -> ValidationTuple {
            let (chain, has_value) = if self.property_shape_scope_with_value {
                (Arc::from(t.chain[..t.chain.len() - 1].to_vec()), false)
            } else {
                (Arc::clone(&t.chain), t.property_shape_scope_with_value)
            };
            ValidationTuple {
                chain,
                scope: Scope::NodeShape,
                property_shape_scope_with_value: has_value,
                violations: t.violations.clone(),
                compressed: Vec::new(),
                contexts: t.contexts.clone(),
            }
        };

        if self.compressed.is_empty() {
            vec![shift_one(self)]
        } else {
            self.compressed.iter().map(shift_one).collect()
        }
    }

    /// Reinterpret a node-shape tuple in property-shape scope: the chain
    /// tail becomes the bound value
    pub fn shift_to_property_shape(&self) -> Vec<ValidationTuple> {
        debug_assert_eq!(self.scope, Scope::NodeShape);
        debug_assert!(self.chain.len() >= 2);

        let shift_one = |t: &ValidationTuple| ValidationTuple {
            chain: Arc::clone(&t.chain),
            scope: Scope::PropertyShape,
            property_shape_scope_with_value: true,
            violations: t.violations.clone(),
            compressed: Vec::new(),
            contexts: t.contexts.clone(),
        };

        if self.compressed.is_empty() {
            vec![shift_one(self)]
        } else {
            self.compressed.iter().map(shift_one).collect()
        }
    }

    /// Remove the chain tail, stepping one level up the target chain
    pub fn pop(&self) -> Vec<ValidationTuple> {
        if self.compressed.is_empty() {
            let mut has_value = self.property_shape_scope_with_value;
            let chain: Arc<[Term]> = if self.scope == Scope::PropertyShape {
                if self.has_value() {
                    debug_assert!(self.chain.len() > 1, "pop would empty the chain");
                    Arc::from(self.chain[..self.chain.len() - 1].to_vec())
                } else {
                    has_value = true;
                    Arc::clone(&self.chain)
                }
            } else {
                debug_assert!(self.chain.len() > 1, "pop would empty the chain");
                Arc::from(self.chain[..self.chain.len() - 1].to_vec())
            };
            vec![ValidationTuple {
                chain,
                scope: self.scope,
                property_shape_scope_with_value: has_value,
                violations: self.violations.clone(),
                compressed: Vec::new(),
                contexts: self.contexts.clone(),
            }]
        } else {
            self.compressed.iter().flat_map(|t| t.pop()).collect()
        }
    }

    /// Join with a right-side tuple from a merge join: merges compressed
    /// provenance and contexts, and in property-shape scope takes the value
    /// from the right
    pub fn join(&self, right: &ValidationTuple) -> ValidationTuple {
        let compressed = if self.compressed.is_empty() {
            right.compressed.clone()
        } else if right.compressed.is_empty() {
            self.compressed.clone()
        } else {
            let mut merged = self.compressed.clone();
            for t in &right.compressed {
                if !merged.contains(t) {
                    merged.push(t.clone());
                }
            }
            merged.sort_by(full_order);
            merged
        };

        let mut contexts = self.contexts.clone();
        for c in &right.contexts {
            if !contexts.contains(c) {
                contexts.push(c.clone());
            }
        }

        let joined = ValidationTuple {
            chain: Arc::clone(&self.chain),
            scope: self.scope,
            property_shape_scope_with_value: self.property_shape_scope_with_value,
            violations: self.violations.clone(),
            compressed,
            contexts,
        };

        match (self.scope, right.value()) {
            (Scope::PropertyShape, Some(value)) => joined.set_value(value.clone()),
            _ => joined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> Term {
        Term::iri(format!("http://ex/{s}"))
    }

    #[test]
    fn active_target_with_and_without_value() {
        let node = ValidationTuple::new(iri("a"), Scope::NodeShape, true);
        assert_eq!(node.active_target(), &iri("a"));
        assert_eq!(node.value(), Some(&iri("a")));

        let prop = ValidationTuple::pair(iri("a"), iri("v"), Scope::PropertyShape, true);
        assert_eq!(prop.active_target(), &iri("a"));
        assert_eq!(prop.value(), Some(&iri("v")));

        let target_only = ValidationTuple::new(iri("a"), Scope::PropertyShape, false);
        assert_eq!(target_only.active_target(), &iri("a"));
        assert_eq!(target_only.value(), None);
    }

    #[test]
    fn set_value_extends_or_replaces() {
        let t = ValidationTuple::new(iri("a"), Scope::PropertyShape, false);
        let with_v = t.set_value(iri("v"));
        assert_eq!(with_v.chain().len(), 2);
        assert_eq!(with_v.value(), Some(&iri("v")));

        let replaced = with_v.set_value(iri("w"));
        assert_eq!(replaced.chain().len(), 2);
        assert_eq!(replaced.value(), Some(&iri("w")));
        // Unchanged original
        assert_eq!(with_v.value(), Some(&iri("v")));
    }

    #[test]
    fn trim_to_target_drops_only_the_value() {
        let t = ValidationTuple::pair(iri("a"), iri("v"), Scope::PropertyShape, true);
        let trimmed = t.trim_to_target();
        assert_eq!(trimmed.chain().len(), 1);
        assert!(!trimmed.has_value());
        // Idempotent on a tuple without a value
        assert_eq!(trimmed.trim_to_target(), trimmed);
    }

    #[test]
    fn shift_round_trip_preserves_active_target() {
        let t = ValidationTuple::pair(iri("a"), iri("v"), Scope::NodeShape, false);
        let original_target = t.active_target().clone();

        for shifted in t.shift_to_property_shape() {
            for back in shifted.shift_to_node_shape() {
                assert_eq!(back.active_target(), &original_target);
            }
        }
    }

    #[test]
    fn shift_to_property_shape_binds_tail_as_value() {
        let t = ValidationTuple::pair(iri("a"), iri("v"), Scope::NodeShape, false);
        let shifted = t.shift_to_property_shape();
        assert_eq!(shifted.len(), 1);
        assert_eq!(shifted[0].active_target(), &iri("a"));
        assert_eq!(shifted[0].value(), Some(&iri("v")));
    }

    #[test]
    fn pop_on_property_scope_without_value_binds_it() {
        let t = ValidationTuple::pair(iri("a"), iri("b"), Scope::PropertyShape, false);
        let popped = t.pop();
        assert_eq!(popped.len(), 1);
        assert!(popped[0].has_value());
        assert_eq!(popped[0].chain().len(), 2);
    }

    #[test]
    fn join_takes_value_from_right_and_merges_provenance() {
        let left = ValidationTuple::new(iri("a"), Scope::PropertyShape, false)
            .with_compressed(vec![ValidationTuple::new(iri("x"), Scope::NodeShape, true)]);
        let right = ValidationTuple::pair(iri("a"), iri("v"), Scope::PropertyShape, true);

        let joined = left.join(&right);
        assert_eq!(joined.value(), Some(&iri("v")));
        assert_eq!(joined.compressed().len(), 1);
    }

    #[test]
    fn add_violation_reaches_compressed_tuples() {
        use crate::shape::{ConstraintKind, Severity};
        let inner = ValidationTuple::pair(iri("a"), iri("v1"), Scope::PropertyShape, true);
        let outer = ValidationTuple::pair(iri("a"), iri("v2"), Scope::PropertyShape, true)
            .with_compressed(vec![inner]);

        let marked = outer.add_violation(|t| crate::violation::ViolationRecord {
            focus: t.active_target().clone(),
            value: t.value().cloned(),
            path: None,
            shape: iri("shape"),
            constraint: ConstraintKind::MinCount,
            severity: Severity::Violation,
            message: None,
            contexts: Vec::new(),
        });

        assert_eq!(marked.violations().len(), 1);
        assert_eq!(marked.compressed()[0].violations().len(), 1);
        assert_eq!(
            marked.compressed()[0].violations()[0].value,
            Some(iri("v1"))
        );
    }

    #[test]
    fn compressed_set_is_normalized() {
        let a = ValidationTuple::new(iri("a"), Scope::NodeShape, true);
        let b = ValidationTuple::new(iri("b"), Scope::NodeShape, true);
        let t1 = ValidationTuple::new(iri("t"), Scope::NodeShape, true)
            .with_compressed(vec![b.clone(), a.clone()]);
        let t2 = ValidationTuple::new(iri("t"), Scope::NodeShape, true)
            .with_compressed(vec![a, b]);
        assert_eq!(t1, t2);
    }
}
