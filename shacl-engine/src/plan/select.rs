//! Source nodes: where tuples enter a plan
//!
//! `Select` runs a declarative query, `UnorderedSelect` scans a triple
//! pattern, `ValuesBackedNode` wraps a fixed value set, and `BindSelect`
//! bulk-extends a stream of partial tuples with one external query per
//! batch of bound targets.

use crate::connections::ConnectionHandle;
use crate::error::Result;
use crate::plan::bulk::BULK_SIZE;
use crate::plan::{DynPlan, PlanNode, TupleCursor, TupleIter, VecCursor};
use crate::tuple::{Scope, ValidationTuple};
use shacl_model::{term_cmp, Term, Triple, TriplePattern};
use shacl_store::{inject_bindings, Row};

/// Maps one query result row to a tuple; `None` skips the row
pub type RowMapper = Box<dyn Fn(&Row) -> Option<ValidationTuple>>;

/// Maps one matched triple to a tuple
pub type TripleMapper = Box<dyn Fn(&Triple) -> ValidationTuple>;

/// Runs a declarative query and maps each result row to a tuple
///
/// Declares sorted output only when the query carried a deterministic
/// ORDER BY; the caller states that via `ordered`.
pub struct Select {
    conn: ConnectionHandle,
    query: String,
    ordered: bool,
    map: RowMapper,
}

impl Select {
    pub fn new(conn: ConnectionHandle, query: String, ordered: bool, map: RowMapper) -> DynPlan {
        Box::new(Select {
            conn,
            query,
            ordered,
            map,
        })
    }
}

impl PlanNode for Select {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let rows = self.conn.evaluate(&self.query)?;
        let map = self.map;
        let tuples = rows.iter().filter_map(|row| map(row)).collect();
        Ok(Box::new(VecCursor::new(tuples)))
    }

    fn produces_sorted(&self) -> bool {
        self.ordered
    }

    fn depth(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "Select"
    }
}

/// Scans a triple pattern directly; output order follows index order and
/// is never assumed sorted by active target
pub struct UnorderedSelect {
    conn: ConnectionHandle,
    pattern: TriplePattern,
    map: TripleMapper,
}

impl UnorderedSelect {
    pub fn new(conn: ConnectionHandle, pattern: TriplePattern, map: TripleMapper) -> DynPlan {
        Box::new(UnorderedSelect {
            conn,
            pattern,
            map,
        })
    }

    /// Mapper producing a single-element tuple from the subject
    pub fn subject_mapper(scope: Scope) -> TripleMapper {
        Box::new(move |t: &Triple| ValidationTuple::new(t.subject.clone(), scope, false))
    }

    /// Mapper producing a single-element tuple from the object
    pub fn object_mapper(scope: Scope) -> TripleMapper {
        Box::new(move |t: &Triple| ValidationTuple::new(t.object.clone(), scope, false))
    }

    /// Mapper producing a (subject, object) pair tuple
    pub fn pair_mapper(scope: Scope) -> TripleMapper {
        Box::new(move |t: &Triple| {
            ValidationTuple::pair(t.subject.clone(), t.object.clone(), scope, true)
        })
    }
}

impl PlanNode for UnorderedSelect {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let triples = self.conn.triples(&self.pattern);
        let map = self.map;
        let tuples = triples.iter().map(|t| map(t)).collect();
        Ok(Box::new(VecCursor::new(tuples)))
    }

    fn produces_sorted(&self) -> bool {
        false
    }

    fn depth(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "UnorderedSelect"
    }
}

/// A fixed set of values as a one-column tuple stream, always sorted
pub struct ValuesBackedNode {
    values: Vec<Term>,
    scope: Scope,
}

impl ValuesBackedNode {
    pub fn new(mut values: Vec<Term>, scope: Scope) -> DynPlan {
        values.sort_by(term_cmp);
        values.dedup();
        Box::new(ValuesBackedNode { values, scope })
    }
}

impl PlanNode for ValuesBackedNode {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        let scope = self.scope;
        let tuples = self
            .values
            .into_iter()
            .map(|v| ValidationTuple::new(v, scope, false))
            .collect();
        Ok(Box::new(VecCursor::new(tuples)))
    }

    fn produces_sorted(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "ValuesBackedNode"
    }
}

/// Maps a query row produced for a batch back to an extended tuple
pub type BindMapper = Box<dyn Fn(&Row) -> Option<ValidationTuple>>;

/// Bulk-executes a query template once per batch of parent targets
///
/// The template must contain the bound-values injection marker; the
/// current batch's active targets are spliced in as a VALUES table. Query
/// engines are free to reorder results, so output is declared unsorted
/// and must be re-sorted by consumers that care.
pub struct BindSelect {
    parent: DynPlan,
    conn: ConnectionHandle,
    template: String,
    bind_var: &'static str,
    map: BindMapper,
    depth: usize,
}

impl BindSelect {
    pub fn new(
        parent: DynPlan,
        conn: ConnectionHandle,
        template: String,
        bind_var: &'static str,
        map: BindMapper,
    ) -> DynPlan {
        let parent = crate::plan::attach_sorted(parent);
        let depth = parent.depth() + 1;
        Box::new(BindSelect {
            parent,
            conn,
            template,
            bind_var,
            map,
            depth,
        })
    }
}

impl PlanNode for BindSelect {
    fn iter(self: Box<Self>) -> Result<TupleIter> {
        Ok(Box::new(BindSelectCursor {
            parent: self.parent.iter()?,
            conn: self.conn,
            template: self.template,
            bind_var: self.bind_var,
            map: self.map,
            pending: VecCursor::new(Vec::new()),
            done: false,
        }))
    }

    fn produces_sorted(&self) -> bool {
        false
    }

    fn requires_sorted_input(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn name(&self) -> &'static str {
        "BindSelect"
    }
}

struct BindSelectCursor {
    parent: TupleIter,
    conn: ConnectionHandle,
    template: String,
    bind_var: &'static str,
    map: BindMapper,
    pending: VecCursor,
    done: bool,
}

impl BindSelectCursor {
    fn refill(&mut self) -> Result<bool> {
        let mut batch: Vec<Vec<Term>> = Vec::with_capacity(BULK_SIZE);
        while batch.len() < BULK_SIZE {
            match self.parent.next()? {
                Some(tuple) => batch.push(vec![tuple.active_target().clone()]),
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            return Ok(false);
        }
        // Sorted input means batches carry no duplicate runs across batch
        // boundaries, but within a batch duplicates are still possible.
        batch.dedup();
        let query = inject_bindings(&self.template, &[self.bind_var], &batch);
        let rows = self.conn.evaluate(&query)?;
        let tuples: Vec<ValidationTuple> = rows.iter().filter_map(|r| (self.map)(r)).collect();
        self.pending = VecCursor::new(tuples);
        Ok(true)
    }
}

impl TupleCursor for BindSelectCursor {
    fn next(&mut self) -> Result<Option<ValidationTuple>> {
        loop {
            if let Some(tuple) = self.pending.next()? {
                return Ok(Some(tuple));
            }
            if self.done {
                return Ok(None);
            }
            if !self.refill()? {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::View;
    use crate::plan::drain;
    use shacl_model::Iri;
    use shacl_store::{ConnectionsGroup, MemorySail, BINDING_INJECTION_MARKER};
    use std::rc::Rc;

    fn handle(triples: Vec<Triple>) -> ConnectionHandle {
        let group = ConnectionsGroup::without_transaction(MemorySail::from_triples(triples));
        ConnectionHandle::new(Rc::new(group), View::Current)
    }

    fn knows(s: &str, o: &str) -> Triple {
        Triple::new(
            Term::iri(format!("http://ex/{s}")),
            Iri::new("http://ex/knows"),
            Term::iri(format!("http://ex/{o}")),
        )
    }

    #[test]
    fn select_maps_rows_in_query_order() {
        let conn = handle(vec![knows("b", "x"), knows("a", "y")]);
        let plan = Select::new(
            conn,
            "SELECT ?a ?c WHERE { ?a <http://ex/knows> ?c . } ORDER BY ?a ?c".to_string(),
            true,
            Box::new(|row| {
                Some(ValidationTuple::pair(
                    row.get("a")?.clone(),
                    row.get("c")?.clone(),
                    Scope::PropertyShape,
                    true,
                ))
            }),
        );
        assert!(plan.produces_sorted());
        let tuples = drain(plan).unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].active_target(), &Term::iri("http://ex/a"));
    }

    #[test]
    fn unordered_select_scans_pattern() {
        let conn = handle(vec![knows("a", "x"), knows("b", "y"), knows("b", "z")]);
        let plan = UnorderedSelect::new(
            conn,
            TriplePattern::any().with_subject(Term::iri("http://ex/b")),
            UnorderedSelect::pair_mapper(Scope::PropertyShape),
        );
        let tuples = drain(plan).unwrap();
        assert_eq!(tuples.len(), 2);
    }

    #[test]
    fn values_backed_node_sorts_and_dedups() {
        let plan = ValuesBackedNode::new(
            vec![
                Term::iri("http://ex/b"),
                Term::iri("http://ex/a"),
                Term::iri("http://ex/b"),
            ],
            Scope::NodeShape,
        );
        assert!(plan.produces_sorted());
        let tuples = drain(plan).unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].active_target(), &Term::iri("http://ex/a"));
    }

    #[test]
    fn bind_select_extends_batch_targets() {
        let conn = handle(vec![knows("a", "x"), knows("b", "y"), knows("c", "z")]);
        let parent = ValuesBackedNode::new(
            vec![Term::iri("http://ex/a"), Term::iri("http://ex/c")],
            Scope::PropertyShape,
        );
        let template = format!(
            "SELECT ?a ?c WHERE {{ {BINDING_INJECTION_MARKER} ?a <http://ex/knows> ?c . }}"
        );
        let plan = BindSelect::new(
            parent,
            conn,
            template,
            "a",
            Box::new(|row| {
                Some(ValidationTuple::pair(
                    row.get("a")?.clone(),
                    row.get("c")?.clone(),
                    Scope::PropertyShape,
                    true,
                ))
            }),
        );
        let tuples = drain(plan).unwrap();
        let mut targets: Vec<String> = tuples
            .iter()
            .map(|t| t.active_target().to_string())
            .collect();
        targets.sort();
        assert_eq!(targets, vec!["<http://ex/a>", "<http://ex/c>"]);
    }
}
