//! Target selection plans
//!
//! Builds the source plans that enumerate a shape's focus nodes, either
//! from a full view of the store or from a transaction's delta views, and
//! the membership filter that re-checks candidates against the current
//! state.

use crate::connections::{ConnectionHandle, View};
use crate::plan::{
    DynPlan, Select, TupleFilter, UnionNode, Unique, UnorderedSelect, ValuesBackedNode,
};
use crate::shape::TargetSelect;
use crate::tuple::{Scope, ValidationTuple};
use shacl_model::vocab::rdf;
use shacl_model::{Iri, Term, TriplePattern};
use shacl_store::term_to_query_text;

/// Sorted, deduplicated targets of the given selects, sourced from one view
pub fn target_plan(conn: &ConnectionHandle, selects: &[TargetSelect], scope: Scope) -> DynPlan {
    let children: Vec<DynPlan> = selects
        .iter()
        .map(|select| select_plan(conn, select, scope))
        .collect();
    Unique::new(UnionNode::new(children), false)
}

fn select_plan(conn: &ConnectionHandle, select: &TargetSelect, scope: Scope) -> DynPlan {
    match select {
        // Class membership goes through the query surface so a production
        // backend answers it from its type index; ORDER BY makes the
        // source sorted without a local buffer.
        TargetSelect::Class(class) => Select::new(
            conn.clone(),
            format!(
                "SELECT ?a WHERE {{ ?a <{}> {} . }} ORDER BY ?a",
                rdf::TYPE,
                term_to_query_text(class)
            ),
            true,
            Box::new(move |row| {
                Some(ValidationTuple::new(row.get("a")?.clone(), scope, false))
            }),
        ),
        TargetSelect::Node(nodes) => ValuesBackedNode::new(nodes.clone(), scope),
        TargetSelect::SubjectsOf(predicate) => UnorderedSelect::new(
            conn.clone(),
            TriplePattern::any().with_predicate(predicate.clone()),
            UnorderedSelect::subject_mapper(scope),
        ),
        TargetSelect::ObjectsOf(predicate) => UnorderedSelect::new(
            conn.clone(),
            TriplePattern::any().with_predicate(predicate.clone()),
            UnorderedSelect::object_mapper(scope),
        ),
        TargetSelect::AllSubjects => UnorderedSelect::new(
            conn.clone(),
            TriplePattern::any(),
            UnorderedSelect::subject_mapper(scope),
        ),
        TargetSelect::AllObjects => UnorderedSelect::new(
            conn.clone(),
            TriplePattern::any(),
            UnorderedSelect::object_mapper(scope),
        ),
    }
}

/// Candidate targets an incremental pass must consider: targets visible in
/// the transaction deltas, plus subjects whose path predicate was touched
pub fn delta_target_plan(
    conn: &ConnectionHandle,
    selects: &[TargetSelect],
    path: Option<&Iri>,
    scope: Scope,
) -> DynPlan {
    let added = conn.reroot(View::Added);
    let removed = conn.reroot(View::Removed);

    let mut children: Vec<DynPlan> = vec![
        target_plan(&added, selects, scope),
        target_plan(&removed, selects, scope),
    ];
    if let Some(path) = path {
        for view in [&added, &removed] {
            children.push(UnorderedSelect::new(
                view.clone(),
                TriplePattern::any().with_predicate(path.clone()),
                UnorderedSelect::subject_mapper(scope),
            ));
        }
    }
    Unique::new(UnionNode::new(children), false)
}

/// Re-checks that a candidate is still a target under the current state;
/// used to drop candidates whose target-defining triples were removed
pub struct TargetMembershipFilter {
    conn: ConnectionHandle,
    selects: Vec<TargetSelect>,
}

impl TargetMembershipFilter {
    pub fn new(conn: ConnectionHandle, selects: Vec<TargetSelect>) -> Self {
        TargetMembershipFilter { conn, selects }
    }

    fn select_matches(&self, select: &TargetSelect, target: &Term) -> bool {
        match select {
            TargetSelect::Class(class) => {
                !target.is_literal()
                    && self.conn.contains(
                        &TriplePattern::any()
                            .with_subject(target.clone())
                            .with_predicate(Iri::new(rdf::TYPE))
                            .with_object(class.clone()),
                    )
            }
            TargetSelect::Node(nodes) => nodes.contains(target),
            TargetSelect::SubjectsOf(predicate) => {
                !target.is_literal()
                    && self.conn.contains(
                        &TriplePattern::any()
                            .with_subject(target.clone())
                            .with_predicate(predicate.clone()),
                    )
            }
            TargetSelect::ObjectsOf(predicate) => self.conn.contains(
                &TriplePattern::any()
                    .with_predicate(predicate.clone())
                    .with_object(target.clone()),
            ),
            TargetSelect::AllSubjects => {
                !target.is_literal()
                    && self
                        .conn
                        .contains(&TriplePattern::any().with_subject(target.clone()))
            }
            TargetSelect::AllObjects => self
                .conn
                .contains(&TriplePattern::any().with_object(target.clone())),
        }
    }
}

impl TupleFilter for TargetMembershipFilter {
    fn test(&self, tuple: &ValidationTuple) -> bool {
        let target = tuple.active_target();
        self.selects
            .iter()
            .any(|select| self.select_matches(select, target))
    }

    fn name(&self) -> &'static str {
        "TargetMembershipFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{drain, FilterNode};
    use shacl_model::Triple;
    use shacl_store::{ConnectionsGroup, MemorySail};
    use std::rc::Rc;

    fn type_triple(s: &str, class: &str) -> Triple {
        Triple::new(
            Term::iri(format!("http://ex/{s}")),
            Iri::new(rdf::TYPE),
            Term::iri(format!("http://ex/{class}")),
        )
    }

    fn knows(s: &str, o: &str) -> Triple {
        Triple::new(
            Term::iri(format!("http://ex/{s}")),
            Iri::new("http://ex/knows"),
            Term::iri(format!("http://ex/{o}")),
        )
    }

    #[test]
    fn class_targets_are_sorted_and_unique() {
        let group = ConnectionsGroup::without_transaction(MemorySail::from_triples(vec![
            type_triple("b", "Person"),
            type_triple("a", "Person"),
            type_triple("a", "Person2"),
        ]));
        let conn = ConnectionHandle::new(Rc::new(group), View::Current);
        let plan = target_plan(
            &conn,
            &[TargetSelect::Class(Term::iri("http://ex/Person"))],
            Scope::PropertyShape,
        );
        let out = drain(plan).unwrap();
        let names: Vec<String> = out.iter().map(|t| t.active_target().to_string()).collect();
        assert_eq!(names, vec!["<http://ex/a>", "<http://ex/b>"]);
    }

    #[test]
    fn all_subjects_excludes_pure_objects() {
        let group = ConnectionsGroup::without_transaction(MemorySail::from_triples(vec![
            knows("a", "x"),
            knows("b", "y"),
        ]));
        let conn = ConnectionHandle::new(Rc::new(group), View::Current);
        let subjects = drain(target_plan(
            &conn,
            &[TargetSelect::AllSubjects],
            Scope::PropertyShape,
        ))
        .unwrap();
        let names: Vec<String> = subjects
            .iter()
            .map(|t| t.active_target().to_string())
            .collect();
        assert_eq!(names, vec!["<http://ex/a>", "<http://ex/b>"]);

        let objects = drain(target_plan(
            &conn,
            &[TargetSelect::AllObjects],
            Scope::PropertyShape,
        ))
        .unwrap();
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn delta_targets_include_path_subjects() {
        let group = ConnectionsGroup::new(
            MemorySail::from_triples(vec![type_triple("a", "Person")]),
            MemorySail::from_triples(vec![knows("a", "x")]),
            MemorySail::new(),
        );
        let conn = ConnectionHandle::new(Rc::new(group), View::Current);
        let plan = delta_target_plan(
            &conn,
            &[TargetSelect::Class(Term::iri("http://ex/Person"))],
            Some(&Iri::new("http://ex/knows")),
            Scope::PropertyShape,
        );
        let out = drain(plan).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target().to_string(), "<http://ex/a>");
    }

    #[test]
    fn membership_filter_drops_retracted_targets() {
        // "a" lost its type triple in this transaction.
        let group = ConnectionsGroup::new(
            MemorySail::from_triples(vec![type_triple("a", "Person"), type_triple("b", "Person")]),
            MemorySail::new(),
            MemorySail::from_triples(vec![type_triple("a", "Person")]),
        );
        let conn = ConnectionHandle::new(Rc::new(group), View::Current);
        let candidates = target_plan(
            &conn.reroot(View::Previous),
            &[TargetSelect::Class(Term::iri("http://ex/Person"))],
            Scope::PropertyShape,
        );
        let filter = TargetMembershipFilter::new(
            conn,
            vec![TargetSelect::Class(Term::iri("http://ex/Person"))],
        );
        let out = drain(FilterNode::keep(candidates, filter)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target().to_string(), "<http://ex/b>");
    }
}
