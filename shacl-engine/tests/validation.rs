//! End-to-end validation scenarios and compiler equivalences

use shacl_engine::plan::drain;
use shacl_engine::{
    compile_shape, CompileContext, ConstraintComponent, Severity, Shape, TargetSelect,
    ValidationMode, Validator,
};
use shacl_model::vocab::{rdf, xsd};
use shacl_model::{Iri, Term, Triple};
use shacl_store::{ConnectionsGroup, MemorySail};
use std::collections::BTreeSet;
use std::rc::Rc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn iri(s: &str) -> Term {
    Term::iri(format!("http://ex/{s}"))
}

fn type_triple(s: &str, class: &str) -> Triple {
    Triple::new(iri(s), Iri::new(rdf::TYPE), iri(class))
}

fn triple(s: &str, p: &str, o: Term) -> Triple {
    Triple::new(iri(s), Iri::new(format!("http://ex/{p}")), o)
}

fn person_property(path: &str) -> Shape {
    Shape::property(iri("shape"), Iri::new(format!("http://ex/{path}")))
        .with_target(TargetSelect::Class(iri("Person")))
}

#[test]
fn min_count_violation_clears_after_incremental_fix() {
    init_tracing();
    let shape = person_property("knows").with_constraint(ConstraintComponent::MinCount(1));
    let validator = Validator::new(vec![shape]);

    let group = Rc::new(ConnectionsGroup::without_transaction(
        MemorySail::from_triples(vec![type_triple("alice", "Person")]),
    ));
    let report = validator.validate(group).unwrap();
    assert!(!report.conforms());
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].focus, iri("alice"));
    assert_eq!(report.results()[0].severity, Severity::Violation);

    let group = Rc::new(ConnectionsGroup::new(
        MemorySail::from_triples(vec![type_triple("alice", "Person")]),
        MemorySail::from_triples(vec![triple("alice", "knows", iri("bob"))]),
        MemorySail::new(),
    ));
    assert!(validator.validate(group).unwrap().conforms());
}

#[test]
fn min_count_violation_appears_after_incremental_removal() {
    init_tracing();
    let shape = person_property("knows").with_constraint(ConstraintComponent::MinCount(1));
    let validator = Validator::new(vec![shape]);

    let base = vec![
        type_triple("alice", "Person"),
        triple("alice", "knows", iri("bob")),
    ];
    let group = Rc::new(ConnectionsGroup::without_transaction(
        MemorySail::from_triples(base.clone()),
    ));
    assert!(validator.validate(group).unwrap().conforms());

    let group = Rc::new(ConnectionsGroup::new(
        MemorySail::from_triples(base),
        MemorySail::new(),
        MemorySail::from_triples(vec![triple("alice", "knows", iri("bob"))]),
    ));
    let report = validator.validate(group).unwrap();
    assert!(!report.conforms());
    assert_eq!(report.results()[0].focus, iri("alice"));
}

#[test]
fn datatype_violations_depend_on_literal_typing() {
    init_tracing();
    let shape = person_property("age")
        .with_constraint(ConstraintComponent::Datatype(Iri::new(xsd::INTEGER)));
    let validator = Validator::new(vec![shape]);

    let group = Rc::new(ConnectionsGroup::without_transaction(
        MemorySail::from_triples(vec![
            type_triple("alice", "Person"),
            triple("alice", "age", Term::string("abc")),
        ]),
    ));
    let report = validator.validate(group).unwrap();
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].value, Some(Term::string("abc")));
    assert_eq!(
        report.results()[0].path,
        Some(Iri::new("http://ex/age"))
    );

    let group = Rc::new(ConnectionsGroup::without_transaction(
        MemorySail::from_triples(vec![
            type_triple("alice", "Person"),
            triple("alice", "age", Term::typed("30", xsd::INTEGER)),
        ]),
    ));
    assert!(validator.validate(group).unwrap().conforms());
}

#[test]
fn unique_lang_flags_duplicate_tags() {
    init_tracing();
    let shape = person_property("label").with_constraint(ConstraintComponent::UniqueLang);
    let validator = Validator::new(vec![shape]);

    let group = Rc::new(ConnectionsGroup::without_transaction(
        MemorySail::from_triples(vec![
            type_triple("alice", "Person"),
            triple("alice", "label", Term::lang_tagged("one", "en")),
            triple("alice", "label", Term::lang_tagged("two", "EN")),
        ]),
    ));
    let report = validator.validate(group).unwrap();
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].focus, iri("alice"));
}

fn violating_targets(ctx: &CompileContext, shape: &Shape) -> BTreeSet<Term> {
    let plan = compile_shape(ctx, shape).unwrap().expect("plan expected");
    drain(plan)
        .unwrap()
        .into_iter()
        .map(|t| t.active_target().clone())
        .collect()
}

#[test]
fn de_morgan_rewrite_matches_explicit_or_of_negations() {
    init_tracing();
    let dataset = vec![
        type_triple("alice", "Person"),
        type_triple("bob", "Person"),
        type_triple("carol", "Person"),
        triple("alice", "age", Term::typed("30", xsd::INTEGER)),
        triple("bob", "age", Term::string("abc")),
        triple("carol", "age", Term::typed("7", xsd::INTEGER)),
    ];
    let group = Rc::new(ConnectionsGroup::without_transaction(
        MemorySail::from_triples(dataset),
    ));
    let ctx = CompileContext::new(group, ValidationMode::Full);

    let a = Shape::property(iri("a"), Iri::new("http://ex/age"))
        .with_constraint(ConstraintComponent::Datatype(Iri::new(xsd::INTEGER)));
    let b = Shape::property(iri("b"), Iri::new("http://ex/age"))
        .with_constraint(ConstraintComponent::MaxLength(1));

    let and_child = Shape::node(iri("and"))
        .with_constraint(ConstraintComponent::And(vec![a.clone(), b.clone()]));
    let not_and = Shape::node(iri("shape1"))
        .with_target(TargetSelect::Class(iri("Person")))
        .with_constraint(ConstraintComponent::Not(Box::new(and_child)));

    let not_a = Shape::node(iri("na")).with_constraint(ConstraintComponent::Not(Box::new(a)));
    let not_b = Shape::node(iri("nb")).with_constraint(ConstraintComponent::Not(Box::new(b)));
    let or_of_nots = Shape::node(iri("shape2"))
        .with_target(TargetSelect::Class(iri("Person")))
        .with_constraint(ConstraintComponent::Or(vec![not_a, not_b]));

    assert_eq!(
        violating_targets(&ctx, &not_and),
        violating_targets(&ctx, &or_of_nots)
    );
}

#[test]
fn empty_base_fast_path_matches_forced_fallback() {
    init_tracing();
    let shape = person_property("knows").with_constraint(ConstraintComponent::MinCount(1));

    let build = || {
        Rc::new(ConnectionsGroup::new(
            MemorySail::new(),
            MemorySail::from_triples(vec![
                type_triple("alice", "Person"),
                type_triple("bob", "Person"),
                triple("bob", "knows", iri("alice")),
            ]),
            MemorySail::new(),
        ))
    };

    let fast = Validator::new(vec![shape.clone()])
        .validate(build())
        .unwrap();
    let fallback = Validator::new(vec![shape])
        .with_force_fallback(true)
        .validate(build())
        .unwrap();

    let foci = |report: &shacl_engine::ValidationReport| -> BTreeSet<Term> {
        report.results().iter().map(|r| r.focus.clone()).collect()
    };
    assert_eq!(foci(&fast), foci(&fallback));
    assert_eq!(foci(&fast), BTreeSet::from([iri("alice")]));
}

#[test]
fn or_violates_only_when_every_branch_fails() {
    init_tracing();
    let group = Rc::new(ConnectionsGroup::without_transaction(
        MemorySail::from_triples(vec![
            type_triple("alice", "Person"),
            type_triple("bob", "Person"),
            triple("alice", "id", Term::typed("12", xsd::INTEGER)),
            triple("bob", "id", Term::string("bob-has-a-long-id")),
        ]),
    ));
    let integer = Shape::node(iri("int"))
        .with_constraint(ConstraintComponent::Datatype(Iri::new(xsd::INTEGER)));
    let short = Shape::node(iri("short")).with_constraint(ConstraintComponent::MaxLength(4));
    let shape = Shape::property(iri("shape"), Iri::new("http://ex/id"))
        .with_target(TargetSelect::Class(iri("Person")))
        .with_constraint(ConstraintComponent::Or(vec![integer, short]));

    let report = Validator::new(vec![shape]).validate(group).unwrap();
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].focus, iri("bob"));
}

#[test]
fn pair_constraint_reports_path_side_values() {
    init_tracing();
    let group = Rc::new(ConnectionsGroup::without_transaction(
        MemorySail::from_triples(vec![
            type_triple("order", "Order"),
            triple("order", "start", Term::typed("10", xsd::INTEGER)),
            triple("order", "end", Term::typed("5", xsd::INTEGER)),
        ]),
    ));
    let shape = Shape::property(iri("shape"), Iri::new("http://ex/start"))
        .with_target(TargetSelect::Class(iri("Order")))
        .with_constraint(ConstraintComponent::LessThan(Iri::new("http://ex/end")));

    let report = Validator::new(vec![shape]).validate(group).unwrap();
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].value, Some(Term::typed("10", xsd::INTEGER)));
}
