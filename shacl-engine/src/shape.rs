//! Shape and constraint descriptors
//!
//! A read-only tree handed to the compiler: node shapes with targets,
//! property shapes with a single-predicate path, and per-shape constraint
//! components. The compiler never mutates shapes; unsupported parameter
//! combinations deactivate a shape at compile time instead.

use shacl_model::vocab::sh;
use shacl_model::{Iri, Literal, Term};

/// Reporting severity carried into violation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Violation,
    Warning,
    Info,
}

impl Severity {
    pub fn as_iri(&self) -> &'static str {
        match self {
            Severity::Violation => sh::VIOLATION,
            Severity::Warning => sh::WARNING,
            Severity::Info => sh::INFO,
        }
    }
}

/// The six node-kind classifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Iri,
    BlankNode,
    Literal,
    BlankNodeOrIri,
    BlankNodeOrLiteral,
    IriOrLiteral,
}

impl NodeKind {
    pub fn from_iri(iri: &str) -> Option<NodeKind> {
        match iri {
            sh::IRI_KIND => Some(NodeKind::Iri),
            sh::BLANK_NODE => Some(NodeKind::BlankNode),
            sh::LITERAL => Some(NodeKind::Literal),
            sh::BLANK_NODE_OR_IRI => Some(NodeKind::BlankNodeOrIri),
            sh::BLANK_NODE_OR_LITERAL => Some(NodeKind::BlankNodeOrLiteral),
            sh::IRI_OR_LITERAL => Some(NodeKind::IriOrLiteral),
            _ => None,
        }
    }

    pub fn matches(&self, term: &Term) -> bool {
        match self {
            NodeKind::Iri => term.is_iri(),
            NodeKind::BlankNode => term.is_blank_node(),
            NodeKind::Literal => term.is_literal(),
            NodeKind::BlankNodeOrIri => term.is_blank_node() || term.is_iri(),
            NodeKind::BlankNodeOrLiteral => term.is_blank_node() || term.is_literal(),
            NodeKind::IriOrLiteral => term.is_iri() || term.is_literal(),
        }
    }
}

/// How a shape selects its focus nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelect {
    /// Instances of a class
    Class(Term),
    /// An explicit node list
    Node(Vec<Term>),
    /// Subjects of a predicate
    SubjectsOf(Iri),
    /// Objects of a predicate
    ObjectsOf(Iri),
    /// Every subject in the dataset
    AllSubjects,
    /// Every object in the dataset
    AllObjects,
}

/// One constraint parameter on a shape
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintComponent {
    MinCount(usize),
    MaxCount(usize),
    Datatype(Iri),
    Class(Term),
    NodeKind(NodeKind),
    Pattern {
        pattern: String,
        flags: Option<String>,
    },
    MinLength(usize),
    MaxLength(usize),
    MinInclusive(Literal),
    MinExclusive(Literal),
    MaxInclusive(Literal),
    MaxExclusive(Literal),
    In(Vec<Term>),
    HasValue(Term),
    LanguageIn(Vec<String>),
    UniqueLang,
    Equals(Iri),
    Disjoint(Iri),
    LessThan(Iri),
    LessThanOrEquals(Iri),
    And(Vec<Shape>),
    Or(Vec<Shape>),
    Not(Box<Shape>),
}

/// Fieldless mirror of [`ConstraintComponent`], used in violation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    MinCount,
    MaxCount,
    Datatype,
    Class,
    NodeKind,
    Pattern,
    MinLength,
    MaxLength,
    MinInclusive,
    MinExclusive,
    MaxInclusive,
    MaxExclusive,
    In,
    HasValue,
    LanguageIn,
    UniqueLang,
    Equals,
    Disjoint,
    LessThan,
    LessThanOrEquals,
    And,
    Or,
    Not,
}

impl ConstraintComponent {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            ConstraintComponent::MinCount(_) => ConstraintKind::MinCount,
            ConstraintComponent::MaxCount(_) => ConstraintKind::MaxCount,
            ConstraintComponent::Datatype(_) => ConstraintKind::Datatype,
            ConstraintComponent::Class(_) => ConstraintKind::Class,
            ConstraintComponent::NodeKind(_) => ConstraintKind::NodeKind,
            ConstraintComponent::Pattern { .. } => ConstraintKind::Pattern,
            ConstraintComponent::MinLength(_) => ConstraintKind::MinLength,
            ConstraintComponent::MaxLength(_) => ConstraintKind::MaxLength,
            ConstraintComponent::MinInclusive(_) => ConstraintKind::MinInclusive,
            ConstraintComponent::MinExclusive(_) => ConstraintKind::MinExclusive,
            ConstraintComponent::MaxInclusive(_) => ConstraintKind::MaxInclusive,
            ConstraintComponent::MaxExclusive(_) => ConstraintKind::MaxExclusive,
            ConstraintComponent::In(_) => ConstraintKind::In,
            ConstraintComponent::HasValue(_) => ConstraintKind::HasValue,
            ConstraintComponent::LanguageIn(_) => ConstraintKind::LanguageIn,
            ConstraintComponent::UniqueLang => ConstraintKind::UniqueLang,
            ConstraintComponent::Equals(_) => ConstraintKind::Equals,
            ConstraintComponent::Disjoint(_) => ConstraintKind::Disjoint,
            ConstraintComponent::LessThan(_) => ConstraintKind::LessThan,
            ConstraintComponent::LessThanOrEquals(_) => ConstraintKind::LessThanOrEquals,
            ConstraintComponent::And(_) => ConstraintKind::And,
            ConstraintComponent::Or(_) => ConstraintKind::Or,
            ConstraintComponent::Not(_) => ConstraintKind::Not,
        }
    }
}

/// A node shape or property shape
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub id: Term,
    pub targets: Vec<TargetSelect>,
    /// Single-predicate path; `None` makes this a node shape
    pub path: Option<Iri>,
    pub deactivated: bool,
    pub severity: Severity,
    pub message: Option<String>,
    pub constraints: Vec<ConstraintComponent>,
}

impl Shape {
    pub fn node(id: impl Into<Term>) -> Shape {
        Shape {
            id: id.into(),
            targets: Vec::new(),
            path: None,
            deactivated: false,
            severity: Severity::Violation,
            message: None,
            constraints: Vec::new(),
        }
    }

    pub fn property(id: impl Into<Term>, path: Iri) -> Shape {
        Shape {
            path: Some(path),
            ..Shape::node(id)
        }
    }

    pub fn with_target(mut self, target: TargetSelect) -> Shape {
        self.targets.push(target);
        self
    }

    pub fn with_constraint(mut self, constraint: ConstraintComponent) -> Shape {
        self.constraints.push(constraint);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Shape {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Shape {
        self.message = Some(message.into());
        self
    }

    pub fn deactivated(mut self) -> Shape {
        self.deactivated = true;
        self
    }

    pub fn is_property_shape(&self) -> bool {
        self.path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_unions_cover_both_members() {
        let iri = Term::iri("http://ex/x");
        let bnode = Term::bnode("b");
        let lit = Term::string("s");

        assert!(NodeKind::BlankNodeOrIri.matches(&iri));
        assert!(NodeKind::BlankNodeOrIri.matches(&bnode));
        assert!(!NodeKind::BlankNodeOrIri.matches(&lit));
        assert!(NodeKind::IriOrLiteral.matches(&lit));
    }

    #[test]
    fn node_kind_parses_shacl_iris() {
        assert_eq!(NodeKind::from_iri(sh::IRI_KIND), Some(NodeKind::Iri));
        assert_eq!(NodeKind::from_iri("http://ex/other"), None);
    }

    #[test]
    fn constraint_kind_mirrors_component() {
        let c = ConstraintComponent::Pattern {
            pattern: "^a".to_string(),
            flags: None,
        };
        assert_eq!(c.kind(), ConstraintKind::Pattern);
    }
}
