//! Declarative query subset: parsing, bound-values injection, evaluation
//!
//! The engine builds query *text* and treats it as opaque; a production
//! backend hands that text to its own SPARQL engine. This module defines
//! the subset grammar the engine emits and a reference evaluator over any
//! [`SailReader`], used by the in-memory sail and the test suites.
//!
//! Grammar (whitespace separated):
//!
//! ```text
//! SELECT ?a ?c WHERE {
//!   ?a <http://ex/knows> ?c .
//!   OPTIONAL { ?c <http://ex/name> ?n . }
//!   VALUES ( ?a ) { ( <http://ex/alice> ) ( UNDEF ) }
//! } ORDER BY ?a ?c
//! ```
//!
//! Bulk joins do not emit VALUES clauses directly; they emit the marker
//! token [`BINDING_INJECTION_MARKER`] inside the WHERE block and call
//! [`inject_bindings`] once per batch to splice in the current batch's
//! bound-values table before the text is evaluated.

use crate::error::{Result, StoreError};
use crate::reader::{Row, SailReader};
use shacl_model::{term_cmp, ContextMatch, Term, TriplePattern};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Marker token replaced by an inline VALUES table before parsing
pub const BINDING_INJECTION_MARKER: &str = "#VALUES_INJECTION#";

/// Splice a bound-values table into a query at the injection marker
///
/// Each row must have one term per variable. An empty row set produces a
/// VALUES table with no rows, which correctly yields zero solutions.
pub fn inject_bindings(query: &str, vars: &[&str], rows: &[Vec<Term>]) -> String {
    let mut table = String::from("VALUES ( ");
    for var in vars {
        table.push('?');
        table.push_str(var);
        table.push(' ');
    }
    table.push_str(") { ");
    for row in rows {
        debug_assert_eq!(row.len(), vars.len());
        table.push_str("( ");
        for term in row {
            table.push_str(&term_to_query_text(term));
            table.push(' ');
        }
        table.push_str(") ");
    }
    table.push('}');
    query.replace(BINDING_INJECTION_MARKER, &table)
}

/// Serialize a term in the query syntax
pub fn term_to_query_text(term: &Term) -> String {
    match term {
        Term::Iri(iri) => format!("<{}>", iri.as_str()),
        Term::BlankNode(b) => format!("_:{}", b.as_str()),
        Term::Literal(lit) => {
            let escaped = lit
                .lexical()
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n");
            match lit.language() {
                Some(lang) => format!("\"{}\"@{}", escaped, lang),
                None if lit.datatype().as_str() == shacl_model::vocab::xsd::STRING => {
                    format!("\"{}\"", escaped)
                }
                None => format!("\"{}\"^^<{}>", escaped, lit.datatype().as_str()),
            }
        }
    }
}

/// A parsed query
#[derive(Debug, Clone)]
pub struct Query {
    pub select: Vec<String>,
    pub clauses: Vec<Clause>,
    pub order_by: Vec<String>,
}

/// One WHERE clause
#[derive(Debug, Clone)]
pub enum Clause {
    Pattern(PatternClause),
    Optional(Vec<PatternClause>),
    Values {
        vars: Vec<String>,
        rows: Vec<Vec<Option<Term>>>,
    },
}

/// A triple pattern with variables
#[derive(Debug, Clone)]
pub struct PatternClause {
    pub subject: VarOrTerm,
    pub predicate: VarOrTerm,
    pub object: VarOrTerm,
}

#[derive(Debug, Clone)]
pub enum VarOrTerm {
    Var(String),
    Term(Term),
}

impl VarOrTerm {
    fn var(&self) -> Option<&str> {
        match self {
            VarOrTerm::Var(v) => Some(v),
            VarOrTerm::Term(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Keyword(String),
    Var(String),
    Term(Term),
    Undef,
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Dot,
}

fn lex(query: &str) -> Result<Vec<Token>> {
    let malformed = |message: &str| StoreError::MalformedQuery {
        query: query.to_string(),
        message: message.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '{' => {
                chars.next();
                tokens.push(Token::OpenBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::CloseBrace);
            }
            '(' => {
                chars.next();
                tokens.push(Token::OpenParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::CloseParen);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '#' => {
                // Only the injection marker starts with '#'; seeing it here
                // means the caller forgot to inject bindings.
                return Err(malformed("unresolved binding injection marker"));
            }
            '?' => {
                chars.next();
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(malformed("empty variable name"));
                }
                tokens.push(Token::Var(name));
            }
            '<' => {
                chars.next();
                let mut iri = String::new();
                loop {
                    match chars.next() {
                        Some('>') => break,
                        Some(c) => iri.push(c),
                        None => return Err(malformed("unterminated IRI")),
                    }
                }
                tokens.push(Token::Term(Term::iri(iri)));
            }
            '_' => {
                chars.next();
                if chars.next() != Some(':') {
                    return Err(malformed("malformed blank node"));
                }
                let mut id = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '-' {
                        id.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Term(Term::bnode(id)));
            }
            '"' => {
                chars.next();
                let mut lexical = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some('\\') => lexical.push('\\'),
                            Some('"') => lexical.push('"'),
                            Some('n') => lexical.push('\n'),
                            _ => return Err(malformed("bad escape in literal")),
                        },
                        Some('"') => break,
                        Some(c) => lexical.push(c),
                        None => return Err(malformed("unterminated literal")),
                    }
                }
                // Optional ^^<datatype> or @lang suffix
                match chars.peek() {
                    Some('^') => {
                        chars.next();
                        if chars.next() != Some('^') || chars.next() != Some('<') {
                            return Err(malformed("malformed datatype suffix"));
                        }
                        let mut dt = String::new();
                        loop {
                            match chars.next() {
                                Some('>') => break,
                                Some(c) => dt.push(c),
                                None => return Err(malformed("unterminated datatype IRI")),
                            }
                        }
                        tokens.push(Token::Term(Term::typed(lexical, dt)));
                    }
                    Some('@') => {
                        chars.next();
                        let mut lang = String::new();
                        while let Some(&c) = chars.peek() {
                            if c.is_alphanumeric() || c == '-' {
                                lang.push(c);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        tokens.push(Token::Term(Term::lang_tagged(lexical, lang)));
                    }
                    _ => tokens.push(Token::Term(Term::string(lexical))),
                }
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if word == "UNDEF" {
                    tokens.push(Token::Undef);
                } else {
                    tokens.push(Token::Keyword(word.to_ascii_uppercase()));
                }
            }
            _ => return Err(malformed(&format!("unexpected character '{c}'"))),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    query: &'a str,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> StoreError {
        StoreError::MalformedQuery {
            query: self.query.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        match self.next() {
            Some(Token::Keyword(w)) if w == kw => Ok(()),
            other => Err(self.error(format!("expected {kw}, found {other:?}"))),
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => Err(self.error(format!("expected {token:?}, found {other:?}"))),
        }
    }

    fn parse_var(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Var(v)) => Ok(v),
            other => Err(self.error(format!("expected variable, found {other:?}"))),
        }
    }

    fn parse_var_or_term(&mut self) -> Result<VarOrTerm> {
        match self.next() {
            Some(Token::Var(v)) => Ok(VarOrTerm::Var(v)),
            Some(Token::Term(t)) => Ok(VarOrTerm::Term(t)),
            other => Err(self.error(format!("expected variable or term, found {other:?}"))),
        }
    }

    fn parse_pattern(&mut self) -> Result<PatternClause> {
        let subject = self.parse_var_or_term()?;
        let predicate = self.parse_var_or_term()?;
        let object = self.parse_var_or_term()?;
        self.expect(Token::Dot)?;
        Ok(PatternClause {
            subject,
            predicate,
            object,
        })
    }

    fn parse_values(&mut self) -> Result<Clause> {
        self.expect(Token::OpenParen)?;
        let mut vars = Vec::new();
        while let Some(Token::Var(_)) = self.peek() {
            vars.push(self.parse_var()?);
        }
        self.expect(Token::CloseParen)?;
        self.expect(Token::OpenBrace)?;

        let mut rows = Vec::new();
        loop {
            match self.peek() {
                Some(Token::OpenParen) => {
                    self.next();
                    let mut row = Vec::new();
                    loop {
                        match self.peek() {
                            Some(Token::CloseParen) => {
                                self.next();
                                break;
                            }
                            Some(Token::Undef) => {
                                self.next();
                                row.push(None);
                            }
                            Some(Token::Term(_)) => {
                                if let Some(Token::Term(t)) = self.next() {
                                    row.push(Some(t));
                                }
                            }
                            other => {
                                return Err(
                                    self.error(format!("bad VALUES row entry: {other:?}"))
                                )
                            }
                        }
                    }
                    if row.len() != vars.len() {
                        return Err(self.error("VALUES row arity mismatch"));
                    }
                    rows.push(row);
                }
                Some(Token::CloseBrace) => {
                    self.next();
                    break;
                }
                other => return Err(self.error(format!("bad VALUES body: {other:?}"))),
            }
        }
        Ok(Clause::Values { vars, rows })
    }

    fn parse_where_body(&mut self) -> Result<Vec<Clause>> {
        let mut clauses = Vec::new();
        loop {
            match self.peek() {
                Some(Token::CloseBrace) => {
                    self.next();
                    return Ok(clauses);
                }
                Some(Token::Keyword(kw)) if kw == "OPTIONAL" => {
                    self.next();
                    self.expect(Token::OpenBrace)?;
                    let mut inner = Vec::new();
                    while !matches!(self.peek(), Some(Token::CloseBrace)) {
                        inner.push(self.parse_pattern()?);
                    }
                    self.expect(Token::CloseBrace)?;
                    clauses.push(Clause::Optional(inner));
                }
                Some(Token::Keyword(kw)) if kw == "VALUES" => {
                    self.next();
                    clauses.push(self.parse_values()?);
                }
                Some(_) => clauses.push(Clause::Pattern(self.parse_pattern()?)),
                None => return Err(self.error("unterminated WHERE block")),
            }
        }
    }
}

/// Parse a query in the subset grammar
pub fn parse(query_text: &str) -> Result<Query> {
    let tokens = lex(query_text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        query: query_text,
    };

    parser.expect_keyword("SELECT")?;
    let mut select = Vec::new();
    while let Some(Token::Var(_)) = parser.peek() {
        select.push(parser.parse_var()?);
    }
    if select.is_empty() {
        return Err(parser.error("SELECT needs at least one variable"));
    }

    parser.expect_keyword("WHERE")?;
    parser.expect(Token::OpenBrace)?;
    let clauses = parser.parse_where_body()?;

    let mut order_by = Vec::new();
    if let Some(Token::Keyword(kw)) = parser.peek() {
        if kw == "ORDER" {
            parser.next();
            parser.expect_keyword("BY")?;
            while let Some(Token::Var(_)) = parser.peek() {
                order_by.push(parser.parse_var()?);
            }
        }
    }

    if parser.peek().is_some() {
        return Err(parser.error("trailing tokens after query"));
    }

    let query = Query {
        select,
        clauses,
        order_by,
    };
    check_variables(&query, query_text)?;
    Ok(query)
}

fn check_variables(query: &Query, query_text: &str) -> Result<()> {
    let mut known: Vec<&str> = Vec::new();
    for clause in &query.clauses {
        match clause {
            Clause::Pattern(p) => {
                known.extend(p.subject.var());
                known.extend(p.predicate.var());
                known.extend(p.object.var());
            }
            Clause::Optional(patterns) => {
                for p in patterns {
                    known.extend(p.subject.var());
                    known.extend(p.predicate.var());
                    known.extend(p.object.var());
                }
            }
            Clause::Values { vars, .. } => known.extend(vars.iter().map(|v| v.as_str())),
        }
    }
    for var in query.select.iter().chain(query.order_by.iter()) {
        if !known.contains(&var.as_str()) {
            return Err(StoreError::UnknownVariable {
                variable: var.clone(),
                query: query_text.to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

type Solution = BTreeMap<String, Term>;

fn instantiate(pattern: &PatternClause, solution: &Solution) -> Option<TriplePattern> {
    let mut tp = TriplePattern::any().with_context(ContextMatch::Any);
    match &pattern.subject {
        VarOrTerm::Term(t) => tp.subject = Some(t.clone()),
        VarOrTerm::Var(v) => tp.subject = solution.get(v).cloned(),
    }
    match &pattern.predicate {
        VarOrTerm::Term(Term::Iri(iri)) => tp.predicate = Some(iri.clone()),
        VarOrTerm::Term(_) => return None,
        VarOrTerm::Var(v) => {
            tp.predicate = match solution.get(v) {
                Some(Term::Iri(iri)) => Some(iri.clone()),
                Some(_) => return None,
                None => None,
            }
        }
    }
    match &pattern.object {
        VarOrTerm::Term(t) => tp.object = Some(t.clone()),
        VarOrTerm::Var(v) => tp.object = solution.get(v).cloned(),
    }
    Some(tp)
}

fn extend_with_match(
    pattern: &PatternClause,
    solution: &Solution,
    triple: &shacl_model::Triple,
) -> Option<Solution> {
    let mut extended = solution.clone();
    let mut bind = |slot: &VarOrTerm, value: Term| -> bool {
        match slot {
            VarOrTerm::Var(v) => match extended.get(v) {
                Some(existing) => existing == &value,
                None => {
                    extended.insert(v.clone(), value);
                    true
                }
            },
            VarOrTerm::Term(_) => true,
        }
    };
    if !bind(&pattern.subject, triple.subject.clone()) {
        return None;
    }
    if !bind(&pattern.predicate, Term::Iri(triple.predicate.clone())) {
        return None;
    }
    if !bind(&pattern.object, triple.object.clone()) {
        return None;
    }
    Some(extended)
}

fn match_patterns<R: SailReader + ?Sized>(
    reader: &R,
    patterns: &[PatternClause],
    start: &Solution,
) -> Vec<Solution> {
    let mut solutions = vec![start.clone()];
    for pattern in patterns {
        let mut next = Vec::new();
        for solution in &solutions {
            let Some(tp) = instantiate(pattern, solution) else {
                continue;
            };
            for triple in reader.triples(&tp) {
                if let Some(extended) = extend_with_match(pattern, solution, &triple) {
                    next.push(extended);
                }
            }
        }
        solutions = next;
        if solutions.is_empty() {
            break;
        }
    }
    solutions
}

/// Evaluate a parsed query over a reader
pub fn evaluate<R: SailReader + ?Sized>(reader: &R, query: &Query) -> Result<Vec<Row>> {
    let mut solutions: Vec<Solution> = vec![Solution::new()];

    for clause in &query.clauses {
        match clause {
            Clause::Pattern(pattern) => {
                let mut next = Vec::new();
                for solution in &solutions {
                    next.extend(match_patterns(reader, std::slice::from_ref(pattern), solution));
                }
                solutions = next;
            }
            Clause::Optional(patterns) => {
                let mut next = Vec::new();
                for solution in &solutions {
                    let matched = match_patterns(reader, patterns, solution);
                    if matched.is_empty() {
                        next.push(solution.clone());
                    } else {
                        next.extend(matched);
                    }
                }
                solutions = next;
            }
            Clause::Values { vars, rows } => {
                let mut next = Vec::new();
                for solution in &solutions {
                    for row in rows {
                        let mut merged = solution.clone();
                        let mut compatible = true;
                        for (var, cell) in vars.iter().zip(row) {
                            let Some(term) = cell else {
                                continue; // UNDEF is compatible with anything
                            };
                            match merged.get(var) {
                                Some(existing) if existing != term => {
                                    compatible = false;
                                    break;
                                }
                                Some(_) => {}
                                None => {
                                    merged.insert(var.clone(), term.clone());
                                }
                            }
                        }
                        if compatible {
                            next.push(merged);
                        }
                    }
                }
                solutions = next;
            }
        }
        if solutions.is_empty() {
            break;
        }
    }

    if !query.order_by.is_empty() {
        solutions.sort_by(|a, b| {
            for var in &query.order_by {
                let ord = match (a.get(var), b.get(var)) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(x), Some(y)) => term_cmp(x, y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    Ok(solutions
        .into_iter()
        .map(|solution| {
            let mut row = Row::new();
            for var in &query.select {
                if let Some(term) = solution.get(var) {
                    row.bind(var.clone(), term.clone());
                }
            }
            row
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySail;
    use shacl_model::{Iri, Triple};

    fn sail() -> MemorySail {
        let mut sail = MemorySail::new();
        sail.add(Triple::new(
            Term::iri("http://ex/alice"),
            Iri::new("http://ex/knows"),
            Term::iri("http://ex/bob"),
        ));
        sail.add(Triple::new(
            Term::iri("http://ex/alice"),
            Iri::new("http://ex/knows"),
            Term::iri("http://ex/carol"),
        ));
        sail.add(Triple::new(
            Term::iri("http://ex/bob"),
            Iri::new("http://ex/age"),
            Term::typed("30", shacl_model::vocab::xsd::INTEGER),
        ));
        sail
    }

    #[test]
    fn basic_pattern_with_order() {
        let rows = sail()
            .evaluate("SELECT ?a ?b WHERE { ?a <http://ex/knows> ?b . } ORDER BY ?a ?b")
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("b"), Some(&Term::iri("http://ex/bob")));
        assert_eq!(rows[1].get("b"), Some(&Term::iri("http://ex/carol")));
    }

    #[test]
    fn join_over_two_patterns() {
        let rows = sail()
            .evaluate(
                "SELECT ?a ?n WHERE { ?a <http://ex/knows> ?b . ?b <http://ex/age> ?n . }",
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&Term::iri("http://ex/alice")));
    }

    #[test]
    fn optional_keeps_unmatched_solutions() {
        let rows = sail()
            .evaluate(
                "SELECT ?b ?n WHERE { ?a <http://ex/knows> ?b . \
                 OPTIONAL { ?b <http://ex/age> ?n . } } ORDER BY ?b",
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_bound("n"));
        assert!(!rows[1].is_bound("n"));
    }

    #[test]
    fn values_injection_round_trip() {
        let template = format!(
            "SELECT ?a ?b WHERE {{ {BINDING_INJECTION_MARKER} ?a <http://ex/knows> ?b . }} ORDER BY ?b"
        );
        let injected = inject_bindings(
            &template,
            &["a"],
            &[vec![Term::iri("http://ex/alice")], vec![Term::iri("http://ex/nobody")]],
        );
        let rows = sail().evaluate(&injected).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn uninjected_marker_is_fatal_with_query_attached() {
        let template =
            format!("SELECT ?a WHERE {{ {BINDING_INJECTION_MARKER} ?a <http://ex/p> ?b . }}");
        let err = sail().evaluate(&template).unwrap_err();
        match err {
            StoreError::MalformedQuery { query, .. } => assert!(query.contains("SELECT")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_select_variable_is_rejected() {
        let err = sail()
            .evaluate("SELECT ?missing WHERE { ?a <http://ex/knows> ?b . }")
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownVariable { .. }));
    }

    #[test]
    fn literal_terms_survive_round_trip() {
        let term = Term::typed("30", shacl_model::vocab::xsd::INTEGER);
        let text = term_to_query_text(&term);
        let query = format!("SELECT ?a WHERE {{ ?a <http://ex/age> {text} . }}");
        let rows = sail().evaluate(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&Term::iri("http://ex/bob")));
    }
}
