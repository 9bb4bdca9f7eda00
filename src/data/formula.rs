//! Design formulas with crossing and nesting operators.

use crate::error::{PermivarError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single model term: an ordered set of factor names, named by joining
/// them with `:` (a one-factor term is a main effect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    pub factors: Vec<String>,
}

impl Term {
    fn from_factors(factors: Vec<String>) -> Self {
        let name = factors.join(":");
        Self { name, factors }
    }

    /// Interaction order (number of factors).
    pub fn order(&self) -> usize {
        self.factors.len()
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A parsed design formula over categorical factors.
///
/// Supported operators, loosest-binding first:
/// - `A + B` — both terms
/// - `A * B` — `A + B + A:B` (crossing)
/// - `A / B` — `A + A:B` (nesting; the full left-hand factor set is
///   carried into the nested interaction, so `(a+b)/c` is `a + b + a:b:c`)
/// - `A : B` — pure interaction
/// - parentheses for grouping; an optional leading `~` is accepted.
///
/// Expansion preserves first-appearance order and deduplicates terms that
/// contain the same factor set. The resulting term order is exactly the
/// order the analyzer partitions variance in, so callers control the
/// sequential decomposition by how they write the formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignFormula {
    pub terms: Vec<Term>,
    pub formula_str: String,
}

impl DesignFormula {
    /// Parse and expand a formula string.
    pub fn parse(formula: &str) -> Result<Self> {
        let formula_str = formula.to_string();
        let trimmed = formula.trim().trim_start_matches('~').trim();
        if trimmed.is_empty() {
            return Err(PermivarError::FormulaParse(
                "formula has no terms".to_string(),
            ));
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_sum()?;
        if parser.pos != parser.tokens.len() {
            return Err(PermivarError::FormulaParse(format!(
                "unexpected trailing input near '{}'",
                parser.tokens[parser.pos]
            )));
        }
        let terms = dedup(expr.expand());
        Ok(Self { terms, formula_str })
    }

    /// All distinct factor names used, in first-appearance order.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut vars = Vec::new();
        for term in &self.terms {
            for f in &term.factors {
                if seen.insert(f.as_str()) {
                    vars.push(f.as_str());
                }
            }
        }
        vars
    }

    /// Term names in decomposition order.
    pub fn term_names(&self) -> Vec<&str> {
        self.terms.iter().map(|t| t.name.as_str()).collect()
    }
}

impl std::fmt::Display for DesignFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.terms.iter().map(|t| t.name.as_str()).collect();
        write!(f, "{}", names.join(" + "))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Plus,
    Star,
    Slash,
    Colon,
    Open,
    Close,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Name(n) => write!(f, "{}", n),
            Token::Plus => write!(f, "+"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Colon => write!(f, ":"),
            Token::Open => write!(f, "("),
            Token::Close => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(name));
            }
            other => {
                return Err(PermivarError::FormulaParse(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

/// Formula expression tree: leaves are factors, nodes are operators.
#[derive(Debug, Clone)]
enum Expr {
    Factor(String),
    Sum(Box<Expr>, Box<Expr>),
    Cross(Box<Expr>, Box<Expr>),
    Nest(Box<Expr>, Box<Expr>),
    Interact(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Expand into an ordered list of factor-set terms (not yet deduped).
    fn expand(&self) -> Vec<Vec<String>> {
        match self {
            Expr::Factor(name) => vec![vec![name.clone()]],
            Expr::Sum(l, r) => {
                let mut terms = l.expand();
                terms.extend(r.expand());
                terms
            }
            Expr::Cross(l, r) => {
                let left = l.expand();
                let right = r.expand();
                let mut terms = left.clone();
                terms.extend(right.clone());
                for a in &left {
                    for b in &right {
                        terms.push(union(a, b));
                    }
                }
                terms
            }
            Expr::Interact(l, r) => {
                let left = l.expand();
                let right = r.expand();
                let mut terms = Vec::new();
                for a in &left {
                    for b in &right {
                        terms.push(union(a, b));
                    }
                }
                terms
            }
            Expr::Nest(l, r) => {
                let left = l.expand();
                // Nesting carries every factor of the outer expression
                // into each nested term.
                let mut outer = Vec::new();
                for t in &left {
                    for f in t {
                        if !outer.contains(f) {
                            outer.push(f.clone());
                        }
                    }
                }
                let mut terms = left.clone();
                for b in r.expand() {
                    terms.push(union(&outer, &b));
                }
                terms
            }
        }
    }
}

fn union(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = a.to_vec();
    for f in b {
        if !out.contains(f) {
            out.push(f.clone());
        }
    }
    out
}

fn dedup(raw: Vec<Vec<String>>) -> Vec<Term> {
    let mut seen: Vec<BTreeSet<String>> = Vec::new();
    let mut terms = Vec::new();
    for factors in raw {
        let key: BTreeSet<String> = factors.iter().cloned().collect();
        if !seen.contains(&key) {
            seen.push(key);
            terms.push(Term::from_factors(factors));
        }
    }
    terms
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut left = self.parse_prod()?;
        while self.peek() == Some(&Token::Plus) {
            self.pos += 1;
            let right = self.parse_prod()?;
            left = Expr::Sum(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_prod(&mut self) -> Result<Expr> {
        let mut left = self.parse_interaction()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    let right = self.parse_interaction()?;
                    left = Expr::Cross(Box::new(left), Box::new(right));
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let right = self.parse_interaction()?;
                    left = Expr::Nest(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_interaction(&mut self) -> Result<Expr> {
        let mut left = self.parse_atom()?;
        while self.peek() == Some(&Token::Colon) {
            self.pos += 1;
            let right = self.parse_atom()?;
            left = Expr::Interact(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Name(name)) => {
                self.pos += 1;
                Ok(Expr::Factor(name))
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.parse_sum()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(PermivarError::FormulaParse(
                        "unbalanced parentheses".to_string(),
                    ));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(tok) => Err(PermivarError::FormulaParse(format!(
                "expected a factor name, found '{}'",
                tok
            ))),
            None => Err(PermivarError::FormulaParse(
                "formula ends with a dangling operator".to_string(),
            )),
        }
    }
}
