//! Query text → [`Atom`] tree → [`Term`](crate::term::Term) tree.
//!
//! The compiler knows the boolean algebra (`and`, `or`, `not`, `always`,
//! `never`) itself and hands every other operator to the motor that owns
//! it. Ownership is resolved once, when the compiler is built: motors are
//! consulted in the order given and the first one pointing to a name wins.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use pest::Parser;
use pest::iterators::Pair;
use seahash::SeaHasher;

use crate::atom::{quote, Atom};
use crate::error::{InfinityError, Result};
use crate::motors::Motor;
use crate::numbers::Numbers;
use crate::term::{AlwaysTerm, AndTerm, BoxTerm, NeverTerm, NotTerm, OrTerm};

#[derive(pest_derive::Parser)]
#[grammar = "query.pest"]
struct QueryParser;

const CORE: [&str; 5] = ["and", "or", "not", "always", "never"];

/// Parses a parenthesized query into its atom tree.
pub fn parse(text: &str) -> Result<Atom> {
    let mut pairs = QueryParser::parse(Rule::query, text).map_err(|e| {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        InfinityError::Parse {
            message: e.variant.message().to_string(),
            line: Some(line),
            col: Some(col),
        }
    })?;
    let predicate = pairs
        .next()
        .and_then(|query| query.into_inner().next())
        .ok_or_else(|| InfinityError::Parse {
            message: "empty query".into(),
            line: None,
            col: None,
        })?;
    atom(predicate)
}

fn atom(pair: Pair<Rule>) -> Result<Atom> {
    let (line, col) = pair.as_span().start_pos().line_col();
    let fail = |message: String| InfinityError::Parse { message, line: Some(line), col: Some(col) };
    match pair.as_rule() {
        Rule::predicate => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .map(|p| p.as_str().to_string())
                .ok_or_else(|| fail("missing operator".into()))?;
            let args = inner.map(atom).collect::<Result<Vec<Atom>>>()?;
            Ok(Atom::Predicate { name, args })
        }
        Rule::number => pair
            .as_str()
            .parse::<u64>()
            .map(Atom::Number)
            .map_err(|e| fail(format!("invalid number {}: {e}", pair.as_str()))),
        Rule::text => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Atom::Text(unescape(raw)))
        }
        Rule::variable => {
            let field = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Atom::Variable(field.to_string()))
        }
        other => Err(fail(format!("unexpected {other:?}"))),
    }
}

fn unescape(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                text.push(escaped);
            }
        } else {
            text.push(c);
        }
    }
    text
}

/// Turns free text into a search over message texts and bout titles;
/// parenthesized queries pass through unchanged.
pub fn normalize(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "(always)".to_string()
    } else if trimmed.starts_with('(') {
        trimmed.to_string()
    } else {
        let q = quote(trimmed);
        format!("(or (matches {q} $text) (matches {q} $bout.title))")
    }
}

type MotorHasher = BuildHasherDefault<SeaHasher>;

pub struct Compiler {
    registry: HashMap<String, Arc<dyn Motor>, MotorHasher>,
}

impl Compiler {
    pub fn new(motors: &[Arc<dyn Motor>]) -> Self {
        let mut registry: HashMap<String, Arc<dyn Motor>, MotorHasher> = HashMap::default();
        for motor in motors {
            for &op in motor.operators() {
                if CORE.contains(&op) {
                    tracing::warn!(motor = motor.name(), op, "motor can't take over a core operator");
                    continue;
                }
                match registry.get(op) {
                    Some(owner) => tracing::warn!(
                        motor = motor.name(),
                        owner = owner.name(),
                        op,
                        "operator already owned"
                    ),
                    None => {
                        registry.insert(op.to_string(), Arc::clone(motor));
                    }
                }
            }
        }
        Self { registry }
    }

    /// Operator names, core ones included, sorted.
    pub fn operators(&self) -> Vec<String> {
        let mut names: Vec<String> = CORE.iter().map(|s| s.to_string()).collect();
        names.extend(self.registry.keys().cloned());
        names.sort();
        names
    }

    /// Name of the motor owning `op`.
    pub fn owner(&self, op: &str) -> Option<&'static str> {
        self.registry.get(op).map(|m| m.name())
    }

    pub fn compile(&self, text: &str, universe: &Arc<Numbers>) -> Result<BoxTerm> {
        let atom = parse(&normalize(text))?;
        let term = self.build(&atom, universe)?;
        let term: BoxTerm = if term.volatile() {
            Box::new(AndTerm::new(universe, vec![term])?)
        } else {
            term
        };
        tracing::debug!(query = text, term = %term, "query compiled");
        Ok(term)
    }

    pub fn build(&self, atom: &Atom, universe: &Arc<Numbers>) -> Result<BoxTerm> {
        let Atom::Predicate { name, args } = atom else {
            return Err(InfinityError::Construction(format!(
                "{} {atom} is not a predicate",
                atom.kind()
            )));
        };
        match name.as_str() {
            "and" => Ok(Box::new(AndTerm::new(universe, self.children(args, universe)?)?)),
            "or" => Ok(Box::new(OrTerm::new(self.children(args, universe)?)?)),
            "not" => {
                if args.len() != 1 {
                    return Err(InfinityError::Construction(format!(
                        "not: expected 1 argument(s), got {}",
                        args.len()
                    )));
                }
                Ok(Box::new(NotTerm::new(universe, self.build(&args[0], universe)?)?))
            }
            "always" | "never" => {
                if !args.is_empty() {
                    return Err(InfinityError::Construction(format!(
                        "{name}: expected 0 argument(s), got {}",
                        args.len()
                    )));
                }
                if name == "always" {
                    Ok(Box::new(AlwaysTerm::new(universe)))
                } else {
                    Ok(Box::new(NeverTerm))
                }
            }
            other => match self.registry.get(other) {
                Some(motor) => motor.build(other, args, universe),
                None => Err(InfinityError::Construction(format!("unsupported operator '{other}'"))),
            },
        }
    }

    fn children(&self, args: &[Atom], universe: &Arc<Numbers>) -> Result<Vec<BoxTerm>> {
        args.iter().map(|a| self.build(a, universe)).collect()
    }
}
