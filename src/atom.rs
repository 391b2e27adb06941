//! Parsed query literals and sub-expressions.

use std::fmt;

use crate::numbers::Number;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Atom {
    Number(Number),
    Text(String),
    /// A field reference such as `$bout.title`, stored without the `$`.
    Variable(String),
    Predicate { name: String, args: Vec<Atom> },
}

impl Atom {
    pub fn predicate(name: impl Into<String>, args: Vec<Atom>) -> Self {
        Atom::Predicate { name: name.into(), args }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Atom::Number(_) => "number",
            Atom::Text(_) => "text",
            Atom::Variable(_) => "variable",
            Atom::Predicate { .. } => "predicate",
        }
    }
}

/// Quotes `text` the way the query grammar reads it back.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Atom::Number(n) => write!(f, "{n}"),
            Atom::Text(t) => f.write_str(&quote(t)),
            Atom::Variable(v) => write!(f, "${v}"),
            Atom::Predicate { name, args } => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
