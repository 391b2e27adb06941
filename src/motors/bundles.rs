use std::collections::HashSet;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use seahash::SeaHasher;

use super::{
    arity, unsupported_variable, variable_arg, Motor, BOUT_TO_MARKER, MESSAGE_AUTHOR,
    MESSAGE_TO_BOUT,
};
use crate::atom::Atom;
use crate::error::Result;
use crate::lattice::Lattice;
use crate::notice::{Bout, BoutNotice, MessageNotice};
use crate::numbers::{Number, Numbers};
use crate::term::{Admission, BoxTerm, Term};
use crate::triples::{Object, ObjectHasher, Triples};

type MarkerHasher = BuildHasherDefault<SeaHasher>;

/// Groups bouts by their set of participants, owner of `bundled` and `unique`.
///
/// Reads `message-to-bout` as kept by the participants motor, and
/// `message-author` as kept by the fields motor.
pub struct BundlesMotor {
    triples: Arc<dyn Triples>,
}

impl BundlesMotor {
    pub fn new(triples: Arc<dyn Triples>) -> Self {
        Self { triples }
    }

    fn mark(&self, bout: &Bout) -> Result<()> {
        self.triples.replace(bout.number(), BOUT_TO_MARKER, &[Object::Text(bout.marker())])
    }
}

impl Motor for BundlesMotor {
    fn name(&self) -> &'static str {
        "bundles"
    }

    fn operators(&self) -> &'static [&'static str] {
        &["bundled", "unique"]
    }

    fn build(&self, name: &str, args: &[Atom], _universe: &Arc<Numbers>) -> Result<BoxTerm> {
        let triples = Arc::clone(&self.triples);
        if name == "unique" {
            arity(name, args, 1, 1)?;
            let variable = variable_arg(name, args, 0)?;
            let relation = match variable {
                "bout.number" => MESSAGE_TO_BOUT,
                "author.name" => MESSAGE_AUTHOR,
                other => return Err(unsupported_variable(name, other)),
            };
            let variable = variable.to_string();
            let seen = HashSet::default();
            return Ok(Box::new(UniqueTerm { triples, relation, variable, seen }));
        }
        arity(name, args, 0, 0)?;
        Ok(Box::new(BundledTerm { triples, seen: HashSet::default() }))
    }

    fn see_message(&self, notice: &MessageNotice) -> Result<()> {
        let bout = notice.bout();
        self.triples.seed(bout.number(), BOUT_TO_MARKER, &[Object::Text(bout.marker())])?;
        Ok(())
    }

    fn see_bout(&self, notice: &BoutNotice) -> Result<()> {
        self.mark(notice.bout())
    }
}

/// Lets through only the first (most recent) message of every bundle.
pub struct BundledTerm {
    triples: Arc<dyn Triples>,
    seen: HashSet<String, MarkerHasher>,
}

impl BundledTerm {
    fn marker(&self, number: Number) -> Result<Option<String>> {
        let bout = self.triples.get(number, MESSAGE_TO_BOUT)?;
        let Some(bout) = bout.and_then(|o| o.as_number()) else {
            return Ok(None);
        };
        Ok(self
            .triples
            .get(bout, BOUT_TO_MARKER)?
            .and_then(|o| o.as_text().map(str::to_string)))
    }
}

impl fmt::Display for BundledTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(BUNDLED)")
    }
}

impl Term for BundledTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        cursor.saturating_sub(1)
    }
    fn contains(&self, _number: Number) -> bool {
        true
    }
    fn lattice(&self) -> Lattice {
        Lattice::always()
    }
    fn volatile(&self) -> bool {
        true
    }
    fn admit(&mut self, number: Number) -> Admission {
        match self.marker(number) {
            Ok(Some(marker)) => {
                if self.seen.insert(marker) {
                    Admission::Accept
                } else {
                    Admission::Reject
                }
            }
            Ok(None) => Admission::Accept,
            Err(e) => {
                tracing::warn!(number, error = %e, "bundle lookup failed");
                Admission::Reject
            }
        }
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        vec![self]
    }
}

/// Lets through only the first (most recent) message per value of a variable,
/// e.g. the latest message of every author with `(unique $author.name)`.
pub struct UniqueTerm {
    triples: Arc<dyn Triples>,
    relation: &'static str,
    variable: String,
    seen: HashSet<Object, ObjectHasher>,
}

impl fmt::Display for UniqueTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(UNIQUE ${})", self.variable)
    }
}

impl Term for UniqueTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        cursor.saturating_sub(1)
    }
    fn contains(&self, _number: Number) -> bool {
        true
    }
    fn lattice(&self) -> Lattice {
        Lattice::always()
    }
    fn volatile(&self) -> bool {
        true
    }
    fn admit(&mut self, number: Number) -> Admission {
        match self.triples.get(number, self.relation) {
            Ok(Some(value)) => {
                if self.seen.insert(value) {
                    Admission::Accept
                } else {
                    Admission::Reject
                }
            }
            Ok(None) => Admission::Accept,
            Err(e) => {
                let relation = self.relation;
                tracing::warn!(number, relation, error = %e, "unique lookup failed");
                Admission::Reject
            }
        }
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        vec![self]
    }
}
