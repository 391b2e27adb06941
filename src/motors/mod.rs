//! Motors keep the index up to date and turn the operators they own into terms.
//!
//! Every motor reads and writes the shared [`Triples`]; the relation names
//! below are the contract between them.

use std::sync::Arc;

use crate::atom::Atom;
use crate::error::{InfinityError, Result};
use crate::notice::{BoutNotice, MessageNotice};
use crate::numbers::{Number, Numbers};
use crate::term::BoxTerm;
use crate::triples::Triples;

mod bundles;
mod fields;
mod pages;
mod participants;
mod text;
mod xml;

pub use bundles::{BundledTerm, BundlesMotor, UniqueTerm};
pub use fields::FieldsMotor;
pub use pages::{FromTerm, LimitTerm, PagesMotor};
pub use participants::ParticipantsMotor;
pub use text::{words, TextMotor};
pub use xml::{namespace, NamespacesMotor};

/// message number → bout number
pub const MESSAGE_TO_BOUT: &str = "message-to-bout";
/// message number → author urn
pub const MESSAGE_AUTHOR: &str = "message-author";
/// bout number → participant urn
pub const BOUT_TO_PARTICIPANT: &str = "bout-to-participant";
/// bout number → sorted participant urns
pub const BOUT_TO_MARKER: &str = "bout-to-marker";
/// message number → normalized word of its text
pub const TEXT_WORD: &str = "text-word";
/// message number → normalized word of its bout title
pub const TITLE_WORD: &str = "title-word";
/// bout number → latest title
pub const BOUT_TITLE: &str = "bout-title";
/// message number → namespace URI of its XML root element
pub const MESSAGE_NAMESPACE: &str = "message-namespace";

pub trait Motor: Send + Sync {
    fn name(&self) -> &'static str;
    /// Operator names this motor builds terms for.
    fn operators(&self) -> &'static [&'static str];
    fn points_to(&self, name: &str) -> bool {
        self.operators().contains(&name)
    }
    fn build(&self, name: &str, args: &[Atom], universe: &Arc<Numbers>) -> Result<BoxTerm>;
    /// Must leave the same state when the same notice is seen again.
    fn see_message(&self, notice: &MessageNotice) -> Result<()>;
    fn see_bout(&self, notice: &BoutNotice) -> Result<()>;
}

/// The motors an engine runs unless told otherwise, in registry order.
pub fn defaults(triples: Arc<dyn Triples>) -> Vec<Arc<dyn Motor>> {
    vec![
        Arc::new(TextMotor::new(Arc::clone(&triples))),
        Arc::new(ParticipantsMotor::new(Arc::clone(&triples))),
        Arc::new(FieldsMotor::new(Arc::clone(&triples))),
        Arc::new(BundlesMotor::new(Arc::clone(&triples))),
        Arc::new(NamespacesMotor::new(Arc::clone(&triples))),
        Arc::new(PagesMotor::new()),
    ]
}

// ------------- Argument checks -------------

pub(crate) fn arity(op: &str, args: &[Atom], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(InfinityError::Construction(format!(
            "{op}: expected {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn text_arg<'a>(op: &str, args: &'a [Atom], index: usize) -> Result<&'a str> {
    match args.get(index) {
        Some(Atom::Text(t)) => Ok(t),
        Some(other) => Err(InfinityError::Construction(format!(
            "{op}: argument {} must be text, got {} {other}",
            index + 1,
            other.kind()
        ))),
        None => Err(InfinityError::Construction(format!("{op}: missing argument {}", index + 1))),
    }
}

pub(crate) fn number_arg(op: &str, args: &[Atom], index: usize) -> Result<Number> {
    match args.get(index) {
        Some(Atom::Number(n)) => Ok(*n),
        Some(other) => Err(InfinityError::Construction(format!(
            "{op}: argument {} must be a number, got {} {other}",
            index + 1,
            other.kind()
        ))),
        None => Err(InfinityError::Construction(format!("{op}: missing argument {}", index + 1))),
    }
}

pub(crate) fn variable_arg<'a>(op: &str, args: &'a [Atom], index: usize) -> Result<&'a str> {
    match args.get(index) {
        Some(Atom::Variable(v)) => Ok(v),
        Some(other) => Err(InfinityError::Construction(format!(
            "{op}: argument {} must be a variable, got {} {other}",
            index + 1,
            other.kind()
        ))),
        None => Err(InfinityError::Construction(format!("{op}: missing argument {}", index + 1))),
    }
}

pub(crate) fn unsupported_variable(op: &str, variable: &str) -> InfinityError {
    InfinityError::Construction(format!("{op}: unsupported variable ${variable}"))
}
