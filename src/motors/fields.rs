use std::sync::Arc;

use super::{
    arity, number_arg, text_arg, unsupported_variable, variable_arg, Motor, MESSAGE_AUTHOR,
    MESSAGE_TO_BOUT,
};
use crate::atom::Atom;
use crate::error::Result;
use crate::notice::{BoutNotice, MessageNotice};
use crate::numbers::Numbers;
use crate::term::{BoxTerm, NeverTerm, NumbersTerm};
use crate::triples::{Object, Triples};

/// Exact matches on message fields, owner of `equal`:
/// `(equal $number 42)`, `(equal $bout.number 7)`, `(equal $author.name 'urn:x')`.
pub struct FieldsMotor {
    triples: Arc<dyn Triples>,
}

impl FieldsMotor {
    pub fn new(triples: Arc<dyn Triples>) -> Self {
        Self { triples }
    }
}

impl Motor for FieldsMotor {
    fn name(&self) -> &'static str {
        "fields"
    }

    fn operators(&self) -> &'static [&'static str] {
        &["equal"]
    }

    fn build(&self, name: &str, args: &[Atom], universe: &Arc<Numbers>) -> Result<BoxTerm> {
        arity(name, args, 2, 2)?;
        let variable = variable_arg(name, args, 0)?;
        let label = format!("({name} ${variable} {})", args[1]);
        let numbers = match variable {
            "number" => {
                let number = number_arg(name, args, 1)?;
                if !universe.contains(number) {
                    return Ok(Box::new(NeverTerm));
                }
                let single = Numbers::new();
                single.add(number)?;
                Arc::new(single)
            }
            "bout.number" => {
                let bout = number_arg(name, args, 1)?;
                self.triples.reverse(MESSAGE_TO_BOUT, &Object::Number(bout))?
            }
            "author.name" => {
                let urn = text_arg(name, args, 1)?;
                self.triples.reverse(MESSAGE_AUTHOR, &Object::Text(urn.to_string()))?
            }
            other => return Err(unsupported_variable(name, other)),
        };
        Ok(Box::new(NumbersTerm::new(label, numbers)))
    }

    fn see_message(&self, notice: &MessageNotice) -> Result<()> {
        let message = notice.message();
        let author = Object::Text(message.author().to_string());
        self.triples.replace(message.number(), MESSAGE_AUTHOR, &[author])
    }

    fn see_bout(&self, _notice: &BoutNotice) -> Result<()> {
        Ok(())
    }
}
