use std::sync::Arc;

use super::{arity, text_arg, Motor, BOUT_TO_PARTICIPANT, MESSAGE_TO_BOUT};
use crate::atom::{quote, Atom};
use crate::error::Result;
use crate::notice::{Bout, BoutNotice, MessageNotice};
use crate::numbers::Numbers;
use crate::term::{BoxTerm, NeverTerm, NumbersTerm, OrTerm};
use crate::triples::{Object, Triples};

/// Who takes part in which bout, and which bout holds which message.
///
/// Owner of `talks-with`. The `message-to-bout` relation it keeps is also
/// read by the other motors.
pub struct ParticipantsMotor {
    triples: Arc<dyn Triples>,
}

impl ParticipantsMotor {
    pub fn new(triples: Arc<dyn Triples>) -> Self {
        Self { triples }
    }

    fn urns(bout: &Bout) -> Vec<Object> {
        bout.participants().iter().map(|p| Object::Text(p.urn().to_string())).collect()
    }
}

impl Motor for ParticipantsMotor {
    fn name(&self) -> &'static str {
        "participants"
    }

    fn operators(&self) -> &'static [&'static str] {
        &["talks-with"]
    }

    fn build(&self, name: &str, args: &[Atom], _universe: &Arc<Numbers>) -> Result<BoxTerm> {
        arity(name, args, 1, 1)?;
        let urn = text_arg(name, args, 0)?;
        let bouts = self.triples.reverse(BOUT_TO_PARTICIPANT, &Object::Text(urn.to_string()))?;
        let mut terms: Vec<BoxTerm> = Vec::new();
        for bout in bouts.iter() {
            let messages = self.triples.reverse(MESSAGE_TO_BOUT, &Object::Number(bout))?;
            if !messages.is_empty() {
                let label = format!("(talks-with {} #{bout})", quote(urn));
                terms.push(Box::new(NumbersTerm::new(label, messages)));
            }
        }
        if terms.is_empty() {
            return Ok(Box::new(NeverTerm));
        }
        if terms.len() == 1 {
            return Ok(terms.remove(0));
        }
        Ok(Box::new(OrTerm::new(terms)?))
    }

    fn see_message(&self, notice: &MessageNotice) -> Result<()> {
        let number = notice.message().number();
        let bout = notice.bout().number();
        self.triples.replace(number, MESSAGE_TO_BOUT, &[Object::Number(bout)])?;
        // the message may overtake the notice of its bout, but must not undo a newer one
        self.triples.seed(bout, BOUT_TO_PARTICIPANT, &Self::urns(notice.bout()))?;
        Ok(())
    }

    fn see_bout(&self, notice: &BoutNotice) -> Result<()> {
        let bout = notice.bout();
        self.triples.replace(bout.number(), BOUT_TO_PARTICIPANT, &Self::urns(bout))
    }
}
