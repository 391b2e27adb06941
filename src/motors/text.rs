use std::collections::BTreeSet;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::{
    arity, text_arg, unsupported_variable, variable_arg, Motor, BOUT_TITLE, MESSAGE_TO_BOUT,
    TEXT_WORD, TITLE_WORD,
};
use crate::atom::Atom;
use crate::error::Result;
use crate::notice::{BoutNotice, MessageNotice};
use crate::numbers::Numbers;
use crate::term::{AlwaysTerm, AndTerm, BoxTerm, NeverTerm, NumbersTerm};
use crate::triples::{Object, Triples};

lazy_static! {
    static ref PUNCTUATION: Regex = Regex::new(r#"['"!@#$%?^&*(),.\[\]=+/]+"#).unwrap();
}

/// Normalized words of `text`: punctuation becomes space, everything is
/// upper-cased and words of one or two characters are dropped.
pub fn words(text: &str) -> BTreeSet<String> {
    PUNCTUATION
        .replace_all(text, " ")
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .map(str::to_uppercase)
        .collect()
}

/// Word index over message texts and bout titles, owner of `matches`.
pub struct TextMotor {
    triples: Arc<dyn Triples>,
}

impl TextMotor {
    pub fn new(triples: Arc<dyn Triples>) -> Self {
        Self { triples }
    }

    fn relation(variable: Option<&str>) -> Result<&'static str> {
        match variable {
            None | Some("text") => Ok(TEXT_WORD),
            Some("bout.title") => Ok(TITLE_WORD),
            Some(other) => Err(unsupported_variable("matches", other)),
        }
    }

    fn index_title(&self, message: u64, title: &str) -> Result<()> {
        let words: Vec<Object> = words(title).into_iter().map(Object::Text).collect();
        self.triples.replace(message, TITLE_WORD, &words)
    }
}

impl Motor for TextMotor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn operators(&self) -> &'static [&'static str] {
        &["matches"]
    }

    fn build(&self, name: &str, args: &[Atom], universe: &Arc<Numbers>) -> Result<BoxTerm> {
        arity(name, args, 1, 2)?;
        let text = text_arg(name, args, 0)?;
        let variable = if args.len() > 1 {
            Some(variable_arg(name, args, 1)?)
        } else {
            None
        };
        let relation = Self::relation(variable)?;
        let words = words(text);
        if words.is_empty() {
            return Ok(Box::new(AlwaysTerm::new(universe)));
        }
        let mut terms: Vec<BoxTerm> = Vec::with_capacity(words.len());
        for word in words {
            let numbers = self.triples.reverse(relation, &Object::Text(word.clone()))?;
            if numbers.is_empty() {
                tracing::debug!(word = %word, relation, "word is not indexed");
                return Ok(Box::new(NeverTerm));
            }
            terms.push(Box::new(NumbersTerm::new(format!("(matches {word})"), numbers)));
        }
        if terms.len() == 1 {
            return Ok(terms.remove(0));
        }
        Ok(Box::new(AndTerm::new(universe, terms)?))
    }

    fn see_message(&self, notice: &MessageNotice) -> Result<()> {
        let number = notice.message().number();
        let text: Vec<Object> =
            words(notice.message().text()).into_iter().map(Object::Text).collect();
        self.triples.replace(number, TEXT_WORD, &text)?;
        // the title of a newer bout notice wins over the one carried here
        let bout = notice.bout();
        let carried = Object::Text(bout.title().to_string());
        self.triples.seed(bout.number(), BOUT_TITLE, std::slice::from_ref(&carried))?;
        let title = self.triples.get(bout.number(), BOUT_TITLE)?.unwrap_or(carried);
        self.index_title(number, title.as_text().unwrap_or_default())
    }

    fn see_bout(&self, notice: &BoutNotice) -> Result<()> {
        let bout = notice.bout();
        let title = Object::Text(bout.title().to_string());
        self.triples.replace(bout.number(), BOUT_TITLE, std::slice::from_ref(&title))?;
        let messages = self.triples.reverse(MESSAGE_TO_BOUT, &Object::Number(bout.number()))?;
        for message in messages.iter() {
            self.index_title(message, bout.title())?;
        }
        Ok(())
    }
}
