use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::{arity, text_arg, Motor, MESSAGE_NAMESPACE};
use crate::atom::{quote, Atom};
use crate::error::Result;
use crate::notice::{BoutNotice, MessageNotice};
use crate::numbers::Numbers;
use crate::term::{BoxTerm, NeverTerm, NumbersTerm};
use crate::triples::{Object, Triples};

lazy_static! {
    // declarations, processing instructions, comments and doctypes before the root element
    static ref PROLOG: Regex =
        Regex::new(r"^(?s)(?:\s*(?:<\?.*?\?>|<!--.*?-->|<!DOCTYPE[^>]*>))*\s*").unwrap();
    static ref ROOT: Regex = Regex::new(
        r#"^<(?:([A-Za-z_][\w.\-]*):)?[A-Za-z_][\w.\-]*((?:\s+[^\s=/>]+\s*=\s*(?:"[^"]*"|'[^']*'))*)\s*/?>"#
    )
    .unwrap();
    static ref ATTRIBUTE: Regex = Regex::new(r#"([^\s=/>]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
}

/// Namespace URI of the root element when `text` is an XML document,
/// that is when it starts with `<`.
pub fn namespace(text: &str) -> Option<String> {
    if !text.starts_with('<') {
        return None;
    }
    let body = &text[PROLOG.find(text).map_or(0, |m| m.end())..];
    let root = ROOT.captures(body)?;
    let wanted = match root.get(1) {
        Some(prefix) => format!("xmlns:{}", prefix.as_str()),
        None => "xmlns".to_string(),
    };
    let attributes = root.get(2).map_or("", |m| m.as_str());
    ATTRIBUTE
        .captures_iter(attributes)
        .find(|a| a[1] == wanted)
        .and_then(|a| a.get(2).or_else(|| a.get(3)))
        .map(|value| unescape(value.as_str()))
        .filter(|uri| !uri.is_empty())
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Indexes XML messages by the namespace of their root element, owner of `ns`.
pub struct NamespacesMotor {
    triples: Arc<dyn Triples>,
}

impl NamespacesMotor {
    pub fn new(triples: Arc<dyn Triples>) -> Self {
        Self { triples }
    }
}

impl Motor for NamespacesMotor {
    fn name(&self) -> &'static str {
        "namespaces"
    }

    fn operators(&self) -> &'static [&'static str] {
        &["ns"]
    }

    fn build(&self, name: &str, args: &[Atom], _universe: &Arc<Numbers>) -> Result<BoxTerm> {
        arity(name, args, 1, 1)?;
        let urn = text_arg(name, args, 0)?;
        let messages = self.triples.reverse(MESSAGE_NAMESPACE, &Object::Text(urn.to_string()))?;
        if messages.is_empty() {
            return Ok(Box::new(NeverTerm));
        }
        Ok(Box::new(NumbersTerm::new(format!("(ns {})", quote(urn)), messages)))
    }

    fn see_message(&self, notice: &MessageNotice) -> Result<()> {
        let message = notice.message();
        let found = namespace(message.text());
        if found.is_none() && message.text().starts_with('<') {
            tracing::warn!(number = message.number(), "xml message without a root namespace");
        }
        let objects: Vec<Object> = found.into_iter().map(Object::Text).collect();
        self.triples.replace(message.number(), MESSAGE_NAMESPACE, &objects)
    }

    fn see_bout(&self, _notice: &BoutNotice) -> Result<()> {
        Ok(())
    }
}
