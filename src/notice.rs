//! Immutable snapshots of bouts and messages, and their binary form.
//!
//! A notice is what the index learns from: the engine journals it, then
//! hands it to every motor. Reconstructed snapshots expose getters only,
//! so nothing can mutate a notice once it has been read back.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::io::{Read, Write};

use chrono::{DateTime, Utc};

use crate::error::{InfinityError, Result};
use crate::numbers::Number;
use crate::wire;

// ------------- Participant -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Participant {
    urn: String,
    leader: bool,
    confirmed: bool,
}

impl Participant {
    pub fn new(urn: impl Into<String>, leader: bool, confirmed: bool) -> Self {
        Self { urn: urn.into(), leader, confirmed }
    }
    pub fn urn(&self) -> &str {
        &self.urn
    }
    pub fn leader(&self) -> bool {
        self.leader
    }
    pub fn confirmed(&self) -> bool {
        self.confirmed
    }
}

// ------------- Bout -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bout {
    number: Number,
    date: DateTime<Utc>,
    title: String,
    participants: Vec<Participant>,
}

impl Bout {
    /// A participant listed twice is kept once, at its first position.
    pub fn new(
        number: Number,
        date: DateTime<Utc>,
        title: impl Into<String>,
        participants: Vec<Participant>,
    ) -> Self {
        let participants = distinct(participants);
        Self { number, date: truncate(date), title: title.into(), participants }
    }
    pub fn number(&self) -> Number {
        self.number
    }
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }
    /// Participant urns, sorted and joined; bouts sharing it share a bundle.
    pub fn marker(&self) -> String {
        let urns: BTreeSet<&str> = self.participants.iter().map(Participant::urn).collect();
        urns.into_iter().collect::<Vec<_>>().join(" ")
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        wire::write_i64(writer, number(self.number)?)?;
        wire::write_i64(writer, self.date.timestamp_millis())?;
        wire::write_utf(writer, &self.title)?;
        let count = i32::try_from(self.participants.len())
            .map_err(|_| InfinityError::IllegalArgument("too many participants".into()))?;
        wire::write_i32(writer, count)?;
        for participant in &self.participants {
            wire::write_utf(writer, &participant.urn)?;
            wire::write_bool(writer, participant.leader)?;
            wire::write_bool(writer, participant.confirmed)?;
        }
        Ok(())
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let number = positive(wire::read_i64(reader)?)?;
        let date = date(wire::read_i64(reader)?)?;
        let title = wire::read_utf(reader)?;
        let count = wire::read_i32(reader)?;
        if count < 0 {
            return Err(InfinityError::corruption(format!("negative participant count {count}")));
        }
        let mut participants = Vec::new();
        for _ in 0..count {
            let urn = wire::read_utf(reader)?;
            let leader = wire::read_bool(reader)?;
            let confirmed = wire::read_bool(reader)?;
            participants.push(Participant { urn, leader, confirmed });
        }
        Ok(Self { number, date, title, participants: distinct(participants) })
    }
}

fn distinct(participants: Vec<Participant>) -> Vec<Participant> {
    let mut seen = HashSet::with_capacity(participants.len());
    participants.into_iter().filter(|p| seen.insert(p.urn.clone())).collect()
}

// ------------- Message -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    number: Number,
    author: String,
    text: String,
    date: DateTime<Utc>,
}

impl Message {
    pub fn new(
        number: Number,
        author: impl Into<String>,
        text: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self { number, author: author.into(), text: text.into(), date: truncate(date) }
    }
    pub fn number(&self) -> Number {
        self.number
    }
    pub fn author(&self) -> &str {
        &self.author
    }
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        wire::write_i64(writer, number(self.number)?)?;
        wire::write_utf(writer, &self.author)?;
        wire::write_big_text(writer, &self.text)?;
        wire::write_i64(writer, self.date.timestamp_millis())?;
        Ok(())
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let number = positive(wire::read_i64(reader)?)?;
        let author = wire::read_utf(reader)?;
        let text = wire::read_big_text(reader)?;
        let date = date(wire::read_i64(reader)?)?;
        Ok(Self { number, author, text, date })
    }
}

// the wire keeps milliseconds only
fn truncate(date: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(date.timestamp_millis()).unwrap_or(date)
}

fn number(n: Number) -> Result<i64> {
    i64::try_from(n)
        .map_err(|_| InfinityError::IllegalArgument(format!("number {n} is out of range")))
}

fn positive(n: i64) -> Result<Number> {
    if n <= 0 {
        return Err(InfinityError::corruption(format!("invalid number {n}")));
    }
    Ok(n as Number)
}

fn date(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| InfinityError::corruption(format!("invalid date {millis}")))
}

// ------------- Notices -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoutNotice {
    bout: Bout,
}

impl BoutNotice {
    pub fn new(bout: Bout) -> Self {
        Self { bout }
    }
    pub fn bout(&self) -> &Bout {
        &self.bout
    }
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.bout.write(writer)
    }
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self { bout: Bout::read(reader)? })
    }
}

/// A message together with the bout it was posted to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageNotice {
    message: Message,
    bout: Bout,
}

impl MessageNotice {
    pub fn new(message: Message, bout: Bout) -> Self {
        Self { message, bout }
    }
    pub fn message(&self) -> &Message {
        &self.message
    }
    pub fn bout(&self) -> &Bout {
        &self.bout
    }
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.message.write(writer)?;
        self.bout.write(writer)
    }
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let message = Message::read(reader)?;
        let bout = Bout::read(reader)?;
        Ok(Self { message, bout })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Bout(BoutNotice),
    Message(MessageNotice),
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::Bout(_) => "bout",
            Notice::Message(_) => "message",
        }
    }

    /// Stable name, e.g. `bout:7` or `message:42`.
    pub fn name(&self) -> String {
        match self {
            Notice::Bout(n) => format!("bout:{}", n.bout.number),
            Notice::Message(n) => format!("message:{}", n.message.number),
        }
    }

    /// Urns whose view of the index this notice changes.
    pub fn deps(&self) -> Result<BTreeSet<String>> {
        let deps: BTreeSet<String> = match self {
            Notice::Bout(n) => n.bout.participants.iter().map(|p| p.urn.clone()).collect(),
            Notice::Message(n) => std::iter::once(n.message.author.clone())
                .chain(n.bout.participants.iter().map(|p| p.urn.clone()))
                .collect(),
        };
        if matches!(self, Notice::Bout(_)) && deps.is_empty() {
            return Err(InfinityError::Dependency(format!(
                "empty list of participants in {}",
                self.name()
            )));
        }
        Ok(deps)
    }

    /// Writes the kind tag followed by the body.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        wire::write_utf(writer, self.kind())?;
        match self {
            Notice::Bout(n) => n.write(writer),
            Notice::Message(n) => n.write(writer),
        }
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let kind = wire::read_utf(reader)?;
        match kind.as_str() {
            "bout" => Ok(Notice::Bout(BoutNotice::read(reader)?)),
            "message" => Ok(Notice::Message(MessageNotice::read(reader)?)),
            other => Err(InfinityError::corruption(format!("unknown notice kind '{other}'"))),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(bytes)
    }

    /// Decodes a notice that must span all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let notice = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(InfinityError::corruption(format!(
                "{} trailing bytes after {}",
                reader.len(),
                notice.name()
            )));
        }
        Ok(notice)
    }

    /// BLAKE3 of the binary form, in hex.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(blake3::hash(&self.to_bytes()?).to_hex().to_string())
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<BoutNotice> for Notice {
    fn from(n: BoutNotice) -> Self {
        Notice::Bout(n)
    }
}

impl From<MessageNotice> for Notice {
    fn from(n: MessageNotice) -> Self {
        Notice::Message(n)
    }
}
