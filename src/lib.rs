//! Infinity – an index and query engine for conversation messages.
//!
//! Infinity learns from a stream of immutable *notices*, snapshots of a
//! bout (a conversation and its participants) or of a message posted to one,
//! and answers boolean queries over message numbers, newest first:
//!
//! ```text
//! (and (talks-with 'urn:test:alice') (matches 'hello' $text) (bundled) (limit 10))
//! ```
//!
//! ## Modules
//! * [`numbers`] – Compressed, descending sets of message numbers with a binary file format.
//! * [`lattice`] – The window bitmaps that let query terms skip dead ranges.
//! * [`triples`] – `(subject, relation, object)` facts with forward and reverse lookup.
//! * [`persist`] – SQLite backed triples.
//! * [`term`] – Executable query nodes: `and`, `or`, `not`, leaves, and the [`term::Hits`] iterator.
//! * [`atom`], [`query`] – Query grammar (see `query.pest`) and the compiler resolving operators to motors.
//! * [`motors`] – Index builders owning operators such as `matches`, `talks-with` or `limit`.
//! * [`notice`], [`wire`] – Bout and message snapshots and their big-endian binary form.
//! * [`journal`] – The append-only notice log an engine replays when it opens.
//! * [`mux`] – Worker pool delivering notices and answering readiness (`eta`).
//! * [`settings`] – Configuration from defaults, `infinity.toml` and `INFINITY_*` variables.
//! * [`infinity`] – The engine wiring all of the above.
//!
//! ## Numbers and lattices
//! Message numbers are positive, monotonic and never reused. `0` ends a
//! sequence and `i64::MAX` marks a run in the file format; neither is ever a
//! message. A [`numbers::Numbers`] set keeps maximal runs, so a bout with
//! thousands of consecutive messages costs a single entry. Each set carries a
//! [`lattice::Lattice`]: 16 384 windows of 64 numbers, each known to be full,
//! known to be empty, or unknown. Conjunctions jump over any window one of
//! their operands proves empty.
//!
//! ## Motors
//! A [`motors::Motor`] sees every notice and keeps its relations in the shared
//! triples; it also builds the terms for the operators it owns. Which motor
//! owns which operator is decided once, when the [`query::Compiler`] is built
//! from the motor list handed to the engine.
//!
//! ## Quick Start
//! ```
//! use chrono::Utc;
//! use infinity::infinity::Infinity;
//! use infinity::notice::{Bout, Message, MessageNotice, Notice, Participant};
//! use infinity::settings::Settings;
//!
//! let engine = Infinity::open(Settings::memory()).unwrap();
//! let bout = Bout::new(1, Utc::now(), "greetings", vec![Participant::new("urn:test:alice", true, true)]);
//! let message = Message::new(7, "urn:test:alice", "hello world", Utc::now());
//! let deps: Vec<String> = engine
//!     .see(Notice::Message(MessageNotice::new(message, bout)))
//!     .unwrap()
//!     .into_iter()
//!     .collect();
//! while !engine.eta(&deps).is_zero() {
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! let found = engine.messages("(and (talks-with 'urn:test:alice') (matches 'hello' $text))").unwrap();
//! assert_eq!(found, vec![7]);
//! ```

pub mod atom;
pub mod error;
pub mod infinity;
pub mod journal;
pub mod lattice;
pub mod motors;
pub mod mux;
pub mod notice;
pub mod numbers;
pub mod persist;
pub mod query;
pub mod settings;
pub mod term;
pub mod triples;
pub mod wire;

pub use error::{InfinityError, Result};
