//! Executable query nodes.
//!
//! A term answers two questions about message numbers: which hit comes next
//! going down ([`Term::shift`]) and whether a given number is a hit
//! ([`Term::contains`]). Each also exposes a [`Lattice`] that combinators use
//! to skip windows where no hit can be.
//!
//! Filters such as `limit` are *volatile*: whether they accept a number
//! depends on what was emitted before it. They are never shifted directly.
//! An [`AndTerm`] consults them through [`Term::admit`] once per candidate,
//! in descending order.

use std::fmt;
use std::sync::Arc;

use crate::error::{InfinityError, Result};
use crate::lattice::{self, Lattice, LatticeBuilder, SIZE};
use crate::numbers::{Number, Numbers, MAX};

pub type BoxTerm = Box<dyn Term>;

/// Verdict of a volatile term on one candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject,
    /// Reject this candidate and everything below it.
    Stop,
}

pub trait Term: fmt::Display + Send {
    /// The largest hit strictly below `cursor`, or `0` when there is none.
    fn shift(&mut self, cursor: Number) -> Number;
    fn contains(&self, number: Number) -> bool;
    fn lattice(&self) -> Lattice;
    fn volatile(&self) -> bool {
        false
    }
    fn admit(&mut self, number: Number) -> Admission {
        if self.contains(number) {
            Admission::Accept
        } else {
            Admission::Reject
        }
    }
    /// The operands of a disjunction, so nested ORs flatten into one.
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm>;
}

// ------------- Leaves -------------

/// Every indexed message.
pub struct AlwaysTerm {
    universe: Arc<Numbers>,
}

impl AlwaysTerm {
    pub fn new(universe: &Arc<Numbers>) -> Self {
        Self { universe: Arc::clone(universe) }
    }
}

impl fmt::Display for AlwaysTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(ALWAYS)")
    }
}

impl Term for AlwaysTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        self.universe.next(cursor)
    }
    fn contains(&self, number: Number) -> bool {
        self.universe.contains(number)
    }
    fn lattice(&self) -> Lattice {
        self.universe.lattice()
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        vec![self]
    }
}

pub struct NeverTerm;

impl fmt::Display for NeverTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(NEVER)")
    }
}

impl Term for NeverTerm {
    fn shift(&mut self, _cursor: Number) -> Number {
        0
    }
    fn contains(&self, _number: Number) -> bool {
        false
    }
    fn lattice(&self) -> Lattice {
        Lattice::never()
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        Vec::new()
    }
}

/// Hits of one number set, typically the answer of a reverse lookup.
pub struct NumbersTerm {
    label: String,
    numbers: Arc<Numbers>,
    lattice: Lattice,
}

impl NumbersTerm {
    pub fn new(label: impl Into<String>, numbers: Arc<Numbers>) -> Self {
        let lattice = numbers.lattice();
        Self { label: label.into(), numbers, lattice }
    }
}

impl fmt::Display for NumbersTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl Term for NumbersTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        self.numbers.next(cursor)
    }
    fn contains(&self, number: Number) -> bool {
        self.numbers.contains(number)
    }
    fn lattice(&self) -> Lattice {
        self.lattice.clone()
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        vec![self]
    }
}

// ------------- Combinators -------------

/// A child together with its last answer.
///
/// An answer `a` given for cursor `q` stays valid for every cursor in
/// `(a, q]`, which is all a descending walk ever asks for next.
struct Slot {
    term: BoxTerm,
    asked: Number,
    answer: Number,
}

impl Slot {
    fn new(term: BoxTerm) -> Self {
        Self { term, asked: 0, answer: 0 }
    }
    fn shift(&mut self, cursor: Number) -> Number {
        if self.asked == 0 || cursor > self.asked || self.answer >= cursor {
            self.answer = self.term.shift(cursor);
            self.asked = cursor;
        }
        self.answer
    }
}

fn join(f: &mut fmt::Formatter, op: &str, slots: &[Slot]) -> fmt::Result {
    write!(f, "({op}")?;
    for slot in slots {
        write!(f, " {}", slot.term)?;
    }
    f.write_str(")")
}

/// Conjunction. Pure children are intersected by leapfrogging, volatile
/// children then filter the agreed candidates in the order they were given.
pub struct AndTerm {
    pure: Vec<Slot>,
    filters: Vec<BoxTerm>,
    lattice: Lattice,
    stopped: bool,
}

impl AndTerm {
    /// An empty conjunction holds every indexed message.
    pub fn new(universe: &Arc<Numbers>, terms: Vec<BoxTerm>) -> Result<Self> {
        let (filters, mut pure): (Vec<BoxTerm>, Vec<BoxTerm>) =
            terms.into_iter().partition(|t| t.volatile());
        if pure.is_empty() {
            pure.push(Box::new(AlwaysTerm::new(universe)));
        }
        let lattices: Vec<Lattice> = pure.iter().map(|t| t.lattice()).collect();
        let lattice = LatticeBuilder::new().always().and(&lattices)?.build();
        let pure = pure.into_iter().map(Slot::new).collect();
        Ok(Self { pure, filters, lattice, stopped: false })
    }

    /// Largest number strictly below `cursor` all pure children agree on.
    fn agree(&mut self, cursor: Number) -> Number {
        let mut bound = cursor.saturating_sub(1);
        loop {
            if bound == 0 {
                return 0;
            }
            bound = self.lattice.correct(bound + 1, |c| c).saturating_sub(1);
            if bound == 0 {
                return 0;
            }
            let mut agreed = true;
            for slot in &mut self.pure {
                let hit = slot.shift(bound + 1);
                if hit == 0 {
                    return 0;
                }
                if hit < bound {
                    bound = hit;
                    agreed = false;
                }
            }
            if agreed {
                return bound;
            }
        }
    }

    fn filter(&mut self, number: Number) -> Admission {
        for filter in &mut self.filters {
            match filter.admit(number) {
                Admission::Accept => continue,
                other => return other,
            }
        }
        Admission::Accept
    }
}

impl fmt::Display for AndTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(AND")?;
        for slot in &self.pure {
            write!(f, " {}", slot.term)?;
        }
        for filter in &self.filters {
            write!(f, " {filter}")?;
        }
        f.write_str(")")
    }
}

impl Term for AndTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        if self.stopped || self.lattice.is_never() {
            return 0;
        }
        let mut cursor = cursor;
        loop {
            let candidate = self.agree(cursor);
            if candidate == 0 {
                return 0;
            }
            match self.filter(candidate) {
                Admission::Accept => return candidate,
                Admission::Reject => cursor = candidate,
                Admission::Stop => {
                    self.stopped = true;
                    return 0;
                }
            }
        }
    }
    fn contains(&self, number: Number) -> bool {
        self.lattice.may_contain(number) && self.pure.iter().all(|s| s.term.contains(number))
    }
    fn lattice(&self) -> Lattice {
        self.lattice.clone()
    }
    fn volatile(&self) -> bool {
        !self.filters.is_empty()
    }
    fn admit(&mut self, number: Number) -> Admission {
        if self.stopped {
            return Admission::Stop;
        }
        if !self.contains(number) {
            return Admission::Reject;
        }
        let verdict = self.filter(number);
        if verdict == Admission::Stop {
            self.stopped = true;
        }
        verdict
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        vec![self]
    }
}

/// Disjunction; nested disjunctions are flattened, an empty one never matches.
pub struct OrTerm {
    slots: Vec<Slot>,
    lattice: Lattice,
}

impl OrTerm {
    pub fn new(terms: Vec<BoxTerm>) -> Result<Self> {
        let mut children = Vec::new();
        for term in terms {
            if term.volatile() {
                return Err(InfinityError::Construction(format!(
                    "{term} filters results and can't be part of a disjunction"
                )));
            }
            children.extend(term.disjuncts());
        }
        let lattices: Vec<Lattice> = children.iter().map(|t| t.lattice()).collect();
        let lattice = LatticeBuilder::new().never().or(&lattices)?.build();
        Ok(Self { slots: children.into_iter().map(Slot::new).collect(), lattice })
    }
}

impl fmt::Display for OrTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        join(f, "OR", &self.slots)
    }
}

impl Term for OrTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        let cursor = self.lattice.correct(cursor, |c| c);
        self.slots.iter_mut().map(|slot| slot.shift(cursor)).max().unwrap_or(0)
    }
    fn contains(&self, number: Number) -> bool {
        self.slots.iter().any(|s| s.term.contains(number))
    }
    fn lattice(&self) -> Lattice {
        self.lattice.clone()
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        self.slots.into_iter().map(|s| s.term).collect()
    }
}

/// Indexed messages that are not hits of the child.
pub struct NotTerm {
    universe: Arc<Numbers>,
    term: BoxTerm,
    excluded: Lattice,
    lattice: Lattice,
}

impl NotTerm {
    pub fn new(universe: &Arc<Numbers>, term: BoxTerm) -> Result<Self> {
        if term.volatile() {
            return Err(InfinityError::Construction(format!(
                "{term} filters results and can't be negated"
            )));
        }
        let excluded = term.lattice();
        let reverted = LatticeBuilder::new().copy(&excluded).revert()?.build();
        let lattice = LatticeBuilder::new().copy(&universe.lattice()).and([&reverted])?.build();
        Ok(Self { universe: Arc::clone(universe), term, excluded, lattice })
    }
}

impl fmt::Display for NotTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(NOT {})", self.term)
    }
}

impl Term for NotTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        let mut cursor = self.lattice.correct(cursor, |c| c);
        loop {
            let candidate = self.universe.next(cursor);
            if candidate == 0 || !self.term.contains(candidate) {
                return candidate;
            }
            cursor = if self.excluded.surely_contains(candidate) {
                // the whole window is excluded, jump below it
                lattice::bit(candidate)
                    .and_then(lattice::msg)
                    .map(|top| top - SIZE + 1)
                    .unwrap_or(candidate)
            } else {
                candidate
            };
        }
    }
    fn contains(&self, number: Number) -> bool {
        self.universe.contains(number) && !self.term.contains(number)
    }
    fn lattice(&self) -> Lattice {
        self.lattice.clone()
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        vec![self]
    }
}

// ------------- Iteration -------------

/// Pull-based, descending walk over the hits of a term.
///
/// Dropping it is all it takes to cancel a query.
pub struct Hits {
    term: BoxTerm,
    cursor: Number,
    peeked: Option<Number>,
}

impl Hits {
    pub fn new(term: BoxTerm) -> Self {
        Self { term, cursor: MAX, peeked: None }
    }

    pub fn has_next(&mut self) -> bool {
        if self.peeked.is_none() && self.cursor != 0 {
            let next = self.term.shift(self.cursor);
            self.cursor = next;
            if next != 0 {
                self.peeked = Some(next);
            }
        }
        self.peeked.is_some()
    }

    pub fn term(&self) -> &dyn Term {
        self.term.as_ref()
    }
}

impl Iterator for Hits {
    type Item = Number;

    fn next(&mut self) -> Option<Number> {
        if self.has_next() {
            self.peeked.take()
        } else {
            None
        }
    }
}
