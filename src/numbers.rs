//! Compressed, descending set of message numbers.
//!
//! In memory the set is a vector of maximal runs, highest first. A run of
//! one id is an [`Entry::Value`], a longer run an [`Entry::Range`]. Since
//! every run is maximal, no two neighbouring entries are contiguous and the
//! vector is the unique minimal run-length encoding of the set.
//!
//! On disk the set is a sequence of big-endian `i64`: runs of four or more
//! ids are written as `high, MAX, low`, shorter runs explicitly, and the
//! sequence ends with `0`.

use std::fmt;
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{InfinityError, Result};
use crate::lattice::{self, Lattice, LatticeBuilder, Range};
use crate::wire;

/// A message number.
pub type Number = u64;

/// Range marker in the file format, and the "top" cursor.
pub const MAX: Number = i64::MAX as Number;

/// Coarse step used when growing or shrinking the entry vector.
const INCREMENT: usize = 256;

/// Runs this long or longer are written with the range marker.
const COMPRESS_AT: u64 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    Value(Number),
    Range { high: Number, low: Number },
}

impl Entry {
    fn span(high: Number, low: Number) -> Self {
        if high == low {
            Entry::Value(high)
        } else {
            Entry::Range { high, low }
        }
    }
    pub fn high(&self) -> Number {
        match *self {
            Entry::Value(n) => n,
            Entry::Range { high, .. } => high,
        }
    }
    pub fn low(&self) -> Number {
        match *self {
            Entry::Value(n) => n,
            Entry::Range { low, .. } => low,
        }
    }
    pub fn len(&self) -> u64 {
        self.high() - self.low() + 1
    }
    fn holds(&self, number: Number) -> bool {
        self.low() <= number && number <= self.high()
    }
}

pub struct Numbers {
    entries: Mutex<Vec<Entry>>,
    lattice: LatticeBuilder,
}

impl Default for Numbers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Numbers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.entries().iter()).finish()
    }
}

impl Numbers {
    pub fn new() -> Self {
        let lattice = LatticeBuilder::new();
        lattice.never();
        Self { entries: Mutex::new(Vec::new()), lattice }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails for the sentinels and for numbers a lattice can't address.
    pub fn validate(number: Number) -> Result<()> {
        if number == 0 || number == MAX {
            return Err(InfinityError::IllegalArgument(format!(
                "#{number} is a reserved number"
            )));
        }
        lattice::bit(number).map(|_| ())
    }

    /// Position of the entry holding `number`, or where it would go.
    fn find(entries: &[Entry], number: Number) -> std::result::Result<usize, usize> {
        let pos = entries.partition_point(|e| e.low() > number);
        if pos < entries.len() && entries[pos].holds(number) {
            Ok(pos)
        } else {
            Err(pos)
        }
    }

    /// Merges the entry at `pos` with its neighbours when they touch.
    fn compress(entries: &mut Vec<Entry>, pos: usize) {
        if pos + 1 < entries.len() && entries[pos].low() == entries[pos + 1].high() + 1 {
            entries[pos] = Entry::span(entries[pos].high(), entries[pos + 1].low());
            entries.remove(pos + 1);
        }
        if pos > 0 && entries[pos - 1].low() == entries[pos].high() + 1 {
            entries[pos - 1] = Entry::span(entries[pos - 1].high(), entries[pos].low());
            entries.remove(pos);
        }
    }

    fn resize(entries: &mut Vec<Entry>) {
        let spare = entries.capacity() - entries.len();
        if spare == 0 {
            entries.reserve_exact(INCREMENT);
        } else if spare > 2 * INCREMENT {
            entries.shrink_to(entries.len() + INCREMENT);
        }
    }

    /// Adds `number`, returning false if it was already there.
    pub fn add(&self, number: Number) -> Result<bool> {
        Self::validate(number)?;
        {
            let mut entries = self.entries();
            match Self::find(&entries, number) {
                Ok(_) => return Ok(false),
                Err(pos) => {
                    Self::resize(&mut entries);
                    entries.insert(pos, Entry::Value(number));
                    Self::compress(&mut entries, pos);
                }
            }
        }
        self.lattice.set(number, true, self)?;
        Ok(true)
    }

    /// Removes `number`, returning false if it wasn't there.
    pub fn remove(&self, number: Number) -> Result<bool> {
        Self::validate(number)?;
        {
            let mut entries = self.entries();
            let pos = match Self::find(&entries, number) {
                Ok(pos) => pos,
                Err(_) => return Ok(false),
            };
            let entry = entries[pos];
            let (high, low) = (entry.high(), entry.low());
            if high == low {
                entries.remove(pos);
            } else if number == high {
                entries[pos] = Entry::span(high - 1, low);
            } else if number == low {
                entries[pos] = Entry::span(high, low + 1);
            } else {
                entries[pos] = Entry::span(high, number + 1);
                entries.insert(pos + 1, Entry::span(number - 1, low));
            }
            Self::resize(&mut entries);
        }
        self.lattice.set(number, false, self)?;
        Ok(true)
    }

    /// The largest member strictly below `cursor`, or `0` when there is none.
    pub fn next(&self, cursor: Number) -> Number {
        if cursor <= 1 {
            return 0;
        }
        let target = cursor - 1;
        let entries = self.entries();
        let pos = entries.partition_point(|e| e.low() > target);
        match entries.get(pos) {
            Some(entry) => entry.high().min(target),
            None => 0,
        }
    }

    pub fn contains(&self, number: Number) -> bool {
        Self::find(&self.entries(), number).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Number of members.
    pub fn len(&self) -> u64 {
        self.entries().iter().map(Entry::len).sum()
    }

    /// Members in descending order. Each step is a separate [`next`](Self::next).
    pub fn iter(&self) -> impl Iterator<Item = Number> + '_ {
        let mut cursor = MAX;
        std::iter::from_fn(move || {
            let next = self.next(cursor);
            if next == 0 {
                None
            } else {
                cursor = next;
                Some(next)
            }
        })
    }

    /// Copy of the runs, highest first.
    pub fn runs(&self) -> Vec<Entry> {
        self.entries().clone()
    }

    /// Size of the encoded form in bytes, terminator included.
    pub fn sizeof(&self) -> u64 {
        let values: u64 = self
            .entries()
            .iter()
            .map(|e| if e.len() >= COMPRESS_AT { 3 } else { e.len() })
            .sum();
        (values + 1) * 8
    }

    pub fn lattice(&self) -> Lattice {
        self.lattice.build()
    }

    /// Writes the set, returning the number of bytes written.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let runs = self.runs();
        let mut written = 0u64;
        for entry in &runs {
            if entry.len() >= COMPRESS_AT {
                for value in [entry.high(), MAX, entry.low()] {
                    wire::write_i64(writer, value as i64)?;
                }
                written += 24;
            } else {
                for value in (entry.low()..=entry.high()).rev() {
                    wire::write_i64(writer, value as i64)?;
                    written += 8;
                }
            }
        }
        wire::write_i64(writer, 0)?;
        written += 8;
        tracing::debug!(runs = runs.len(), bytes = written, "numbers saved");
        Ok(written)
    }

    /// Replaces the content with a set read from `reader`.
    ///
    /// Nothing changes unless the whole stream up to its terminating `0`
    /// is valid.
    pub fn load<R: Read>(&self, reader: &mut R) -> Result<()> {
        let mut runs: Vec<Entry> = Vec::new();
        let mut previous: Option<Number> = None;
        let mut marker = false;
        loop {
            let raw = wire::read_i64(reader)?;
            if raw < 0 {
                return Err(InfinityError::corruption(format!("negative number {raw}")));
            }
            let value = raw as Number;
            if value == 0 {
                if marker {
                    return Err(InfinityError::corruption("range marker without a lower bound"));
                }
                break;
            }
            if value == MAX {
                if marker || previous.is_none() {
                    return Err(InfinityError::corruption("misplaced range marker"));
                }
                marker = true;
                continue;
            }
            if value > lattice::CAPACITY {
                return Err(InfinityError::corruption(format!("number {value} is out of range")));
            }
            if let Some(prev) = previous {
                if value == prev {
                    return Err(InfinityError::corruption(format!("duplicate number {value}")));
                }
                if value > prev {
                    return Err(InfinityError::corruption(format!(
                        "invalid order of numbers: {value} > {prev}"
                    )));
                }
            }
            let high = if marker {
                previous.unwrap_or(value)
            } else {
                value
            };
            Self::push(&mut runs, high, value);
            previous = Some(value);
            marker = false;
        }
        let ids: Vec<Number> = runs.iter().flat_map(|e| (e.low()..=e.high()).rev()).collect();
        // never hold the entries while locking the lattice, set() locks the other way round
        self.lattice.fill(ids)?;
        let count = runs.len();
        *self.entries() = runs;
        tracing::debug!(runs = count, "numbers loaded");
        Ok(())
    }

    /// Appends the run `high..=low` below the existing runs, merging when contiguous.
    fn push(runs: &mut Vec<Entry>, high: Number, low: Number) {
        match runs.last_mut() {
            Some(last) if last.low() <= high + 1 => {
                *last = Entry::span(last.high(), low);
            }
            _ => runs.push(Entry::span(high, low)),
        }
    }
}

impl Range for Numbers {
    fn window(&self, head: Number, tail: Number) -> u64 {
        if head <= tail {
            return 0;
        }
        let entries = self.entries();
        let start = entries.partition_point(|e| e.low() > head);
        entries[start..]
            .iter()
            .take_while(|e| e.high() > tail)
            .map(|e| e.high().min(head) - e.low().max(tail + 1) + 1)
            .sum()
    }
}
