//! Coarse skip-index over message numbers.
//!
//! The id space `1..=CAPACITY` is cut into `BITS` windows of `SIZE` ids.
//! Higher ids map to lower bits, so walking the bits upwards walks the
//! messages from the newest to the oldest. Every window is in one of three
//! states:
//! * `present` – every id of the window is a member,
//! * `absent` – no id of the window is a member,
//! * unknown – neither bit is set.
//!
//! A window is never both present and absent. A window that is not absent
//! "possibly" holds a hit; only absent windows are skipped by [`Lattice::correct`].

use std::fmt;
use std::sync::{Mutex, PoisonError};

use roaring::RoaringBitmap;

use crate::error::{InfinityError, Result};
use crate::numbers::{Number, MAX};

/// Number of windows.
pub const BITS: u32 = 16_384;
/// Ids per window.
pub const SIZE: u64 = 64;
/// Highest id a lattice can address.
pub const CAPACITY: Number = BITS as Number * SIZE;

/// The bit of the window holding `number`.
pub fn bit(number: Number) -> Result<u32> {
    if number == 0 {
        return Err(InfinityError::IllegalArgument(format!(
            "message #{number} is negative or zero"
        )));
    }
    if number > CAPACITY {
        return Err(InfinityError::IllegalArgument(format!(
            "message #{number} is out of range"
        )));
    }
    Ok(BITS - ((number - 1) / SIZE) as u32 - 1)
}

/// The highest id of the window behind `bit`.
pub fn msg(bit: u32) -> Result<Number> {
    if bit >= BITS {
        return Err(InfinityError::IllegalArgument(format!("bit #{bit} is out of range")));
    }
    Ok((BITS - bit) as Number * SIZE)
}

/// Live view of a number set, consulted when a single window changes.
pub trait Range {
    /// Number of members in `(tail, head]`.
    fn window(&self, head: Number, tail: Number) -> u64;
}

fn full() -> RoaringBitmap {
    let mut bitmap = RoaringBitmap::new();
    bitmap.insert_range(0..BITS);
    bitmap
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lattice {
    present: RoaringBitmap,
    absent: RoaringBitmap,
}

impl Lattice {
    pub fn always() -> Self {
        Self { present: full(), absent: RoaringBitmap::new() }
    }
    pub fn never() -> Self {
        Self { present: RoaringBitmap::new(), absent: full() }
    }
    pub fn is_never(&self) -> bool {
        self.absent.len() == BITS as u64
    }
    pub fn is_always(&self) -> bool {
        self.present.len() == BITS as u64
    }
    /// False only when the window of `number` is known to be empty.
    pub fn may_contain(&self, number: Number) -> bool {
        match bit(number) {
            Ok(b) => !self.absent.contains(b),
            Err(_) => false,
        }
    }
    /// True only when the window of `number` is known to be full.
    pub fn surely_contains(&self, number: Number) -> bool {
        match bit(number) {
            Ok(b) => self.present.contains(b),
            Err(_) => false,
        }
    }

    /// Moves `cursor` past absent windows.
    ///
    /// Looks at the window holding `cursor - 1`, the first id a descending
    /// shift could return. When that window is absent, `shifter` is called
    /// with a cursor just above the next window that might hold a hit, or
    /// with `0` when no such window remains. Otherwise `cursor` is returned
    /// unchanged.
    pub fn correct<F>(&self, cursor: Number, shifter: F) -> Number
    where
        F: FnOnce(Number) -> Number,
    {
        if cursor <= 1 {
            return cursor;
        }
        let top = if cursor == MAX {
            CAPACITY + 1
        } else {
            cursor.min(CAPACITY + 1)
        };
        let start = BITS - ((top - 2) / SIZE) as u32 - 1;
        match self.next_possible(start) {
            None => shifter(0),
            Some(next) if next > start => {
                let moved = (BITS - next) as Number * SIZE + 1;
                tracing::trace!(cursor, moved, start, next, "lattice correction");
                shifter(moved)
            }
            Some(_) => cursor,
        }
    }

    fn next_possible(&self, from: u32) -> Option<u32> {
        (from..BITS).find(|b| !self.absent.contains(*b))
    }
}

impl fmt::Display for Lattice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{} present, {} absent of {}]", self.present.len(), self.absent.len(), BITS)
    }
}

#[derive(Debug)]
struct Draft {
    started: bool,
    present: RoaringBitmap,
    absent: RoaringBitmap,
}

/// Mutable lattice under construction.
///
/// Combining operations require the draft to be started with
/// [`always`](Self::always), [`never`](Self::never), [`fill`](Self::fill)
/// or [`copy`](Self::copy) first.
#[derive(Debug)]
pub struct LatticeBuilder {
    draft: Mutex<Draft>,
}

impl Default for LatticeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatticeBuilder {
    pub fn new() -> Self {
        Self {
            draft: Mutex::new(Draft {
                started: false,
                present: RoaringBitmap::new(),
                absent: RoaringBitmap::new(),
            }),
        }
    }

    fn draft(&self) -> std::sync::MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn started(&self, op: &str) -> Result<std::sync::MutexGuard<'_, Draft>> {
        let draft = self.draft();
        if !draft.started {
            return Err(InfinityError::IllegalState(format!(
                "can't call #{op}(), start with always(), fill(), copy() or never()"
            )));
        }
        Ok(draft)
    }

    pub fn always(&self) -> &Self {
        let mut draft = self.draft();
        draft.present = full();
        draft.absent.clear();
        draft.started = true;
        self
    }

    pub fn never(&self) -> &Self {
        let mut draft = self.draft();
        draft.present.clear();
        draft.absent = full();
        draft.started = true;
        self
    }

    pub fn copy(&self, lattice: &Lattice) -> &Self {
        let mut draft = self.draft();
        draft.present = lattice.present.clone();
        draft.absent = lattice.absent.clone();
        draft.started = true;
        self
    }

    /// Resets the draft from a strictly descending sequence of ids.
    ///
    /// The draft is left untouched when the sequence is out of order or
    /// holds an id the lattice can't address.
    pub fn fill<I>(&self, numbers: I) -> Result<&Self>
    where
        I: IntoIterator<Item = Number>,
    {
        let mut present = RoaringBitmap::new();
        let mut absent = full();
        let mut previous = MAX;
        let mut current: Option<(u32, u64)> = None;
        for number in numbers {
            if number == previous {
                return Err(InfinityError::IllegalArgument("duplicate numbers not allowed".into()));
            }
            if number > previous {
                return Err(InfinityError::IllegalArgument(
                    "numbers should be reverse-ordered".into(),
                ));
            }
            previous = number;
            let b = bit(number)?;
            current = match current {
                Some((cb, count)) if cb == b => Some((cb, count + 1)),
                Some((cb, count)) => {
                    Self::settle(&mut present, &mut absent, cb, count);
                    Some((b, 1))
                }
                None => Some((b, 1)),
            };
        }
        if let Some((cb, count)) = current {
            Self::settle(&mut present, &mut absent, cb, count);
        }
        let mut draft = self.draft();
        draft.present = present;
        draft.absent = absent;
        draft.started = true;
        Ok(self)
    }

    fn settle(present: &mut RoaringBitmap, absent: &mut RoaringBitmap, b: u32, count: u64) {
        absent.remove(b);
        if count >= SIZE {
            present.insert(b);
        }
    }

    pub fn and<'a, I>(&self, lattices: I) -> Result<&Self>
    where
        I: IntoIterator<Item = &'a Lattice>,
    {
        let mut draft = self.started("and")?;
        for lattice in lattices {
            draft.present &= &lattice.present;
            draft.absent |= &lattice.absent;
        }
        Ok(self)
    }

    pub fn or<'a, I>(&self, lattices: I) -> Result<&Self>
    where
        I: IntoIterator<Item = &'a Lattice>,
    {
        let mut draft = self.started("or")?;
        for lattice in lattices {
            draft.present |= &lattice.present;
            draft.absent &= &lattice.absent;
        }
        Ok(self)
    }

    pub fn revert(&self) -> Result<&Self> {
        let mut draft = self.started("revert")?;
        let Draft { present, absent, .. } = &mut *draft;
        std::mem::swap(present, absent);
        Ok(self)
    }

    /// Updates the window of `number` after it was added (`present`) or
    /// removed. The window only becomes present or absent when `live`
    /// proves it full or empty.
    pub fn set(&self, number: Number, present: bool, live: &dyn Range) -> Result<&Self> {
        let mut draft = self.started("set")?;
        let b = bit(number)?;
        let head = msg(b)?;
        let count = live.window(head, head - SIZE);
        if present {
            draft.absent.remove(b);
            if count >= SIZE {
                draft.present.insert(b);
            } else {
                draft.present.remove(b);
            }
        } else {
            draft.present.remove(b);
            if count == 0 {
                draft.absent.insert(b);
            } else {
                draft.absent.remove(b);
            }
        }
        Ok(self)
    }

    pub fn build(&self) -> Lattice {
        let draft = self.draft();
        Lattice { present: draft.present.clone(), absent: draft.absent.clone() }
    }
}
