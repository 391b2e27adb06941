use std::fmt;
use std::sync::Arc;

use super::{arity, number_arg, Motor};
use crate::atom::Atom;
use crate::error::{InfinityError, Result};
use crate::lattice::Lattice;
use crate::notice::{BoutNotice, MessageNotice};
use crate::numbers::{Number, Numbers};
use crate::term::{Admission, BoxTerm, Term};

/// Paging filters, owner of `limit` and `from`.
///
/// Both count what reaches them, so `(and q (from 20) (limit 10))` is the
/// third page of ten while `(and q (limit 10) (from 20))` is empty.
pub struct PagesMotor;

impl PagesMotor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PagesMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl Motor for PagesMotor {
    fn name(&self) -> &'static str {
        "pages"
    }

    fn operators(&self) -> &'static [&'static str] {
        &["limit", "from"]
    }

    fn build(&self, name: &str, args: &[Atom], _universe: &Arc<Numbers>) -> Result<BoxTerm> {
        arity(name, args, 1, 1)?;
        let count = number_arg(name, args, 0)?;
        match name {
            "limit" => Ok(Box::new(LimitTerm { max: count, seen: 0 })),
            "from" => Ok(Box::new(FromTerm { skip: count, skipped: 0 })),
            other => Err(InfinityError::Construction(format!("unsupported operator '{other}'"))),
        }
    }

    fn see_message(&self, _notice: &MessageNotice) -> Result<()> {
        Ok(())
    }

    fn see_bout(&self, _notice: &BoutNotice) -> Result<()> {
        Ok(())
    }
}

/// Lets the first `max` candidates through, then stops the walk.
pub struct LimitTerm {
    max: u64,
    seen: u64,
}

impl fmt::Display for LimitTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(LIMIT {})", self.max)
    }
}

impl Term for LimitTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        cursor.saturating_sub(1)
    }
    fn contains(&self, _number: Number) -> bool {
        true
    }
    fn lattice(&self) -> Lattice {
        Lattice::always()
    }
    fn volatile(&self) -> bool {
        true
    }
    fn admit(&mut self, _number: Number) -> Admission {
        if self.seen < self.max {
            self.seen += 1;
            Admission::Accept
        } else {
            Admission::Stop
        }
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        vec![self]
    }
}

/// Drops the first `skip` candidates.
pub struct FromTerm {
    skip: u64,
    skipped: u64,
}

impl fmt::Display for FromTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(FROM {})", self.skip)
    }
}

impl Term for FromTerm {
    fn shift(&mut self, cursor: Number) -> Number {
        cursor.saturating_sub(1)
    }
    fn contains(&self, _number: Number) -> bool {
        true
    }
    fn lattice(&self) -> Lattice {
        Lattice::always()
    }
    fn volatile(&self) -> bool {
        true
    }
    fn admit(&mut self, _number: Number) -> Admission {
        if self.skipped < self.skip {
            self.skipped += 1;
            Admission::Reject
        } else {
            Admission::Accept
        }
    }
    fn disjuncts(self: Box<Self>) -> Vec<BoxTerm> {
        vec![self]
    }
}
