//! Generic `(subject, relation, object)` facts with forward and reverse lookup.
//!
//! Subjects are message or bout numbers, so a reverse lookup answers with a
//! [`Numbers`] set that terms can iterate and skip through with its lattice.

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, PoisonError, RwLock};

use seahash::SeaHasher;

use crate::error::Result;
use crate::numbers::{Number, Numbers};

pub type ObjectHasher = BuildHasherDefault<SeaHasher>;
pub type RelationHasher = BuildHasherDefault<SeaHasher>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Object {
    Number(Number),
    Text(String),
}

impl Object {
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Object::Number(n) => Some(*n),
            Object::Text(_) => None,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Object::Text(t) => Some(t),
            Object::Number(_) => None,
        }
    }
}

impl From<Number> for Object {
    fn from(n: Number) -> Self {
        Object::Number(n)
    }
}

impl From<&str> for Object {
    fn from(t: &str) -> Self {
        Object::Text(t.to_string())
    }
}

impl From<String> for Object {
    fn from(t: String) -> Self {
        Object::Text(t)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Object::Number(n) => write!(f, "{n}"),
            Object::Text(t) => write!(f, "'{t}'"),
        }
    }
}

pub trait Triples: Send + Sync {
    /// Stores the triple; storing it twice is the same as storing it once.
    fn put(&self, subject: Number, relation: &str, object: &Object) -> Result<()>;
    /// Removes one triple, or every object of the subject when `object` is `None`.
    fn remove(&self, subject: Number, relation: &str, object: Option<&Object>) -> Result<()>;
    fn clear(&self, subject: Number, relation: &str) -> Result<()> {
        self.remove(subject, relation, None)
    }
    /// Swaps every object of the subject for `objects` in one step, readers
    /// never see a mix of the old and the new objects.
    fn replace(&self, subject: Number, relation: &str, objects: &[Object]) -> Result<()>;
    /// Stores `objects` only if the subject has none in the relation yet.
    /// Returns whether anything was written.
    fn seed(&self, subject: Number, relation: &str, objects: &[Object]) -> Result<bool>;
    /// The first object stored for the subject.
    fn get(&self, subject: Number, relation: &str) -> Result<Option<Object>>;
    fn all(&self, subject: Number, relation: &str) -> Result<Vec<Object>>;
    fn has(&self, subject: Number, relation: &str, object: &Object) -> Result<bool>;
    /// Subjects related to `object`, highest first.
    fn reverse(&self, relation: &str, object: &Object) -> Result<Arc<Numbers>>;
}

#[derive(Default)]
struct Relation {
    forward: HashMap<Number, Vec<Object>>,
    reverse: HashMap<Object, Arc<Numbers>, ObjectHasher>,
}

impl Relation {
    fn put(&mut self, subject: Number, object: &Object) -> Result<()> {
        Numbers::validate(subject)?;
        let subjects = self.reverse.entry(object.clone()).or_default();
        subjects.add(subject)?;
        let objects = self.forward.entry(subject).or_default();
        if !objects.contains(object) {
            objects.push(object.clone());
        }
        Ok(())
    }

    fn replace(&mut self, subject: Number, objects: &[Object]) -> Result<()> {
        Numbers::validate(subject)?;
        let old = self.forward.remove(&subject).unwrap_or_default();
        for object in old.iter().filter(|o| !objects.contains(o)) {
            self.unlink(subject, object)?;
        }
        for object in objects {
            self.put(subject, object)?;
        }
        Ok(())
    }

    fn unlink(&mut self, subject: Number, object: &Object) -> Result<()> {
        // the set stays in place even when empty, terms may still hold it
        if let Some(subjects) = self.reverse.get(object) {
            subjects.remove(subject)?;
        }
        Ok(())
    }
}

/// In-memory triples, one lock per relation.
#[derive(Default)]
pub struct MemTriples {
    relations: RwLock<HashMap<String, Arc<RwLock<Relation>>, RelationHasher>>,
}

impl MemTriples {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, name: &str) -> Option<Arc<RwLock<Relation>>> {
        let relations = self.relations.read().unwrap_or_else(PoisonError::into_inner);
        relations.get(name).cloned()
    }

    fn relation(&self, name: &str) -> Arc<RwLock<Relation>> {
        if let Some(relation) = self.existing(name) {
            return relation;
        }
        let mut relations = self.relations.write().unwrap_or_else(PoisonError::into_inner);
        relations.entry(name.to_string()).or_default().clone()
    }

    /// Names of the relations holding at least one triple.
    pub fn relations(&self) -> Vec<String> {
        let relations = self.relations.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = relations
            .iter()
            .filter(|(_, r)| !r.read().unwrap_or_else(PoisonError::into_inner).forward.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Distinct objects with a reverse set in `relation`, emptied sets included.
    pub fn objects(&self, relation: &str) -> usize {
        self.existing(relation)
            .map_or(0, |r| r.read().unwrap_or_else(PoisonError::into_inner).reverse.len())
    }
}

impl Triples for MemTriples {
    fn put(&self, subject: Number, relation: &str, object: &Object) -> Result<()> {
        let relation = self.relation(relation);
        let mut relation = relation.write().unwrap_or_else(PoisonError::into_inner);
        relation.put(subject, object)
    }

    fn replace(&self, subject: Number, relation: &str, objects: &[Object]) -> Result<()> {
        let relation = self.relation(relation);
        let mut relation = relation.write().unwrap_or_else(PoisonError::into_inner);
        relation.replace(subject, objects)
    }

    fn seed(&self, subject: Number, relation: &str, objects: &[Object]) -> Result<bool> {
        let relation = self.relation(relation);
        let mut relation = relation.write().unwrap_or_else(PoisonError::into_inner);
        if relation.forward.contains_key(&subject) {
            return Ok(false);
        }
        for object in objects {
            relation.put(subject, object)?;
        }
        Ok(true)
    }

    fn remove(&self, subject: Number, relation: &str, object: Option<&Object>) -> Result<()> {
        let Some(relation) = self.existing(relation) else {
            return Ok(());
        };
        let mut relation = relation.write().unwrap_or_else(PoisonError::into_inner);
        let removed: Vec<Object> = match relation.forward.get_mut(&subject) {
            None => return Ok(()),
            Some(objects) => match object {
                None => std::mem::take(objects),
                Some(object) => {
                    let before = objects.len();
                    objects.retain(|o| o != object);
                    if objects.len() == before {
                        Vec::new()
                    } else {
                        vec![object.clone()]
                    }
                }
            },
        };
        if relation.forward.get(&subject).is_some_and(Vec::is_empty) {
            relation.forward.remove(&subject);
        }
        for object in &removed {
            relation.unlink(subject, object)?;
        }
        Ok(())
    }

    fn get(&self, subject: Number, relation: &str) -> Result<Option<Object>> {
        Ok(self.existing(relation).and_then(|relation| {
            let relation = relation.read().unwrap_or_else(PoisonError::into_inner);
            relation.forward.get(&subject).and_then(|objects| objects.first().cloned())
        }))
    }

    fn all(&self, subject: Number, relation: &str) -> Result<Vec<Object>> {
        Ok(self
            .existing(relation)
            .map(|relation| {
                let relation = relation.read().unwrap_or_else(PoisonError::into_inner);
                relation.forward.get(&subject).cloned().unwrap_or_default()
            })
            .unwrap_or_default())
    }

    fn has(&self, subject: Number, relation: &str, object: &Object) -> Result<bool> {
        Ok(self.existing(relation).is_some_and(|relation| {
            let relation = relation.read().unwrap_or_else(PoisonError::into_inner);
            relation.forward.get(&subject).is_some_and(|objects| objects.contains(object))
        }))
    }

    fn reverse(&self, relation: &str, object: &Object) -> Result<Arc<Numbers>> {
        Ok(self
            .existing(relation)
            .and_then(|relation| {
                let relation = relation.read().unwrap_or_else(PoisonError::into_inner);
                relation.reverse.get(object).cloned()
            })
            .unwrap_or_default())
    }
}
