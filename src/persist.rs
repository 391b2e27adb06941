// used for persistence of triples
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ToSql};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{InfinityError, Result};
use crate::numbers::{Number, Numbers};
use crate::triples::{Object, Triples};

/// Triples kept in SQLite, one table per relation.
///
/// Tables are created the first time a relation is written to. Reads of a
/// relation that has no table yet answer as if it were empty.
pub struct SqliteTriples {
    db: Mutex<Connection>,
    tables: Mutex<HashSet<String>>,
}

enum Param<'a> {
    Number(i64),
    Text(&'a str),
}

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            Param::Number(n) => n.to_sql(),
            Param::Text(t) => t.to_sql(),
        }
    }
}

fn param(object: &Object) -> Result<Param<'_>> {
    match object {
        Object::Number(n) => i64::try_from(*n)
            .map(Param::Number)
            .map_err(|_| InfinityError::IllegalArgument(format!("object {n} is out of range"))),
        Object::Text(t) => Ok(Param::Text(t)),
    }
}

fn object(value: ValueRef<'_>) -> Result<Object> {
    match value {
        ValueRef::Integer(n) if n >= 0 => Ok(Object::Number(n as Number)),
        ValueRef::Text(t) => Ok(Object::Text(String::from_utf8_lossy(t).into_owned())),
        other => Err(InfinityError::corruption(format!("unexpected object {other:?}"))),
    }
}

fn key(subject: Number) -> Result<i64> {
    i64::try_from(subject)
        .map_err(|_| InfinityError::IllegalArgument(format!("subject {subject} is out of range")))
}

/// Table name of a relation, e.g. `message-to-bout` becomes `Triple_message_to_bout`.
pub fn table(relation: &str) -> String {
    let name: String = relation
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("Triple_{name}")
}

impl SqliteTriples {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    pub fn with_connection(connection: Connection) -> Result<Self> {
        let tables = {
            let mut statement = connection
                .prepare("select name from sqlite_master where type = 'table' and name like 'Triple_%'")?;
            let names = statement.query_map([], |row| row.get::<_, String>(0))?;
            names.collect::<rusqlite::Result<HashSet<String>>>()?
        };
        tracing::debug!(tables = tables.len(), "sqlite triples opened");
        Ok(Self { db: Mutex::new(connection), tables: Mutex::new(tables) })
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exists(&self, relation: &str) -> bool {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&table(relation))
    }

    fn create(&self, db: &Connection, relation: &str) -> Result<String> {
        let name = table(relation);
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if !tables.contains(&name) {
            db.execute_batch(&format!(
                "
                -- Object has no declared type, so texts like '42' keep their type
                create table if not exists {name} (
                    Subject integer not null,
                    Object not null,
                    Position integer primary key autoincrement,
                    constraint unique_{name} unique (
                        Subject,
                        Object
                    )
                );
                create index if not exists {name}_by_Object on {name} (Object, Subject);
                "
            ))?;
            tables.insert(name.clone());
        }
        Ok(name)
    }
}

impl Triples for SqliteTriples {
    fn put(&self, subject: Number, relation: &str, object: &Object) -> Result<()> {
        Numbers::validate(subject)?;
        let db = self.db();
        let name = self.create(&db, relation)?;
        db.prepare_cached(&format!("insert or ignore into {name} (Subject, Object) values (?, ?)"))?
            .execute(params![key(subject)?, param(object)?])?;
        Ok(())
    }

    fn replace(&self, subject: Number, relation: &str, objects: &[Object]) -> Result<()> {
        Numbers::validate(subject)?;
        let mut db = self.db();
        let name = self.create(&db, relation)?;
        let tx = db.transaction()?;
        tx.prepare_cached(&format!("delete from {name} where Subject = ?"))?
            .execute(params![key(subject)?])?;
        for object in objects {
            tx.prepare_cached(&format!("insert or ignore into {name} (Subject, Object) values (?, ?)"))?
                .execute(params![key(subject)?, param(object)?])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn seed(&self, subject: Number, relation: &str, objects: &[Object]) -> Result<bool> {
        Numbers::validate(subject)?;
        let mut db = self.db();
        let name = self.create(&db, relation)?;
        let tx = db.transaction()?;
        let present = tx
            .prepare_cached(&format!("select 1 from {name} where Subject = ? limit 1"))?
            .exists(params![key(subject)?])?;
        if present {
            return Ok(false);
        }
        for object in objects {
            tx.prepare_cached(&format!("insert or ignore into {name} (Subject, Object) values (?, ?)"))?
                .execute(params![key(subject)?, param(object)?])?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn remove(&self, subject: Number, relation: &str, object: Option<&Object>) -> Result<()> {
        if !self.exists(relation) {
            return Ok(());
        }
        let name = table(relation);
        let db = self.db();
        match object {
            Some(object) => {
                db.prepare_cached(&format!("delete from {name} where Subject = ? and Object = ?"))?
                    .execute(params![key(subject)?, param(object)?])?;
            }
            None => {
                db.prepare_cached(&format!("delete from {name} where Subject = ?"))?
                    .execute(params![key(subject)?])?;
            }
        }
        Ok(())
    }

    fn get(&self, subject: Number, relation: &str) -> Result<Option<Object>> {
        Ok(self.all(subject, relation)?.into_iter().next())
    }

    fn all(&self, subject: Number, relation: &str) -> Result<Vec<Object>> {
        if !self.exists(relation) {
            return Ok(Vec::new());
        }
        let name = table(relation);
        let db = self.db();
        let mut statement =
            db.prepare_cached(&format!("select Object from {name} where Subject = ? order by Position"))?;
        let mut rows = statement.query(params![key(subject)?])?;
        let mut objects = Vec::new();
        while let Some(row) = rows.next()? {
            objects.push(object(row.get_ref(0)?)?);
        }
        Ok(objects)
    }

    fn has(&self, subject: Number, relation: &str, object: &Object) -> Result<bool> {
        if !self.exists(relation) {
            return Ok(false);
        }
        let name = table(relation);
        let db = self.db();
        let found = db
            .prepare_cached(&format!("select 1 from {name} where Subject = ? and Object = ? limit 1"))?
            .exists(params![key(subject)?, param(object)?])?;
        Ok(found)
    }

    fn reverse(&self, relation: &str, object: &Object) -> Result<Arc<Numbers>> {
        let numbers = Numbers::new();
        if !self.exists(relation) {
            return Ok(Arc::new(numbers));
        }
        let name = table(relation);
        let db = self.db();
        let mut statement =
            db.prepare_cached(&format!("select Subject from {name} where Object = ? order by Subject desc"))?;
        let mut rows = statement.query(params![param(object)?])?;
        while let Some(row) = rows.next()? {
            let subject: i64 = row.get(0)?;
            if subject <= 0 {
                return Err(InfinityError::corruption(format!("invalid subject {subject} in {name}")));
            }
            numbers.add(subject as Number)?;
        }
        Ok(Arc::new(numbers))
    }
}
