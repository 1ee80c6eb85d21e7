//! Collection-oriented document store on SQLite.
//!
//! Documents are JSON objects addressed by collection and a store-assigned id.
//! Every write bumps the document revision, which callers can filter on to
//! turn a load-modify-store sequence into a compare-and-swap.

mod query;

pub use query::{Filter, Update};

use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::DbPool;

/// Fields whose values no two users may share.
const USER_UNIQUE_FIELDS: &[&str] = &["mobile", "email"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate {field}: {value}")]
    UniqueViolation { field: String, value: String },

    #[error("Document body must be a JSON object")]
    NotAnObject,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored document with its id and revision rendered alongside its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: String,
    pub revision: i64,
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Clone)]
pub struct CollectionNames {
    pub users: String,
    pub discussions: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            users: "users".to_string(),
            discussions: "discussions".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: DbPool,
    names: Arc<CollectionNames>,
}

impl DocumentStore {
    pub fn new(pool: DbPool, names: CollectionNames) -> Self {
        Self {
            pool,
            names: Arc::new(names),
        }
    }

    /// Run `f` against a single pooled connection. Each store call inside is
    /// its own atomic write.
    pub fn session<T, E>(&self, f: impl FnOnce(&Session<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.pool.get().map_err(StoreError::from)?;
        f(&Session {
            conn: &conn,
            names: &self.names,
        })
    }

    /// Run `f` inside one immediate transaction; any error rolls back every
    /// write made through the session.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Session<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.pool.get().map_err(StoreError::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&Session {
            conn: &tx,
            names: &self.names,
        })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

pub struct Session<'a> {
    conn: &'a Connection,
    names: &'a CollectionNames,
}

impl<'a> Session<'a> {
    pub fn users(&self) -> Collection<'a> {
        self.collection(&self.names.users, USER_UNIQUE_FIELDS)
    }

    pub fn discussions(&self) -> Collection<'a> {
        self.collection(&self.names.discussions, &[])
    }

    fn collection(&self, name: &'a str, unique: &'static [&'static str]) -> Collection<'a> {
        Collection {
            conn: self.conn,
            name,
            unique,
        }
    }
}

pub struct Collection<'a> {
    conn: &'a Connection,
    name: &'a str,
    unique: &'static [&'static str],
}

impl Collection<'_> {
    /// Insert a new document and return its assigned id.
    pub fn insert<T: Serialize>(&self, doc: &T) -> StoreResult<String> {
        let body = match serde_json::to_value(doc)? {
            Value::Object(map) => map,
            _ => return Err(StoreError::NotAnObject),
        };
        let id = uuid::Uuid::now_v7().to_string();

        write_scope(self.conn, || {
            self.conn.execute(
                "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                params![self.name, id, serde_json::to_string(&body)?],
            )?;
            self.claim_unique_keys(&id, &body)
        })?;

        Ok(id)
    }

    pub fn get<T: DeserializeOwned>(&self, id: &str) -> StoreResult<Option<Record<T>>> {
        self.find_one(&Filter::id(id))
    }

    pub fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.locate(&Filter::id(id))?.is_some())
    }

    pub fn find_one<T: DeserializeOwned>(&self, filter: &Filter) -> StoreResult<Option<Record<T>>> {
        let (clause, params) = self.scope(filter);
        let row: Option<(String, i64, String)> = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, version, body FROM documents WHERE {clause} ORDER BY seq LIMIT 1"
                ),
                params_from_iter(params.iter()),
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(id, revision, body)| decode(id, revision, &body))
            .transpose()
    }

    /// All matching documents in insertion order.
    pub fn find<T: DeserializeOwned>(&self, filter: &Filter) -> StoreResult<Vec<Record<T>>> {
        let (clause, params) = self.scope(filter);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, version, body FROM documents WHERE {clause} ORDER BY seq"
        ))?;
        let rows: Vec<(String, i64, String)> = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, revision, body)| decode(id, revision, &body))
            .collect()
    }

    /// Apply `update` to the first matching document. Returns the number of
    /// documents matched (0 or 1).
    pub fn update_one(&self, filter: &Filter, update: &Update) -> StoreResult<u64> {
        write_scope(self.conn, || {
            let Some((seq, id)) = self.locate(filter)? else {
                return Ok(0);
            };

            let mut params = Vec::new();
            let body = update.to_sql(&mut params)?;
            params.push(SqlValue::Integer(seq));
            let changed = self.conn.execute(
                &format!(
                    "UPDATE documents SET body = {body}, version = version + 1, \
                     updated_at = datetime('now') WHERE seq = ?"
                ),
                params_from_iter(params.iter()),
            )?;

            if self.unique.iter().any(|field| update.touches(field)) {
                self.release_unique_keys(&id)?;
                let body = self.body_at(seq)?;
                self.claim_unique_keys(&id, &body)?;
            }

            Ok(changed as u64)
        })
    }

    /// Delete the first matching document. Returns the number deleted (0 or 1).
    pub fn delete_one(&self, filter: &Filter) -> StoreResult<u64> {
        write_scope(self.conn, || {
            let Some((seq, id)) = self.locate(filter)? else {
                return Ok(0);
            };
            let deleted = self
                .conn
                .execute("DELETE FROM documents WHERE seq = ?1", params![seq])?;
            self.release_unique_keys(&id)?;
            Ok(deleted as u64)
        })
    }

    fn scope(&self, filter: &Filter) -> (String, Vec<SqlValue>) {
        let mut params = vec![SqlValue::Text(self.name.to_string())];
        let clause = format!("collection = ? AND ({})", filter.to_sql(&mut params));
        (clause, params)
    }

    fn locate(&self, filter: &Filter) -> StoreResult<Option<(i64, String)>> {
        let (clause, params) = self.scope(filter);
        let found = self
            .conn
            .query_row(
                &format!("SELECT seq, id FROM documents WHERE {clause} ORDER BY seq LIMIT 1"),
                params_from_iter(params.iter()),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(found)
    }

    fn body_at(&self, seq: i64) -> StoreResult<Map<String, Value>> {
        let body: String = self.conn.query_row(
            "SELECT body FROM documents WHERE seq = ?1",
            params![seq],
            |row| row.get(0),
        )?;
        match serde_json::from_str(&body)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::NotAnObject),
        }
    }

    fn claim_unique_keys(&self, id: &str, body: &Map<String, Value>) -> StoreResult<()> {
        for field in self.unique {
            let Some(Value::String(value)) = body.get(*field) else {
                continue;
            };

            let claimed = self.conn.execute(
                "INSERT INTO unique_keys (collection, field, value, document_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![self.name, field, value, id],
            );
            match claimed {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(StoreError::UniqueViolation {
                        field: field.to_string(),
                        value: value.clone(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn release_unique_keys(&self, id: &str) -> StoreResult<()> {
        if !self.unique.is_empty() {
            self.conn.execute(
                "DELETE FROM unique_keys WHERE collection = ?1 AND document_id = ?2",
                params![self.name, id],
            )?;
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(id: String, revision: i64, body: &str) -> StoreResult<Record<T>> {
    Ok(Record {
        id,
        revision,
        data: serde_json::from_str(body)?,
    })
}

/// Run `f` atomically: in its own immediate transaction when the connection
/// is in autocommit mode, otherwise in a savepoint of the open transaction.
fn write_scope<T>(conn: &Connection, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
    let (begin, commit, rollback) = if conn.is_autocommit() {
        ("BEGIN IMMEDIATE", "COMMIT", "ROLLBACK")
    } else {
        (
            "SAVEPOINT store_write",
            "RELEASE store_write",
            "ROLLBACK TO store_write; RELEASE store_write",
        )
    };

    conn.execute_batch(begin)?;
    let result = f().and_then(|value| {
        conn.execute_batch(commit)?;
        Ok(value)
    });

    if result.is_err() {
        if let Err(e) = conn.execute_batch(rollback) {
            tracing::error!("Rollback failed: {}", e);
        }
    }
    result
}
