//! SQLite-backed local sync adapter.
//!
//! # Responsibility
//! - Persist record snapshots as JSON text rows keyed by `(kind, id)`.
//! - Serve collection reads for one record type in insertion order.
//!
//! # Invariants
//! - `create` assigns a UUID v4 identity when the record has none.
//! - Read responses are JSON *text*, so callers exercise response parsing.
//! - `update`/`delete` of a missing row fail with `NotFound`.
//! - A store stamped with a newer `user_version` than [`STORE_LAYOUT`] is
//!   never opened.

use crate::model::change::Attributes;
use crate::sync::adapter::{
    RecordSnapshot, SyncAction, SyncAdapter, SyncCallback, SyncError, SyncRequest, SyncResult,
    SyncSubject,
};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Row layout written by this adapter, mirrored to `PRAGMA user_version`.
pub const STORE_LAYOUT: u32 = 1;

const RECORDS_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS records (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (kind, id)
);
CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
";

/// Failure opening a [`SqliteSync`] store.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// The file was stamped by a newer build of this adapter.
    NewerLayout { found: u32, supported: u32 },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::NewerLayout { found, supported } => write!(
                f,
                "store layout {found} is newer than supported layout {supported}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::NewerLayout { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Local adapter storing records in a `records` table.
pub struct SqliteSync {
    conn: Connection,
}

impl SqliteSync {
    /// Opens a store file, creating the `records` table on first use.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::prepare("file", Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::prepare("memory", Connection::open_in_memory()?)
    }

    fn prepare(mode: &str, mut conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let found: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if found > STORE_LAYOUT {
            warn!(
                "event=store_open module=sync status=error mode={mode} layout={found} supported={STORE_LAYOUT}"
            );
            return Err(StoreError::NewerLayout {
                found,
                supported: STORE_LAYOUT,
            });
        }
        if found < STORE_LAYOUT {
            let tx = conn.transaction()?;
            tx.execute_batch(RECORDS_TABLE_SQL)?;
            tx.pragma_update(None, "user_version", STORE_LAYOUT)?;
            tx.commit()?;
        }
        info!(
            "event=store_open module=sync status=ok mode={mode} layout={STORE_LAYOUT} created={}",
            found < STORE_LAYOUT
        );
        Ok(Self { conn })
    }

    /// Number of stored rows of one record type.
    pub fn count(&self, kind: &str) -> Result<usize, SyncError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE kind = ?1;",
            [kind],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn handle(&self, request: &SyncRequest) -> SyncResult {
        match (&request.subject, request.action) {
            (SyncSubject::Record(snapshot), SyncAction::Create) => self.create(snapshot),
            (SyncSubject::Record(snapshot), SyncAction::Read) => self.read(snapshot),
            (SyncSubject::Record(snapshot), SyncAction::Update) => self.update(snapshot),
            (SyncSubject::Record(snapshot), SyncAction::Delete) => self.delete(snapshot),
            (SyncSubject::Collection { kind }, SyncAction::Read) => self.read_all(kind),
            (SyncSubject::Collection { kind }, action) => Err(SyncError::InvalidRequest(format!(
                "collection `{kind}` does not support {action}"
            ))),
        }
    }

    fn create(&self, snapshot: &RecordSnapshot) -> SyncResult {
        let mut attributes = snapshot.attributes.clone();
        let id = match &snapshot.id {
            Some(id) => id.clone(),
            None => {
                let generated = Value::String(Uuid::new_v4().to_string());
                attributes.insert(snapshot.id_attribute.clone(), generated.clone());
                generated
            }
        };
        let key = id_key(&id);
        let now = now_epoch_ms();
        self.conn.execute(
            "INSERT INTO records (kind, id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4);",
            params![snapshot.kind, key, encode_body(&attributes)?, now],
        )?;
        Ok(Some(Value::Object(attributes)))
    }

    fn read(&self, snapshot: &RecordSnapshot) -> SyncResult {
        let key = require_key(snapshot, SyncAction::Read)?;
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM records WHERE kind = ?1 AND id = ?2;",
                params![snapshot.kind, key],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(Value::String(body))),
            None => Err(not_found(snapshot, key)),
        }
    }

    fn update(&self, snapshot: &RecordSnapshot) -> SyncResult {
        let key = require_key(snapshot, SyncAction::Update)?;
        let changed = self.conn.execute(
            "UPDATE records SET body = ?3, updated_at = ?4 WHERE kind = ?1 AND id = ?2;",
            params![
                snapshot.kind,
                key,
                encode_body(&snapshot.attributes)?,
                now_epoch_ms()
            ],
        )?;
        if changed == 0 {
            return Err(not_found(snapshot, key));
        }
        Ok(Some(Value::Object(snapshot.attributes.clone())))
    }

    fn delete(&self, snapshot: &RecordSnapshot) -> SyncResult {
        let key = require_key(snapshot, SyncAction::Delete)?;
        let changed = self.conn.execute(
            "DELETE FROM records WHERE kind = ?1 AND id = ?2;",
            params![snapshot.kind, key],
        )?;
        if changed == 0 {
            return Err(not_found(snapshot, key));
        }
        Ok(None)
    }

    fn read_all(&self, kind: &str) -> SyncResult {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM records WHERE kind = ?1 ORDER BY rowid;")?;
        let bodies = stmt
            .query_map([kind], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Value::String(format!("[{}]", bodies.join(",")))))
    }
}

impl SyncAdapter for SqliteSync {
    fn sync(&self, request: SyncRequest, callback: SyncCallback) {
        let result = self.handle(&request);
        match &result {
            Ok(_) => debug!(
                "event=sqlite_sync module=sync status=ok kind={} action={}",
                request.subject.kind(),
                request.action
            ),
            Err(err) => warn!(
                "event=sqlite_sync module=sync status=error kind={} action={} error_code={} error={}",
                request.subject.kind(),
                request.action,
                err.code(),
                err
            ),
        }
        callback(result);
    }
}

/// Row key for an identity value: strings as-is, everything else as JSON text.
fn id_key(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn require_key(snapshot: &RecordSnapshot, action: SyncAction) -> Result<String, SyncError> {
    snapshot.id.as_ref().map(id_key).ok_or_else(|| {
        SyncError::InvalidRequest(format!(
            "cannot {action} {} `{}` without an identity",
            snapshot.kind, snapshot.client_id
        ))
    })
}

fn not_found(snapshot: &RecordSnapshot, key: String) -> SyncError {
    SyncError::NotFound {
        kind: snapshot.kind.clone(),
        id: key,
    }
}

fn encode_body(attributes: &Attributes) -> Result<String, SyncError> {
    serde_json::to_string(attributes).map_err(|err| SyncError::Storage(err.to_string()))
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
