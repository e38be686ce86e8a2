//! Storage layer for ridelog.
//!
//! A small `SQLite`-backed document store: JSON payloads grouped into named
//! collections, addressed by a short content-derived id.

pub mod migrations;
pub mod schema;
mod store;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub use store::{DocumentStore, SqliteDocumentStore};

/// Length of generated document ids, in hex characters.
const DOCUMENT_ID_LEN: usize = 20;

static ID_SALT: AtomicU64 = AtomicU64::new(0);

/// A stored document with its bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    /// Document id.
    pub id: String,
    /// Collection the document belongs to.
    pub collection: String,
    /// When the document was created.
    pub created_at: DateTime<Utc>,
    /// When the document was last written.
    pub updated_at: DateTime<Utc>,
    /// The document body.
    pub payload: serde_json::Value,
}

/// Storage engine for documents.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(
        |_| {
            warn!("Unparseable timestamp in database: {}", value);
            DateTime::<Utc>::UNIX_EPOCH
        },
        |dt| dt.with_timezone(&Utc),
    )
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets `sessions list` read while a recording writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        // Create tables and bring older databases forward
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Derive a fresh id for a document about to be created.
    fn document_id(collection: &str, body: &str, now: DateTime<Utc>) -> String {
        // Two saves of the same path in the same microsecond still differ
        let salt = ID_SALT.fetch_add(1, Ordering::Relaxed);
        let mut hasher = blake3::Hasher::new();
        hasher.update(collection.as_bytes());
        hasher.update(body.as_bytes());
        hasher.update(format_timestamp(now).as_bytes());
        hasher.update(&salt.to_le_bytes());
        let mut id = hasher.finalize().to_hex().to_string();
        id.truncate(DOCUMENT_ID_LEN);
        id
    }

    /// Insert a new document and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the insert fails.
    pub fn create(&self, collection: &str, payload: &serde_json::Value) -> Result<String> {
        let body = serde_json::to_string(payload)?;
        let now = Utc::now();
        let id = Self::document_id(collection, &body, now);
        let ts = format_timestamp(now);

        self.conn.execute(
            r"
            INSERT INTO documents (id, collection, payload, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ",
            params![id, collection, body, ts],
        )?;

        debug!("Created document {} in {}", id, collection);
        Ok(id)
    }

    /// Get a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let row = self
            .conn
            .query_row(
                r"
                SELECT id, collection, payload, created_at, updated_at
                FROM documents WHERE collection = ?1 AND id = ?2
                ",
                params![collection, id],
                Self::row_to_raw,
            )
            .optional()?;

        row.map(RawDocument::into_document).transpose()
    }

    /// Replace a document's payload.
    ///
    /// Returns `true` if a document was updated, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the update fails.
    pub fn update(&self, collection: &str, id: &str, payload: &serde_json::Value) -> Result<bool> {
        let body = serde_json::to_string(payload)?;
        let affected = self.conn.execute(
            "UPDATE documents SET payload = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
            params![body, format_timestamp(Utc::now()), collection, id],
        )?;
        Ok(affected > 0)
    }

    /// Delete a document.
    ///
    /// Returns `true` if a document was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let affected = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(affected > 0)
    }

    /// List documents in a collection, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a payload is corrupt.
    pub fn list(&self, collection: &str, limit: usize) -> Result<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, collection, payload, created_at, updated_at
            FROM documents WHERE collection = ?1
            ORDER BY created_at DESC, rowid DESC LIMIT ?2
            ",
        )?;

        // SQLite wants a signed limit
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![collection, limit_i64], Self::row_to_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawDocument::into_document).collect()
    }

    /// Count documents in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self, collection: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete documents in a collection created more than `max_age` ago.
    ///
    /// Returns the number of documents deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_older_than(&self, collection: &str, max_age: Duration) -> Result<usize> {
        // Timestamps are fixed-width RFC 3339, so text order is time order
        let cutoff = format_timestamp(Utc::now() - max_age);

        let affected = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND created_at < ?2",
            params![collection, cutoff],
        )?;

        if affected > 0 {
            info!("Pruned {} old documents from {}", affected, collection);
        }
        Ok(affected)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (total_documents, oldest, newest): (i64, Option<String>, Option<String>) =
            self.conn.query_row(
                "SELECT COUNT(*), MIN(created_at), MAX(created_at) FROM documents",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        // Get file size
        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_documents,
            oldest_document: oldest.as_deref().map(parse_timestamp),
            newest_document: newest.as_deref().map(parse_timestamp),
            db_size_bytes,
        })
    }

    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawDocument> {
        Ok(RawDocument {
            id: row.get(0)?,
            collection: row.get(1)?,
            payload: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

/// A row before its payload has been decoded.
struct RawDocument {
    id: String,
    collection: String,
    payload: String,
    created_at: String,
    updated_at: String,
}

impl RawDocument {
    fn into_document(self) -> Result<StoredDocument> {
        Ok(StoredDocument {
            payload: serde_json::from_str(&self.payload)?,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            id: self.id,
            collection: self.collection,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of documents across collections.
    pub total_documents: i64,
    /// Creation time of the oldest document.
    pub oldest_document: Option<DateTime<Utc>>,
    /// Creation time of the newest document.
    pub newest_document: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SESSIONS: &str = "sessions";

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_create_and_get() {
        let storage = create_test_storage();
        let id = storage
            .create(SESSIONS, &json!({"pointCount": 2, "userId": "rider"}))
            .unwrap();
        assert_eq!(id.len(), DOCUMENT_ID_LEN);

        let doc = storage.get(SESSIONS, &id).unwrap().unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.collection, SESSIONS);
        assert_eq!(doc.payload["pointCount"], 2);
        assert_eq!(doc.created_at, doc.updated_at);
    }

    #[test]
    fn test_identical_payloads_get_distinct_ids() {
        let storage = create_test_storage();
        let payload = json!({"same": true});
        let a = storage.create(SESSIONS, &payload).unwrap();
        let b = storage.create(SESSIONS, &payload).unwrap();
        assert_ne!(a, b);
        assert_eq!(storage.count(SESSIONS).unwrap(), 2);
    }

    #[test]
    fn test_get_is_scoped_to_collection() {
        let storage = create_test_storage();
        let id = storage.create(SESSIONS, &json!({})).unwrap();
        assert!(storage.get("profiles", &id).unwrap().is_none());
    }

    #[test]
    fn test_get_nonexistent() {
        let storage = create_test_storage();
        assert!(storage.get(SESSIONS, "missing").unwrap().is_none());
    }

    #[test]
    fn test_update() {
        let storage = create_test_storage();
        let id = storage.create(SESSIONS, &json!({"name": "old"})).unwrap();

        assert!(storage.update(SESSIONS, &id, &json!({"name": "new"})).unwrap());
        let doc = storage.get(SESSIONS, &id).unwrap().unwrap();
        assert_eq!(doc.payload["name"], "new");
        assert!(doc.updated_at >= doc.created_at);

        assert!(!storage.update(SESSIONS, "missing", &json!({})).unwrap());
    }

    #[test]
    fn test_delete() {
        let storage = create_test_storage();
        let id = storage.create(SESSIONS, &json!({})).unwrap();

        assert!(storage.delete(SESSIONS, &id).unwrap());
        assert!(storage.get(SESSIONS, &id).unwrap().is_none());
        assert!(!storage.delete(SESSIONS, &id).unwrap());
    }

    #[test]
    fn test_list_newest_first() {
        let storage = create_test_storage();
        for i in 0..5 {
            storage.create(SESSIONS, &json!({ "n": i })).unwrap();
        }
        storage.create("profiles", &json!({})).unwrap();

        let docs = storage.list(SESSIONS, 3).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].payload["n"], 4);
        assert_eq!(docs[2].payload["n"], 2);

        assert_eq!(storage.list(SESSIONS, 100).unwrap().len(), 5);
        assert!(storage.list(SESSIONS, 0).unwrap().is_empty());
    }

    #[test]
    fn test_count_per_collection() {
        let storage = create_test_storage();
        assert_eq!(storage.count(SESSIONS).unwrap(), 0);

        storage.create(SESSIONS, &json!({})).unwrap();
        storage.create("profiles", &json!({})).unwrap();

        assert_eq!(storage.count(SESSIONS).unwrap(), 1);
        assert_eq!(storage.count("profiles").unwrap(), 1);
    }

    #[test]
    fn test_prune_older_than() {
        let storage = create_test_storage();
        storage.create(SESSIONS, &json!({})).unwrap();

        assert_eq!(storage.prune_older_than(SESSIONS, Duration::days(1)).unwrap(), 0);
        assert_eq!(storage.count(SESSIONS).unwrap(), 1);

        // A negative age puts the cutoff in the future.
        assert_eq!(
            storage
                .prune_older_than(SESSIONS, Duration::seconds(-60))
                .unwrap(),
            1
        );
        assert_eq!(storage.count(SESSIONS).unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let storage = create_test_storage();
        let empty = storage.stats().unwrap();
        assert_eq!(empty.total_documents, 0);
        assert!(empty.oldest_document.is_none());

        storage.create(SESSIONS, &json!({})).unwrap();
        storage.create(SESSIONS, &json!({})).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_documents, 2);
        assert!(stats.oldest_document.is_some());
        assert!(stats.oldest_document <= stats.newest_document);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_open_file_based_creates_parent_dirs() {
        let root = std::env::temp_dir().join(format!("ridelog_test_{}", std::process::id()));
        let db_path = root.join("nested/sessions.db");
        let _ = std::fs::remove_dir_all(&root);

        let storage = Storage::open(&db_path).unwrap();
        storage.create(SESSIONS, &json!({"a": 1})).unwrap();
        assert_eq!(storage.path(), db_path);
        assert!(storage.stats().unwrap().db_size_bytes > 0);

        drop(storage);
        let reopened = Storage::open(&db_path).unwrap();
        assert_eq!(reopened.count(SESSIONS).unwrap(), 1);

        drop(reopened);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_timestamp_format_is_sortable() {
        let a = format_timestamp(DateTime::<Utc>::UNIX_EPOCH);
        let b = format_timestamp(Utc::now());
        assert!(a < b);
        assert!(a.ends_with('Z'));
        assert_eq!(parse_timestamp(&a), DateTime::<Utc>::UNIX_EPOCH);
    }
}
