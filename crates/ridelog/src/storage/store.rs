//! The document store collaborator.

use chrono::Duration;
use tokio::sync::Mutex;

use super::{Storage, StoredDocument};
use crate::error::Result;

/// Most documents returned by a single listing.
const LIST_LIMIT: usize = 1000;

/// A remote or local document database.
///
/// The sampler only calls [`create_document`](Self::create_document); the
/// remaining operations serve session management.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write a new document and return its id.
    async fn create_document(&self, collection: &str, payload: serde_json::Value)
        -> Result<String>;

    /// Read one document.
    async fn read_document(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>>;

    /// Replace a document's payload. Returns `false` if it does not exist.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<bool>;

    /// Delete a document. Returns `false` if it does not exist.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool>;

    /// List a collection, newest first.
    async fn list_documents(&self, collection: &str) -> Result<Vec<StoredDocument>>;
}

/// [`DocumentStore`] backed by a local [`Storage`] database.
#[derive(Debug)]
pub struct SqliteDocumentStore {
    storage: Mutex<Storage>,
}

impl SqliteDocumentStore {
    /// Wrap an opened database.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }

    /// Delete documents in `collection` older than `max_age`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn prune_older_than(&self, collection: &str, max_age: Duration) -> Result<usize> {
        self.storage
            .lock()
            .await
            .prune_older_than(collection, max_age)
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create_document(
        &self,
        collection: &str,
        payload: serde_json::Value,
    ) -> Result<String> {
        self.storage.lock().await.create(collection, &payload)
    }

    async fn read_document(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        self.storage.lock().await.get(collection, id)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<bool> {
        self.storage.lock().await.update(collection, id, &payload)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        self.storage.lock().await.delete(collection, id)
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        self.storage.lock().await.list(collection, LIST_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::new(Storage::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_crud_through_trait() {
        let store = store();
        let store: &dyn DocumentStore = &store;

        let id = store
            .create_document("sessions", json!({"pointCount": 1}))
            .await
            .unwrap();

        let doc = store.read_document("sessions", &id).await.unwrap().unwrap();
        assert_eq!(doc.payload["pointCount"], 1);

        assert!(store
            .update_document("sessions", &id, json!({"pointCount": 3}))
            .await
            .unwrap());
        let listed = store.list_documents("sessions").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].payload["pointCount"], 3);

        assert!(store.delete_document("sessions", &id).await.unwrap());
        assert!(store.read_document("sessions", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prune_through_wrapper() {
        let store = store();
        store.create_document("sessions", json!({})).await.unwrap();

        let pruned = store
            .prune_older_than("sessions", Duration::days(30))
            .await
            .unwrap();
        assert_eq!(pruned, 0);
    }
}
