//! In-process document store.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    Document, DocumentStore, ETag, Filter, NewDocument, Patch, Result,
    StoreError,
};

/// Document store kept in memory.
///
/// Documents are lost when the process stops.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<Vec<Document>>,
    version: AtomicU64,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create a new empty [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation.
    #[cfg(test)]
    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn next_etag(&self) -> ETag {
        ETag::new(
            (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string(),
        )
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, document: NewDocument) -> Result<Document> {
        let mut documents = self.documents.write().await;

        if documents.iter().any(|doc| {
            doc.id == document.id || doc.partition_key == document.partition_key
        }) {
            return Err(StoreError::Conflict);
        }

        let stored = Document {
            id: document.id,
            partition_key: document.partition_key,
            etag: self.next_etag(),
            body: document.body,
        };
        documents.push(stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(stored)
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|doc| filter.matches(&doc.body))
            .cloned()
            .collect())
    }

    async fn patch(
        &self,
        id: &str,
        partition_key: &str,
        patches: &[Patch],
        if_match: Option<&ETag>,
    ) -> Result<Document> {
        let mut documents = self.documents.write().await;

        let document = documents
            .iter_mut()
            .find(|doc| doc.id == id && doc.partition_key == partition_key)
            .ok_or(StoreError::NotFound)?;

        if if_match.is_some_and(|etag| *etag != document.etag) {
            return Err(StoreError::PreconditionFailed);
        }

        document.body = Patch::apply_all(patches, &document.body)?;
        document.etag = self.next_etag();
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(document.clone())
    }
}

/// Store where another writer changes a document right before the next
/// guarded patch reaches it.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RacingStore {
    pub(crate) inner: MemoryStore,
    armed: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RacingStore {
    /// Name written by the concurrent writer.
    pub(crate) const WRITER: &'static str = "Concurrent writer";

    /// Let the next guarded patch lose the race.
    pub(crate) fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl DocumentStore for RacingStore {
    async fn create(&self, document: NewDocument) -> Result<Document> {
        self.inner.create(document).await
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Document>> {
        self.inner.query(filter).await
    }

    async fn patch(
        &self,
        id: &str,
        partition_key: &str,
        patches: &[Patch],
        if_match: Option<&ETag>,
    ) -> Result<Document> {
        if if_match.is_some() && self.armed.swap(false, Ordering::SeqCst) {
            let name = Patch::set("name", serde_json::Value::from(Self::WRITER));
            self.inner.patch(id, partition_key, &[name], None).await?;
        }

        self.inner.patch(id, partition_key, patches, if_match).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(id: &str, key: &str) -> NewDocument {
        NewDocument {
            id: id.into(),
            partition_key: key.into(),
            body: json!({ "id": id, "email": key, "patients": [] }),
        }
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let store = MemoryStore::new();
        store.create(doc("1", "a@x.com")).await.unwrap();

        assert!(matches!(
            store.create(doc("2", "a@x.com")).await,
            Err(StoreError::Conflict)
        ));
        assert!(matches!(
            store.create(doc("1", "b@x.com")).await,
            Err(StoreError::Conflict)
        ));
        assert_eq!(store.query(&Filter::new()).await.unwrap().len(), 1);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_query_in_creation_order() {
        let store = MemoryStore::new();
        store.create(doc("b", "b@x.com")).await.unwrap();
        store.create(doc("a", "a@x.com")).await.unwrap();

        let ids: Vec<_> = store
            .query(&Filter::new())
            .await
            .unwrap()
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        assert_eq!(ids, ["b", "a"]);

        let found = store
            .query(&Filter::new().with("email", "a@x.com"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[tokio::test]
    async fn test_patch_with_etag() {
        let store = MemoryStore::new();
        let created = store.create(doc("1", "a@x.com")).await.unwrap();
        let patches = [Patch::append("patients", json!("p@x.com"))];

        let updated = store
            .patch("1", "a@x.com", &patches, Some(&created.etag))
            .await
            .unwrap();
        assert_ne!(updated.etag, created.etag);
        assert_eq!(updated.body["patients"], json!(["p@x.com"]));

        // Stale version is rejected and nothing is written.
        assert!(matches!(
            store
                .patch("1", "a@x.com", &patches, Some(&created.etag))
                .await,
            Err(StoreError::PreconditionFailed)
        ));
        assert_eq!(store.writes(), 2);

        // Blind patch still goes through.
        let blind = store.patch("1", "a@x.com", &patches, None).await.unwrap();
        assert_eq!(blind.body["patients"], json!(["p@x.com", "p@x.com"]));
    }

    #[tokio::test]
    async fn test_patch_wrong_partition() {
        let store = MemoryStore::new();
        store.create(doc("1", "a@x.com")).await.unwrap();

        assert!(matches!(
            store.patch("1", "b@x.com", &[], None).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.patch("2", "a@x.com", &[], None).await,
            Err(StoreError::NotFound)
        ));
    }
}
