use super::{CollectionPath, DocPath, DocumentStore, Fields, Snapshot, TxFn, TxWrite};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

const MAX_TX_ATTEMPTS: usize = 8;

struct Stored {
    fields: Fields,
    revision: u64,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Stored>,
    next_revision: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn put(&mut self, path: &str, fields: Fields) {
        let revision = self.bump();
        self.docs.insert(path.to_string(), Stored { fields, revision });
    }
}

/// Process-local document store.
///
/// Transactions are optimistic: the closure runs against a copy of the
/// document taken under the mutex, and the write is only committed if no
/// other writer bumped the document revision in the meantime. On conflict
/// the closure is run again against the fresh state.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, path: &DocPath) -> (Snapshot, Option<u64>) {
        let inner = self.inner.lock();
        match inner.docs.get(path.as_str()) {
            Some(doc) => (Snapshot::new(Some(doc.fields.clone())), Some(doc.revision)),
            None => (Snapshot::new(None), None),
        }
    }
}

fn merge_into(target: &mut Fields, patch: Fields) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Fields>> {
        let inner = self.inner.lock();
        Ok(inner.docs.get(path.as_str()).map(|d| d.fields.clone()))
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> Result<()> {
        self.inner.lock().put(path.as_str(), fields);
        Ok(())
    }

    async fn merge(&self, path: &DocPath, fields: Fields) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut merged = inner
            .docs
            .remove(path.as_str())
            .map(|d| d.fields)
            .unwrap_or_default();
        merge_into(&mut merged, fields);
        inner.put(path.as_str(), merged);
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.docs.remove(path.as_str()).is_some() {
            inner.bump();
        }
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String> {
        let mut inner = self.inner.lock();
        loop {
            let id = Uuid::new_v4().simple().to_string();
            let path = collection.doc(&id);
            if !inner.docs.contains_key(path.as_str()) {
                inner.put(path.as_str(), fields);
                return Ok(id);
            }
        }
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Fields)>> {
        let prefix = format!("{}/", collection.as_str());
        let inner = self.inner.lock();
        let docs = inner
            .docs
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, doc)| {
                let id = &key[prefix.len()..];
                (!id.contains('/')).then(|| (id.to_string(), doc.fields.clone()))
            })
            .collect();
        Ok(docs)
    }

    async fn transact(&self, path: &DocPath, f: &mut TxFn<'_>) -> Result<Option<Fields>> {
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let (snapshot, revision) = self.read(path);
            let write = f(&snapshot)?;

            let mut inner = self.inner.lock();
            let current = inner.docs.get(path.as_str()).map(|d| d.revision);
            if current != revision {
                drop(inner);
                warn!(%path, attempt, "transaction contention, retrying");
                continue;
            }
            return Ok(match write {
                TxWrite::None => snapshot.fields().cloned(),
                TxWrite::Merge(patch) => {
                    let mut fields = snapshot.fields().cloned().unwrap_or_default();
                    merge_into(&mut fields, patch);
                    inner.put(path.as_str(), fields.clone());
                    Some(fields)
                }
                TxWrite::Delete => {
                    if inner.docs.remove(path.as_str()).is_some() {
                        inner.bump();
                    }
                    None
                }
            });
        }
        Err(CoreError::Internal(format!(
            "transaction on {path} gave up after {MAX_TX_ATTEMPTS} attempts"
        )))
    }
}
