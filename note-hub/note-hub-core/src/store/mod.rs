//! Document store adapter.
//!
//! Documents live at slash separated paths and hold a JSON field map. The
//! only primitive that may combine a read with a write is
//! [`DocumentStore::transact`]; everything else is a plain single-shot call.

mod memory;

pub use memory::InMemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

pub type Fields = Map<String, Value>;

/// Path of a single document, e.g. `users/u1/notes/n1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

/// Path of a collection, e.g. `users/u1/notes/n1/blocks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl DocPath {
    pub fn note(owner_id: &str, note_id: &str) -> Self {
        CollectionPath::notes(owner_id).doc(note_id)
    }

    pub fn block(owner_id: &str, note_id: &str, block_id: &str) -> Self {
        CollectionPath::blocks(owner_id, note_id).doc(block_id)
    }

    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl CollectionPath {
    pub fn notes(owner_id: &str) -> Self {
        CollectionPath(format!("users/{owner_id}/notes"))
    }

    pub fn blocks(owner_id: &str, note_id: &str) -> Self {
        DocPath::note(owner_id, note_id).collection("blocks")
    }

    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a transaction saw when it read its document.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    fields: Option<Fields>,
}

impl Snapshot {
    pub fn new(fields: Option<Fields>) -> Self {
        Self { fields }
    }

    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }
}

/// Write a transaction closure asks the store to commit.
#[derive(Debug, Clone, PartialEq)]
pub enum TxWrite {
    /// Leave the document as it is.
    None,
    /// Overwrite the listed fields and keep the others. Creates the
    /// document when absent.
    Merge(Fields),
    /// Remove the document. A no-op when already absent.
    Delete,
}

/// Body of a transaction.
///
/// The store may call it more than once when a concurrent writer touched the
/// document between read and commit, so it must be free of side effects.
/// Returning `Err` aborts without writing and hands the error back to the
/// caller of `transact`.
pub type TxFn<'a> = dyn FnMut(&Snapshot) -> Result<TxWrite> + Send + 'a;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Fields>>;

    /// Replace the document wholesale.
    async fn set(&self, path: &DocPath, fields: Fields) -> Result<()>;

    /// Overwrite the listed fields, creating the document when absent.
    async fn merge(&self, path: &DocPath, fields: Fields) -> Result<()>;

    async fn delete(&self, path: &DocPath) -> Result<()>;

    /// Insert a document under a store assigned id and return that id.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String>;

    /// Direct children of a collection, in store iteration order.
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Fields)>>;

    /// Atomic read-modify-write on one document.
    ///
    /// The read handed to `f` and the write it returns are applied as one
    /// indivisible unit with respect to every other `transact` on the same
    /// path. Returns the document as committed (`None` when absent).
    async fn transact(&self, path: &DocPath, f: &mut TxFn<'_>) -> Result<Option<Fields>>;
}
