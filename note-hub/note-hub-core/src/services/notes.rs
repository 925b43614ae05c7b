//! Whole-note field patches. No leases or versions here: concurrent edits to
//! the same note are last-write-wins.

use crate::access::AccessGate;
use crate::clock::Clock;
use crate::config::HubConfig;
use crate::error::{ensure_present, CoreError, Result};
use crate::model::{cap_tags, timestamp, Identity, Note, NoteDraft, NotePatch};
use crate::store::{CollectionPath, DocPath, DocumentStore};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteUpdate {
    /// The patch carried no fields.
    Unchanged,
    Updated,
}

#[derive(Clone)]
pub struct NoteService {
    gate: AccessGate,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    max_tags: usize,
}

impl NoteService {
    pub fn new(
        gate: AccessGate,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: &HubConfig,
    ) -> Self {
        Self {
            gate,
            store,
            clock,
            max_tags: config.max_tags,
        }
    }

    /// Create a note owned by the caller.
    pub async fn create(&self, identity: &Identity, draft: NoteDraft) -> Result<Note> {
        let title = draft.title.unwrap_or_default();
        let content = draft.content.unwrap_or_default();
        if title.is_empty() && content.is_empty() {
            return Err(CoreError::BadRequest("title or content required".into()));
        }

        let now = self.clock.now();
        let mut note = Note {
            id: String::new(),
            owner_id: identity.uid.clone(),
            title: title.trim().to_string(),
            content,
            tags: cap_tags(&draft.tags.unwrap_or_default(), self.max_tags),
            stack: draft.stack.map(|s| s.trim().to_string()).unwrap_or_default(),
            chapter: draft.chapter,
            section: draft.section,
            collaborators: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        note.id = self
            .store
            .add(&CollectionPath::notes(&identity.uid), note.to_fields()?)
            .await?;
        info!(owner = %identity.uid, note = %note.id, "note created");
        Ok(note)
    }

    pub async fn get(&self, identity: &Identity, owner_id: &str, note_id: &str) -> Result<Note> {
        ensure_present(&[("ownerId", owner_id), ("noteId", note_id)])?;
        self.gate.require_read(identity, owner_id, note_id).await
    }

    /// Patch the supplied fields of a note. `owner_id` defaults to the
    /// caller for notes they own.
    pub async fn update(
        &self,
        identity: &Identity,
        owner_id: Option<&str>,
        note_id: &str,
        patch: NotePatch,
    ) -> Result<NoteUpdate> {
        ensure_present(&[("id", note_id)])?;
        let owner_id = owner_id.filter(|o| !o.is_empty()).unwrap_or(&identity.uid);
        self.gate.require_write(identity, owner_id, note_id).await?;

        let mut fields = patch.to_fields(self.max_tags);
        if fields.is_empty() {
            return Ok(NoteUpdate::Unchanged);
        }
        fields.insert("updatedAt".into(), timestamp(self.clock.now()));
        self.store.merge(&DocPath::note(owner_id, note_id), fields).await?;
        Ok(NoteUpdate::Updated)
    }

    /// Delete a note together with its blocks.
    pub async fn delete(&self, identity: &Identity, owner_id: Option<&str>, note_id: &str) -> Result<()> {
        ensure_present(&[("id", note_id)])?;
        let owner_id = owner_id.filter(|o| !o.is_empty()).unwrap_or(&identity.uid);
        self.gate.require_write(identity, owner_id, note_id).await?;
        self.remove(owner_id, note_id).await?;
        info!(owner = owner_id, note = note_id, by = %identity.uid, "note deleted");
        Ok(())
    }

    /// Delete every note of the caller filed under `stack`. Notes shared
    /// with the caller by others are never touched.
    pub async fn delete_by_stack(&self, identity: &Identity, stack: &str) -> Result<usize> {
        ensure_present(&[("stack", stack)])?;
        let stack = stack.trim();
        let notes = self.store.list(&CollectionPath::notes(&identity.uid)).await?;
        let mut deleted = 0;
        for (note_id, fields) in notes {
            let note = Note::from_fields(&identity.uid, &note_id, &fields)?;
            if note.stack == stack {
                self.remove(&identity.uid, &note_id).await?;
                deleted += 1;
            }
        }
        info!(owner = %identity.uid, stack, deleted, "notes deleted by stack");
        Ok(deleted)
    }

    async fn remove(&self, owner_id: &str, note_id: &str) -> Result<()> {
        self.store.delete(&DocPath::note(owner_id, note_id)).await?;
        let blocks = CollectionPath::blocks(owner_id, note_id);
        for (block_id, _) in self.store.list(&blocks).await? {
            self.store.delete(&blocks.doc(&block_id)).await?;
        }
        Ok(())
    }
}
