//! Who may see and change a note.
//!
//! A note is readable by its owner and by every listed collaborator.
//! Writing uses the same rule: any collaborator may edit, reorder and delete
//! blocks and the note itself. Only the owner may change who collaborates.

use crate::auth::TokenVerifier;
use crate::clock::Clock;
use crate::error::{ensure_present, CoreError, Resource, Result};
use crate::model::{timestamp, Identity, Note};
use crate::store::{DocPath, DocumentStore, Fields, TxWrite};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

pub fn can_read(identity: &Identity, note: &Note) -> bool {
    note.owner_id == identity.uid || note.is_collaborator(&identity.uid)
}

pub fn can_write(identity: &Identity, note: &Note) -> bool {
    can_read(identity, note)
}

/// Result of replacing a note's collaborator list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorsUpdate {
    /// Same set as before, nothing written.
    Unchanged,
    Updated { count: usize },
}

#[derive(Clone)]
pub struct AccessGate {
    store: Arc<dyn DocumentStore>,
    verifier: Arc<dyn TokenVerifier>,
    clock: Arc<dyn Clock>,
}

impl AccessGate {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn TokenVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            verifier,
            clock,
        }
    }

    pub async fn authenticate(&self, credential: &str) -> Result<Identity> {
        if credential.trim().is_empty() {
            return Err(CoreError::Unauthenticated);
        }
        self.verifier
            .verify(credential)
            .await
            .map(Identity::from)
            .ok_or(CoreError::Unauthenticated)
    }

    pub async fn load_note(&self, owner_id: &str, note_id: &str) -> Result<Note> {
        let fields = self
            .store
            .get(&DocPath::note(owner_id, note_id))
            .await?
            .ok_or(CoreError::NotFound(Resource::Note))?;
        Note::from_fields(owner_id, note_id, &fields)
    }

    pub async fn require_read(&self, identity: &Identity, owner_id: &str, note_id: &str) -> Result<Note> {
        let note = self.load_note(owner_id, note_id).await?;
        if can_read(identity, &note) {
            Ok(note)
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    pub async fn require_write(&self, identity: &Identity, owner_id: &str, note_id: &str) -> Result<Note> {
        let note = self.load_note(owner_id, note_id).await?;
        if can_write(identity, &note) {
            Ok(note)
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    /// Replace the collaborator list of a note the caller owns.
    ///
    /// Blank ids and duplicates are dropped. The comparison with the stored
    /// list ignores order.
    pub async fn set_collaborators(
        &self,
        identity: &Identity,
        owner_id: &str,
        note_id: &str,
        collaborators: Vec<String>,
    ) -> Result<CollaboratorsUpdate> {
        ensure_present(&[("ownerId", owner_id), ("noteId", note_id)])?;
        if identity.uid != owner_id {
            return Err(CoreError::PermissionDenied);
        }

        let mut wanted: Vec<String> = Vec::with_capacity(collaborators.len());
        for uid in collaborators {
            let uid = uid.trim().to_string();
            if !uid.is_empty() && !wanted.contains(&uid) {
                wanted.push(uid);
            }
        }
        let wanted_set: BTreeSet<&str> = wanted.iter().map(String::as_str).collect();
        let now = self.clock.now();

        let mut unchanged = false;
        self.store
            .transact(&DocPath::note(owner_id, note_id), &mut |snap| {
                let fields = snap.fields().ok_or(CoreError::NotFound(Resource::Note))?;
                let note = Note::from_fields(owner_id, note_id, fields)?;
                let current: BTreeSet<&str> = note.collaborators.iter().map(String::as_str).collect();
                unchanged = current == wanted_set;
                if unchanged {
                    return Ok(TxWrite::None);
                }
                let mut patch = Fields::new();
                patch.insert("collaborators".into(), Value::from(wanted.clone()));
                patch.insert("updatedAt".into(), timestamp(now));
                Ok(TxWrite::Merge(patch))
            })
            .await?;

        if unchanged {
            return Ok(CollaboratorsUpdate::Unchanged);
        }
        info!(owner = owner_id, note = note_id, count = wanted.len(), "collaborators updated");
        Ok(CollaboratorsUpdate::Updated {
            count: wanted.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Hs256Verifier;
    use crate::clock::SystemClock;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn note_with(owner: &str, collaborators: &[&str]) -> Note {
        let fields = json!({"ownerId": owner, "collaborators": collaborators})
            .as_object()
            .cloned()
            .unwrap();
        Note::from_fields(owner, "n1", &fields).unwrap()
    }

    async fn gate_with_note(owner: &str, collaborators: &[&str]) -> (AccessGate, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let note = note_with(owner, collaborators);
        store
            .set(&DocPath::note(owner, "n1"), note.to_fields().unwrap())
            .await
            .unwrap();
        let gate = AccessGate::new(
            store.clone(),
            Arc::new(Hs256Verifier::new("k".into())),
            Arc::new(SystemClock),
        );
        (gate, store)
    }

    #[test]
    fn owner_and_collaborators_may_read_and_write() {
        let note = note_with("alice", &["bob"]);
        for uid in ["alice", "bob"] {
            assert!(can_read(&Identity::new(uid), &note));
            assert!(can_write(&Identity::new(uid), &note));
        }
        assert!(!can_read(&Identity::new("carol"), &note));
        assert!(!can_write(&Identity::new("carol"), &note));
    }

    #[tokio::test]
    async fn missing_note_is_not_found_not_denied() {
        let (gate, _) = gate_with_note("alice", &[]).await;
        let err = gate
            .require_read(&Identity::new("carol"), "alice", "missing")
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::NotFound(Resource::Note));

        let err = gate
            .require_write(&Identity::new("carol"), "alice", "n1")
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::PermissionDenied);
    }

    #[tokio::test]
    async fn blank_credential_is_unauthenticated() {
        let (gate, _) = gate_with_note("alice", &[]).await;
        assert_eq!(gate.authenticate("").await, Err(CoreError::Unauthenticated));
        assert_eq!(gate.authenticate("garbage").await, Err(CoreError::Unauthenticated));
    }

    #[tokio::test]
    async fn only_owner_sets_collaborators() {
        let (gate, _) = gate_with_note("alice", &["bob"]).await;
        let err = gate
            .set_collaborators(&Identity::new("bob"), "alice", "n1", vec!["carol".into()])
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::PermissionDenied);
    }

    #[tokio::test]
    async fn owner_check_comes_before_existence() {
        let (gate, _) = gate_with_note("alice", &[]).await;
        let err = gate
            .set_collaborators(&Identity::new("bob"), "alice", "missing", vec![])
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::PermissionDenied);

        let err = gate
            .set_collaborators(&Identity::new("alice"), "alice", "missing", vec![])
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::NotFound(Resource::Note));
    }

    #[tokio::test]
    async fn same_set_in_other_order_is_unchanged() {
        let (gate, store) = gate_with_note("alice", &["bob", "carol"]).await;
        let before = store.get(&DocPath::note("alice", "n1")).await.unwrap();

        let outcome = gate
            .set_collaborators(
                &Identity::new("alice"),
                "alice",
                "n1",
                vec!["carol".into(), "bob".into(), "bob".into()],
            )
            .await
            .unwrap();
        assert_eq!(outcome, CollaboratorsUpdate::Unchanged);
        assert_eq!(store.get(&DocPath::note("alice", "n1")).await.unwrap(), before);
    }

    #[tokio::test]
    async fn new_set_is_written() {
        let (gate, _) = gate_with_note("alice", &["bob"]).await;
        let outcome = gate
            .set_collaborators(&Identity::new("alice"), "alice", "n1", vec!["dave".into(), " ".into()])
            .await
            .unwrap();
        assert_eq!(outcome, CollaboratorsUpdate::Updated { count: 1 });

        let note = gate.load_note("alice", "n1").await.unwrap();
        assert_eq!(note.collaborators, vec!["dave".to_string()]);
        assert!(note.updated_at.is_some());
        assert!(can_write(&Identity::new("dave"), &note));
        assert!(!can_read(&Identity::new("bob"), &note));
    }
}
