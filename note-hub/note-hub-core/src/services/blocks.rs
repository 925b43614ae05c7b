//! Block reads and guarded block writes.
//!
//! Every write that looks at the lease or the version runs as a single
//! `transact` on the block document. Checks happen in a fixed order: the
//! block must exist, then the lease guard, then the version guard. The first
//! failure aborts the transaction with nothing written.

use crate::access::AccessGate;
use crate::clock::Clock;
use crate::config::HubConfig;
use crate::error::{ensure_present, CoreError, Resource, Result};
use crate::lock::{lease_fields, Lease, LeaseLock};
use crate::model::{timestamp, Block, BlockPatch, Identity, NewBlock, DEFAULT_BLOCK_TYPE, INITIAL_VERSION};
use crate::store::{CollectionPath, DocPath, DocumentStore, Fields, TxWrite};
use crate::version::{check_version, next_version};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct BlockService {
    gate: AccessGate,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    lock: LeaseLock,
}

fn stamp_author(fields: &mut Fields, identity: &Identity, now: DateTime<Utc>) {
    fields.insert("updatedBy".into(), Value::String(identity.uid.clone()));
    fields.insert(
        "updatedByDisplayName".into(),
        Value::String(identity.display_name.clone().unwrap_or_default()),
    );
    fields.insert(
        "updatedByEmail".into(),
        Value::String(identity.email.clone().unwrap_or_default()),
    );
    fields.insert("updatedAt".into(), timestamp(now));
}

fn existing(block_id: &str, fields: Option<&Fields>) -> Result<Block> {
    let fields = fields.ok_or(CoreError::NotFound(Resource::Block))?;
    Block::from_fields(block_id, fields)
}

impl BlockService {
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
            lock: LeaseLock::new(config.lease_ttl()),
        }
    }

    /// Blocks of a note in display order. Blocks sharing an index keep the
    /// order the store listed them in.
    pub async fn list(&self, identity: &Identity, owner_id: &str, note_id: &str) -> Result<Vec<Block>> {
        ensure_present(&[("ownerId", owner_id), ("noteId", note_id)])?;
        self.gate.require_read(identity, owner_id, note_id).await?;

        let docs = self.store.list(&CollectionPath::blocks(owner_id, note_id)).await?;
        let mut blocks = docs
            .iter()
            .map(|(id, fields)| Block::from_fields(id, fields))
            .collect::<Result<Vec<_>>>()?;
        blocks.sort_by_key(|b| b.index);
        Ok(blocks)
    }

    pub async fn create(
        &self,
        identity: &Identity,
        owner_id: &str,
        note_id: &str,
        new: NewBlock,
    ) -> Result<Block> {
        ensure_present(&[("ownerId", owner_id), ("noteId", note_id)])?;
        let index = new
            .index
            .ok_or_else(|| CoreError::BadRequest("index required".into()))?
            .max(0);
        self.gate.require_write(identity, owner_id, note_id).await?;

        let now = self.clock.now();
        let mut block = Block {
            id: String::new(),
            index,
            block_type: new.block_type.unwrap_or_else(|| DEFAULT_BLOCK_TYPE.to_string()),
            text: new.text.unwrap_or_default(),
            version: INITIAL_VERSION,
            updated_by: identity.uid.clone(),
            updated_by_display_name: identity.display_name.clone().unwrap_or_default(),
            updated_by_email: identity.email.clone().unwrap_or_default(),
            updated_at: Some(now),
            lock_holder: None,
            lock_until: None,
        };
        block.id = self
            .store
            .add(&CollectionPath::blocks(owner_id, note_id), block.to_fields()?)
            .await?;
        info!(owner = owner_id, note = note_id, block = %block.id, index, "block created");
        Ok(block)
    }

    /// Apply a partial patch through the lease and version guards.
    ///
    /// Returns the block as committed, carrying its new version.
    pub async fn update(
        &self,
        identity: &Identity,
        owner_id: &str,
        note_id: &str,
        block_id: &str,
        patch: BlockPatch,
        expected_version: Option<u64>,
    ) -> Result<Block> {
        ensure_present(&[("ownerId", owner_id), ("noteId", note_id), ("blockId", block_id)])?;
        self.gate.require_write(identity, owner_id, note_id).await?;

        let lock = self.lock;
        let clock = &self.clock;
        let path = DocPath::block(owner_id, note_id, block_id);
        let committed = self
            .store
            .transact(&path, &mut |snap| {
                let now = clock.now();
                let current = existing(block_id, snap.fields())?;
                lock.guard(current.lease().as_ref(), &identity.uid, now)?;
                check_version(current.version, expected_version)?;

                let mut fields = Fields::new();
                patch.apply(&mut fields);
                fields.insert("version".into(), Value::from(next_version(current.version)));
                stamp_author(&mut fields, identity, now);
                Ok(TxWrite::Merge(fields))
            })
            .await?
            .ok_or_else(|| CoreError::Internal(format!("{path} vanished after update")))?;

        let block = Block::from_fields(block_id, &committed)?;
        debug!(%path, version = block.version, by = %identity.uid, "block updated");
        Ok(block)
    }

    /// Remove a block. Succeeds when it is already gone; the flag tells
    /// whether this call removed it.
    pub async fn delete(&self, identity: &Identity, owner_id: &str, note_id: &str, block_id: &str) -> Result<bool> {
        ensure_present(&[("ownerId", owner_id), ("noteId", note_id), ("blockId", block_id)])?;
        self.gate.require_write(identity, owner_id, note_id).await?;

        let lock = self.lock;
        let clock = &self.clock;
        let path = DocPath::block(owner_id, note_id, block_id);
        let mut removed = false;
        self.store
            .transact(&path, &mut |snap| {
                removed = snap.exists();
                let Some(fields) = snap.fields() else {
                    return Ok(TxWrite::None);
                };
                let current = Block::from_fields(block_id, fields)?;
                lock.guard(current.lease().as_ref(), &identity.uid, clock.now())?;
                Ok(TxWrite::Delete)
            })
            .await?;
        if removed {
            info!(%path, by = %identity.uid, "block deleted");
        } else {
            debug!(%path, "block already absent");
        }
        Ok(removed)
    }

    pub async fn acquire_lock(
        &self,
        identity: &Identity,
        owner_id: &str,
        note_id: &str,
        block_id: &str,
    ) -> Result<Lease> {
        self.lease_transition(identity, owner_id, note_id, block_id, |lock, current, uid, now| {
            lock.acquire(current, uid, now).map(Some)
        })
        .await?
        .ok_or_else(|| CoreError::Internal("lease missing after acquire".into()))
    }

    pub async fn renew_lock(
        &self,
        identity: &Identity,
        owner_id: &str,
        note_id: &str,
        block_id: &str,
    ) -> Result<Lease> {
        self.lease_transition(identity, owner_id, note_id, block_id, |lock, current, uid, now| {
            lock.renew(current, uid, now).map(Some)
        })
        .await?
        .ok_or_else(|| CoreError::Internal("lease missing after renew".into()))
    }

    pub async fn release_lock(
        &self,
        identity: &Identity,
        owner_id: &str,
        note_id: &str,
        block_id: &str,
    ) -> Result<()> {
        self.lease_transition(identity, owner_id, note_id, block_id, |lock, current, uid, _now| {
            lock.release(current, uid).map(|()| None)
        })
        .await?;
        Ok(())
    }

    /// Run one lease state change as a transaction on the block and return
    /// the lease as committed. Lease changes leave `version` alone.
    async fn lease_transition<F>(
        &self,
        identity: &Identity,
        owner_id: &str,
        note_id: &str,
        block_id: &str,
        transition: F,
    ) -> Result<Option<Lease>>
    where
        F: Fn(&LeaseLock, Option<&Lease>, &str, DateTime<Utc>) -> Result<Option<Lease>> + Send + Sync,
    {
        ensure_present(&[("ownerId", owner_id), ("noteId", note_id), ("blockId", block_id)])?;
        self.gate.require_read(identity, owner_id, note_id).await?;

        let lock = self.lock;
        let clock = &self.clock;
        let path = DocPath::block(owner_id, note_id, block_id);
        let committed = self
            .store
            .transact(&path, &mut |snap| {
                let current = existing(block_id, snap.fields())?;
                let next = transition(&lock, current.lease().as_ref(), &identity.uid, clock.now())?;
                Ok(TxWrite::Merge(lease_fields(next.as_ref())))
            })
            .await?
            .ok_or(CoreError::NotFound(Resource::Block))?;

        let lease = Block::from_fields(block_id, &committed)?.lease();
        debug!(%path, caller = %identity.uid, holder = ?lease.as_ref().map(|l| &l.holder), "lease changed");
        Ok(lease)
    }
}
