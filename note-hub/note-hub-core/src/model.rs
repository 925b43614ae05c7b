//! Notes, blocks and the patches that mutate them.
//!
//! Field names on the wire and in the store are camelCase so documents
//! written by older clients keep loading.

use crate::error::{CoreError, Result};
use crate::lock::Lease;
use crate::store::Fields;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_BLOCK_TYPE: &str = "paragraph";
pub const INITIAL_VERSION: u64 = 1;

/// Authenticated caller.
///
/// Display name and email are informational only; `uid` is the sole value
/// compared by access and lock checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stack: String,
    #[serde(default)]
    pub chapter: Option<i64>,
    #[serde(default)]
    pub section: Option<i64>,
    #[serde(default)]
    pub collaborators: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Decode a stored note.
    ///
    /// Older documents carry the owner under `owner` or not at all, in which
    /// case the owner segment of the document path applies.
    pub fn from_fields(path_owner: &str, id: &str, fields: &Fields) -> Result<Self> {
        let mut note: Note = decode(fields)?;
        note.id = id.to_string();
        if note.owner_id.is_empty() {
            note.owner_id = fields
                .get("owner")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(path_owner)
                .to_string();
        }
        Ok(note)
    }

    pub fn to_fields(&self) -> Result<Fields> {
        let mut fields = encode(self)?;
        fields.remove("id");
        fields.insert("owner".into(), Value::String(self.owner_id.clone()));
        Ok(fields)
    }

    pub fn is_collaborator(&self, uid: &str) -> bool {
        self.collaborators.iter().any(|c| c == uid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub index: i64,
    #[serde(rename = "type", default = "default_block_type")]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "initial_version")]
    pub version: u64,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default)]
    pub updated_by_display_name: String,
    #[serde(default)]
    pub updated_by_email: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lock_holder: Option<String>,
    #[serde(default)]
    pub lock_until: Option<DateTime<Utc>>,
}

fn default_block_type() -> String {
    DEFAULT_BLOCK_TYPE.to_string()
}

fn initial_version() -> u64 {
    INITIAL_VERSION
}

impl Block {
    pub fn from_fields(id: &str, fields: &Fields) -> Result<Self> {
        let mut block: Block = decode(fields)?;
        block.id = id.to_string();
        Ok(block)
    }

    pub fn to_fields(&self) -> Result<Fields> {
        let mut fields = encode(self)?;
        fields.remove("id");
        Ok(fields)
    }

    /// Stored lease, whether or not it is still active.
    ///
    /// A half-populated pair is treated as no lease at all.
    pub fn lease(&self) -> Option<Lease> {
        match (&self.lock_holder, self.lock_until) {
            (Some(holder), Some(until)) => Some(Lease {
                holder: holder.clone(),
                until,
            }),
            _ => None,
        }
    }
}

/// Input for a new block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
    pub index: Option<i64>,
    #[serde(rename = "type")]
    pub block_type: Option<String>,
    pub text: Option<String>,
}

/// Partial block update; `None` leaves the stored value as it is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPatch {
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub block_type: Option<String>,
    pub index: Option<i64>,
}

impl BlockPatch {
    pub(crate) fn apply(&self, fields: &mut Fields) {
        if let Some(text) = &self.text {
            fields.insert("text".into(), Value::String(text.clone()));
        }
        if let Some(block_type) = &self.block_type {
            fields.insert("type".into(), Value::String(block_type.clone()));
        }
        if let Some(index) = self.index {
            fields.insert("index".into(), Value::from(index));
        }
    }
}

/// Input for a new note.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub stack: Option<String>,
    pub chapter: Option<i64>,
    pub section: Option<i64>,
}

/// Partial note update. There is deliberately no owner field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub stack: Option<String>,
    pub chapter: Option<i64>,
    pub section: Option<i64>,
}

impl NotePatch {
    /// Fields this patch would write, with title and stack trimmed and tags
    /// capped at `max_tags`. Empty when nothing was supplied.
    pub(crate) fn to_fields(&self, max_tags: usize) -> Fields {
        let mut fields = Fields::new();
        if let Some(title) = &self.title {
            fields.insert("title".into(), Value::String(title.trim().to_string()));
        }
        if let Some(content) = &self.content {
            fields.insert("content".into(), Value::String(content.clone()));
        }
        if let Some(stack) = &self.stack {
            fields.insert("stack".into(), Value::String(stack.trim().to_string()));
        }
        if let Some(chapter) = self.chapter {
            fields.insert("chapter".into(), Value::from(chapter));
        }
        if let Some(section) = self.section {
            fields.insert("section".into(), Value::from(section));
        }
        if let Some(tags) = &self.tags {
            fields.insert("tags".into(), Value::from(cap_tags(tags, max_tags)));
        }
        fields
    }
}

pub(crate) fn cap_tags(tags: &[String], max_tags: usize) -> Vec<String> {
    tags.iter().take(max_tags).cloned().collect()
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value).map_err(CoreError::internal)? {
        Value::Object(fields) => Ok(fields),
        other => Err(CoreError::Internal(format!(
            "expected an object, encoded {other}"
        ))),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(fields: &Fields) -> Result<T> {
    serde_json::from_value(Value::Object(fields.clone())).map_err(CoreError::internal)
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
