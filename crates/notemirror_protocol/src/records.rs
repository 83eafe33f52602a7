//! Entity records carried in sync chunks and kept in local metadata.

use crate::hash::ContentHash;
use serde::{Deserialize, Deserializer, Serialize};

/// A notebook known to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookRecord {
    /// Notebook identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl NotebookRecord {
    /// Creates a notebook record.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A tag known to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    /// Tag identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent tag, if this tag is nested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl TagRecord {
    /// Creates a top-level tag record.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
        }
    }

    /// Sets the parent tag.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Body metadata of a resource. The body itself is never part of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceData {
    /// Digest of the resource body.
    pub body_hash: ContentHash,
    /// Body size in bytes, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A binary attachment referenced by a note.
///
/// Resources are owned by their note: they enter and leave the local mirror
/// together with the note that references them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource identifier.
    pub id: String,
    /// Body metadata.
    pub data: ResourceData,
    /// MIME type, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl ResourceRef {
    /// Creates a resource reference with the given body digest.
    pub fn new(id: impl Into<String>, body_hash: ContentHash) -> Self {
        Self {
            id: id.into(),
            data: ResourceData {
                body_hash,
                size: None,
            },
            mime: None,
        }
    }

    /// Returns the digest of the resource body.
    pub fn body_hash(&self) -> &ContentHash {
        &self.data.body_hash
    }
}

/// A note as reported in a sync chunk.
///
/// A note with `active == false` is a tombstone: the note was deleted
/// upstream and must leave the local present set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    /// Note identifier.
    pub id: String,
    /// Digest of the note content.
    pub content_hash: ContentHash,
    /// False for deleted notes.
    pub active: bool,
    /// Attachments referenced by the note.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub resources: Vec<ResourceRef>,
    /// Note title, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Owning notebook, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    /// Tags applied to the note.
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_empty")]
    pub tag_ids: Vec<String>,
    /// Update sequence number of the last change to this note.
    #[serde(default)]
    pub usn: u64,
}

impl NoteRecord {
    /// Creates an active note with no resources.
    pub fn new(id: impl Into<String>, content_hash: ContentHash) -> Self {
        Self {
            id: id.into(),
            content_hash,
            active: true,
            resources: Vec::new(),
            title: None,
            notebook_id: None,
            tag_ids: Vec::new(),
            usn: 0,
        }
    }

    /// Creates a tombstone for a deleted note.
    pub fn tombstone(id: impl Into<String>) -> Self {
        let mut note = Self::new(id, ContentHash::default());
        note.active = false;
        note
    }

    /// Adds a resource reference.
    pub fn with_resource(mut self, resource: ResourceRef) -> Self {
        self.resources.push(resource);
        self
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the owning notebook.
    pub fn with_notebook(mut self, notebook_id: impl Into<String>) -> Self {
        self.notebook_id = Some(notebook_id.into());
        self
    }

    /// Sets the update sequence number.
    pub fn with_usn(mut self, usn: u64) -> Self {
        self.usn = usn;
        self
    }

    /// Iterates over the identifiers of referenced resources.
    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|r| r.id.as_str())
    }
}

/// Remote SDKs send `null` for empty lists.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
