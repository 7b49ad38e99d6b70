//! Bookkeeping shared by every stored document

use bson::{doc, DateTime, Document};
use serde::{Deserialize, Serialize};

/// Creation, update and soft deletion stamps
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// Sort key for history and search; chrono strings do not order reliably
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            is_deleted: false,
            deleted_at: None,
            updated_at: Some(now),
            created_at: Some(now),
        }
    }

    /// `$set` entries refreshing the metadata of an updated document
    pub fn update_fields(deleted: bool) -> Document {
        let now = DateTime::now();
        let mut fields = doc! {
            "metadata.updated_at": now,
            "metadata.is_deleted": deleted,
        };
        if deleted {
            fields.insert("metadata.deleted_at", now);
        }
        fields
    }
}
