//! Parcel document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::model::Parcel;

/// Collection name for parcels
pub const PARCEL_COLLECTION: &str = "parcels";

/// Parcel document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ParcelDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Domain record, stored inline with camelCase field names
    #[serde(flatten)]
    pub parcel: Parcel,
}

impl ParcelDoc {
    pub fn new(parcel: Parcel) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            parcel,
        }
    }
}

impl IntoIndexes for ParcelDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Covers soft-deleted records, so an id is never reused
            (
                doc! { "parcelId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("parcel_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "owner": 1 },
                Some(
                    IndexOptions::builder()
                        .name("owner_index".to_string())
                        .build(),
                ),
            ),
            // Public search filter
            (
                doc! { "verification": 1, "status": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("search_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ParcelDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
