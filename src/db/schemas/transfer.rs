//! Transfer document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::model::Transfer;

/// Collection name for transfers
pub const TRANSFER_COLLECTION: &str = "transfers";

/// Transfer document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TransferDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Mirrors `transfer.status.is_open()`; backs the one-open-transfer index
    #[serde(rename = "isOpen", default)]
    pub is_open: bool,

    #[serde(flatten)]
    pub transfer: Transfer,
}

impl TransferDoc {
    pub fn new(transfer: Transfer) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            is_open: transfer.status.is_open(),
            transfer,
        }
    }
}

impl IntoIndexes for TransferDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "transferId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("transfer_id_unique".to_string())
                        .build(),
                ),
            ),
            // At most one open transfer per parcel
            (
                doc! { "parcelId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "isOpen": true })
                        .name("one_open_transfer_per_parcel".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "parcelId": 1, "metadata.created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("parcel_history_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "status": 1, "metadata.created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_queue_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TransferDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
