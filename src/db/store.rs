//! MongoDB-backed registry store
//!
//! Every transition runs in one multi-document transaction. The parcel write
//! is filtered on its expected version and the transfer write on its expected
//! status, so a lost race matches nothing and the whole transaction aborts.
//! The partial unique index on open transfers backs this up independently.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::ClientSession;
use tracing::{debug, warn};

use crate::db::mongo::{is_duplicate_key, MongoClient, MongoCollection};
use crate::db::schemas::{Metadata, ParcelDoc, TransferDoc, PARCEL_COLLECTION, TRANSFER_COLLECTION};
use crate::model::{Parcel, ParcelQuery, ParcelStatus, Transfer, TransferStatus, VerificationStatus};
use crate::store::{
    open_transfer_conflict, version_conflict, ParcelChange, ParcelStore, RegistryStore,
    TransferStore, Transition,
};
use crate::types::{RegistryError, Result};

pub struct MongoStore {
    client: MongoClient,
    parcels: MongoCollection<ParcelDoc>,
    transfers: MongoCollection<TransferDoc>,
}

impl MongoStore {
    /// Connect, then open both collections and ensure their indexes
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = MongoClient::new(uri, db_name).await?;
        let parcels = client.collection::<ParcelDoc>(PARCEL_COLLECTION).await?;
        let transfers = client.collection::<TransferDoc>(TRANSFER_COLLECTION).await?;
        Ok(Self {
            client,
            parcels,
            transfers,
        })
    }

    async fn parcel_exists(&self, parcel_id: &str) -> Result<bool> {
        Ok(self
            .parcels
            .find_one(doc! { "parcelId": parcel_id })
            .await?
            .is_some())
    }

    async fn transfers_matching(&self, filter: Document, newest_first: bool) -> Result<Vec<Transfer>> {
        let direction = if newest_first { -1 } else { 1 };
        let docs = self
            .transfers
            .find_many(filter, doc! { "metadata.created_at": direction }, None)
            .await?;
        Ok(docs.into_iter().map(|d| d.transfer).collect())
    }

    /// Both writes of a transition; the caller owns commit/abort
    async fn apply(&self, transition: &Transition, session: &mut ClientSession) -> Result<()> {
        let parcel = &transition.parcel;
        let transfer = &transition.transfer;

        let result = self
            .parcels
            .update_in(
                doc! {
                    "parcelId": &parcel.parcel_id,
                    "version": transition.expected_parcel_version,
                    "metadata.is_deleted": { "$ne": true },
                },
                doc! { "$set": parcel_update(parcel)? },
                session,
            )
            .await
            .map_err(map_write_error)?;
        if result.matched_count == 0 {
            return Err(if self.parcel_exists(&parcel.parcel_id).await? {
                version_conflict(&parcel.parcel_id)
            } else {
                RegistryError::NotFound(format!("Parcel {} not found", parcel.parcel_id))
            });
        }

        match transition.expected_transfer_status {
            None => {
                self.transfers
                    .insert_in(TransferDoc::new(transfer.clone()), session)
                    .await
                    .map_err(|e| {
                        if is_duplicate_key(&e) {
                            open_transfer_conflict(&transfer.parcel_id)
                        } else {
                            map_write_error(e)
                        }
                    })?;
            }
            Some(expected) => {
                let mut set = bson::to_document(transfer)?;
                set.insert("isOpen", transfer.status.is_open());
                set.extend(Metadata::update_fields(false));

                let result = self
                    .transfers
                    .update_in(
                        doc! { "transferId": &transfer.transfer_id, "status": expected.as_str() },
                        doc! { "$set": set },
                        session,
                    )
                    .await
                    .map_err(map_write_error)?;
                if result.matched_count == 0 {
                    return Err(RegistryError::Conflict(format!(
                        "Transfer {} was modified concurrently",
                        transfer.transfer_id
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parcel_update(parcel: &Parcel) -> Result<Document> {
    let mut set = bson::to_document(parcel)?;
    set.extend(Metadata::update_fields(parcel.deleted));
    Ok(set)
}

/// Write conflicts inside a transaction mean another request got there first
fn map_write_error(err: mongodb::error::Error) -> RegistryError {
    if err.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) {
        RegistryError::Conflict("Concurrent modification, please retry".into())
    } else {
        RegistryError::Storage(err.to_string())
    }
}

fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn contains_ci(value: &str) -> Bson {
    Bson::Document(doc! { "$regex": escape_regex(value), "$options": "i" })
}

/// Translate a search query into a MongoDB filter
fn search_filter(query: &ParcelQuery) -> Document {
    let mut filter = doc! {
        "verification": VerificationStatus::Verified.as_str(),
        "status": ParcelStatus::Active.as_str(),
        "deleted": { "$ne": true },
    };

    if let Some(q) = query.q.as_deref().filter(|q| !q.is_empty()) {
        let fields = [
            "parcelId",
            "address.street",
            "address.city",
            "address.state",
            "address.postalCode",
        ];
        let any: Vec<Bson> = fields
            .iter()
            .map(|f| {
                let mut clause = Document::new();
                clause.insert(*f, contains_ci(q));
                Bson::Document(clause)
            })
            .collect();
        filter.insert("$or", any);
    }
    if let Some(city) = query.city.as_deref() {
        filter.insert("address.city", contains_ci(city));
    }
    if let Some(state) = query.state.as_deref() {
        filter.insert("address.state", contains_ci(state));
    }
    if let Some(postal_code) = query.postal_code.as_deref() {
        filter.insert("address.postalCode", contains_ci(postal_code));
    }
    if let Some(classification) = query.classification {
        filter.insert("classification", classification.as_str());
    }

    let mut area = Document::new();
    if let Some(min) = query.min_area {
        area.insert("$gte", min);
    }
    if let Some(max) = query.max_area {
        area.insert("$lte", max);
    }
    if !area.is_empty() {
        filter.insert("area", area);
    }
    filter
}

#[async_trait]
impl ParcelStore for MongoStore {
    async fn get_parcel(&self, parcel_id: &str) -> Result<Option<Parcel>> {
        Ok(self
            .parcels
            .find_one(doc! { "parcelId": parcel_id })
            .await?
            .map(|d| d.parcel)
            .filter(|p| !p.deleted))
    }

    async fn search_parcels(&self, query: &ParcelQuery, limit: usize) -> Result<Vec<Parcel>> {
        let docs = self
            .parcels
            .find_many(
                search_filter(query),
                doc! { "metadata.created_at": -1 },
                Some(limit as i64),
            )
            .await?;
        Ok(docs.into_iter().map(|d| d.parcel).collect())
    }

    async fn save_parcel(&self, change: ParcelChange) -> Result<()> {
        let parcel_id = change.parcel.parcel_id.clone();

        match change.expected_version {
            None => {
                self.parcels
                    .insert_one(ParcelDoc::new(change.parcel))
                    .await
                    .map_err(|e| {
                        if is_duplicate_key(&e) {
                            RegistryError::Conflict(format!(
                                "Parcel {} is already registered",
                                parcel_id
                            ))
                        } else {
                            RegistryError::Storage(e.to_string())
                        }
                    })?;
            }
            Some(expected) => {
                let result = self
                    .parcels
                    .update_one(
                        doc! {
                            "parcelId": &parcel_id,
                            "version": expected,
                            "metadata.is_deleted": { "$ne": true },
                        },
                        doc! { "$set": parcel_update(&change.parcel)? },
                    )
                    .await?;
                if result.matched_count == 0 {
                    return Err(if self.parcel_exists(&parcel_id).await? {
                        version_conflict(&parcel_id)
                    } else {
                        RegistryError::NotFound(format!("Parcel {} not found", parcel_id))
                    });
                }
            }
        }

        debug!(parcel_id = %parcel_id, action = ?change.action, "Parcel saved");
        Ok(())
    }
}

#[async_trait]
impl TransferStore for MongoStore {
    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>> {
        Ok(self
            .transfers
            .find_one(doc! { "transferId": transfer_id })
            .await?
            .map(|d| d.transfer))
    }

    async fn open_transfer_for(&self, parcel_id: &str) -> Result<Option<Transfer>> {
        Ok(self
            .transfers
            .find_one(doc! { "parcelId": parcel_id, "isOpen": true })
            .await?
            .map(|d| d.transfer))
    }

    async fn transfers_for_parcel(&self, parcel_id: &str) -> Result<Vec<Transfer>> {
        self.transfers_matching(doc! { "parcelId": parcel_id }, false)
            .await
    }

    async fn transfers_involving(&self, identity: &str) -> Result<Vec<Transfer>> {
        self.transfers_matching(
            doc! {
                "$or": [
                    { "fromOwner": identity },
                    { "toOwner": identity },
                    { "initiatedBy": identity },
                ]
            },
            true,
        )
        .await
    }

    async fn transfers_with_status(&self, status: TransferStatus) -> Result<Vec<Transfer>> {
        self.transfers_matching(doc! { "status": status.as_str() }, false)
            .await
    }
}

#[async_trait]
impl RegistryStore for MongoStore {
    fn backend_name(&self) -> &'static str {
        "mongo"
    }

    async fn commit(&self, mut transition: Transition) -> Result<()> {
        transition.normalize();
        transition.check_consistency()?;

        let mut session = self.client.start_session().await?;
        session
            .start_transaction()
            .await
            .map_err(|e| RegistryError::Storage(format!("Failed to start transaction: {}", e)))?;

        if let Err(e) = self.apply(&transition, &mut session).await {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!(error = %abort_err, "Failed to abort transaction");
            }
            return Err(e);
        }

        session
            .commit_transaction()
            .await
            .map_err(map_write_error)?;

        debug!(
            parcel_id = %transition.parcel.parcel_id,
            transfer_id = %transition.transfer.transfer_id,
            "Transition committed"
        );
        Ok(())
    }
}
