//! MongoDB client and collection wrapper

use bson::{doc, DateTime, Document};
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, ClientSession, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use futures_util::{Stream, TryStreamExt};
use tracing::info;

use crate::db::schemas::Metadata;
use crate::types::RegistryError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping the database
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, RegistryError> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast when the server is unreachable
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| RegistryError::Storage(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| RegistryError::Storage(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, creating its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, RegistryError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Start a session for a multi-document transaction.
    ///
    /// Transactions need a replica set (a single-node one is enough).
    pub async fn start_session(&self) -> Result<ClientSession, RegistryError> {
        self.client
            .start_session()
            .await
            .map_err(|e| RegistryError::Storage(format!("Failed to start session: {}", e)))
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, RegistryError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), RegistryError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| RegistryError::Storage(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document inside `session`, setting metadata timestamps.
    ///
    /// Driver errors are returned unmapped so callers can detect duplicate keys.
    pub async fn insert_in(
        &self,
        mut item: T,
        session: &mut ClientSession,
    ) -> Result<(), mongodb::error::Error> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        self.inner.insert_one(item).session(session).await?;
        Ok(())
    }

    /// Insert a document outside any transaction
    pub async fn insert_one(&self, mut item: T) -> Result<(), mongodb::error::Error> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        self.inner.insert_one(item).await?;
        Ok(())
    }

    /// Find one live document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, RegistryError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        self.inner
            .find_one(full_filter)
            .await
            .map_err(|e| RegistryError::Storage(format!("Find failed: {}", e)))
    }

    /// Find live documents by filter with a sort order and optional limit
    pub async fn find_many(
        &self,
        filter: Document,
        sort: Document,
        limit: Option<i64>,
    ) -> Result<Vec<T>, RegistryError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let mut find = self.inner.find(full_filter).sort(sort);
        if let Some(limit) = limit {
            find = find.limit(limit);
        }
        let cursor = find
            .await
            .map_err(|e| RegistryError::Storage(format!("Find failed: {}", e)))?;

        collect_documents(cursor).await
    }

    /// Update one document outside any transaction
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, mongodb::error::Error> {
        self.inner.update_one(filter, update.into()).await
    }

    /// Update one document inside `session`
    pub async fn update_in(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        session: &mut ClientSession,
    ) -> Result<UpdateResult, mongodb::error::Error> {
        self.inner
            .update_one(filter, update.into())
            .session(session)
            .await
    }
}

/// Drain a cursor; one unreadable document fails the whole read
async fn collect_documents<T, E, S>(cursor: S) -> Result<Vec<T>, RegistryError>
where
    S: Stream<Item = Result<T, E>>,
    E: std::fmt::Display,
{
    cursor
        .map_err(|e| RegistryError::Storage(format!("Failed to read document: {}", e)))
        .try_collect()
        .await
}

/// Whether a driver error is a unique index violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    const DUPLICATE_KEY: i32 = 11000;
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_collect_documents_keeps_order() {
        let cursor = stream::iter(vec![Ok::<_, String>(1), Ok(2), Ok(3)]);
        assert_eq!(collect_documents(cursor).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unreadable_document_fails_read() {
        let cursor = stream::iter(vec![Ok(1), Err("missing field `parcelId`"), Ok(3)]);
        let err = collect_documents::<i32, _, _>(cursor).await.unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));
        assert!(err.to_string().contains("parcelId"));
    }
}
