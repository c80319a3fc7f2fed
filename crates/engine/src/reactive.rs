//! Non-blocking template
//!
//! `ReactiveTemplate` mirrors [`Template`](crate::Template) over an
//! [`AsyncStorageClient`]. Encoding and policy resolution run eagerly
//! when a call starts; only the storage call is awaited, and
//! reconciliation runs after it resumes.
//!
//! Dropping a write future before it completes leaves the caller's entity
//! exactly as it was.
//!
//! Batch inserts await their elements one after the other.

use recmap_concurrency::{
    add_ops, append_ops, duplicate_outcome, find_duplicates, prepend_ops, NarrowWrite,
    PreparedWrite, WriteMode,
};
use recmap_core::{
    AsyncStorageClient, Error, Operation, OperationKind, ReadRecord, RecordExistsAction, Result,
};
use recmap_mapping::{Converter, Entity, Persist};
use tracing::info;

use crate::config::{ConfigError, TemplateConfig};
use crate::lookup::{self, ReadPlan, TOUCH_AND_READ};

/// Non-blocking entity operations over an [`AsyncStorageClient`]
pub struct ReactiveTemplate<C> {
    client: C,
    converter: Converter,
}

impl<C: AsyncStorageClient> ReactiveTemplate<C> {
    /// Create a template from a validated configuration
    pub fn new(client: C, config: &TemplateConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_converter(client, Converter::new(config.to_settings())))
    }

    /// Create a template around a prepared converter
    pub fn with_converter(client: C, converter: Converter) -> Self {
        info!(namespace = %converter.settings().namespace, adapter = "reactive", "template ready");
        ReactiveTemplate { client, converter }
    }

    /// Converter used for every call
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Underlying storage client
    pub fn client(&self) -> &C {
        &self.client
    }

    // ========================================================================
    // Full-record writes
    // ========================================================================

    async fn write<E: Entity + Clone>(&self, entity: &mut E, mode: WriteMode) -> Result<()> {
        let prepared = PreparedWrite::prepare(&self.converter, entity.clone(), mode)?;
        let (updated, _) = prepared.execute_async(&self.client).await.into_result()?;
        *entity = updated;
        Ok(())
    }

    /// Save an entity; see [`Template::save`](crate::Template::save)
    pub async fn save<E: Entity + Clone>(&self, entity: &mut E) -> Result<()> {
        self.write(entity, WriteMode::Save).await
    }

    /// Create a record, failing if one already exists
    pub async fn insert<E: Entity + Clone>(&self, entity: &mut E) -> Result<()> {
        self.write(entity, WriteMode::Insert).await
    }

    /// Replace an existing record
    pub async fn update<E: Entity + Clone>(&self, entity: &mut E) -> Result<()> {
        self.write(entity, WriteMode::Update).await
    }

    /// Write with an explicit record-exists action, ignoring the version
    pub async fn persist<E: Entity + Clone>(&self, entity: &mut E, action: RecordExistsAction) -> Result<()> {
        self.write(entity, WriteMode::Persist(action)).await
    }

    /// Insert each entity independently, results in input order
    pub async fn insert_all<E: Entity>(&self, entities: Vec<E>) -> Vec<Result<E>> {
        let keys = lookup::batch_keys(&self.converter, &entities);
        let duplicates = find_duplicates(keys.iter().map(Option::as_ref));
        let mut results = Vec::with_capacity(entities.len());
        for (index, ((entity, key), duplicate)) in entities.into_iter().zip(keys).zip(duplicates).enumerate() {
            let result = match (key, duplicate) {
                (Some(key), Some(first)) => duplicate_outcome(OperationKind::Insert, key, index, first)
                    .into_result()
                    .map(|(entity, _)| entity),
                _ => match PreparedWrite::prepare(&self.converter, entity, WriteMode::Insert) {
                    Ok(prepared) => prepared
                        .execute_async(&self.client)
                        .await
                        .into_result()
                        .map(|(entity, _)| entity),
                    Err(err) => Err(err),
                },
            };
            results.push(result);
        }
        results
    }

    // ========================================================================
    // Narrow operations
    // ========================================================================

    async fn narrow<E: Entity + Clone>(&self, entity: &E, operation: OperationKind, ops: Vec<Operation>) -> Result<E> {
        let narrow = NarrowWrite::prepare(&self.converter, entity.clone(), operation, ops)?;
        narrow
            .execute_async(&self.client)
            .await
            .into_result()
            .map(|(entity, _)| entity)
    }

    /// Add `delta` to an integer bin and return the updated entity
    pub async fn add<E: Entity + Clone>(&self, entity: &E, bin: &str, delta: i64) -> Result<E> {
        self.add_many(entity, &[(bin, delta)]).await
    }

    /// Add to several integer bins in one call
    pub async fn add_many<E: Entity + Clone>(&self, entity: &E, values: &[(&str, i64)]) -> Result<E> {
        self.narrow(entity, OperationKind::Add, add_ops(values.iter().copied())).await
    }

    /// Append to a string bin and return the updated entity
    pub async fn append<E: Entity + Clone>(&self, entity: &E, bin: &str, suffix: &str) -> Result<E> {
        self.append_many(entity, &[(bin, suffix)]).await
    }

    /// Append to several string bins in one call
    pub async fn append_many<E: Entity + Clone>(&self, entity: &E, values: &[(&str, &str)]) -> Result<E> {
        self.narrow(entity, OperationKind::Append, append_ops(values.iter().copied())).await
    }

    /// Prepend to a string bin and return the updated entity
    pub async fn prepend<E: Entity + Clone>(&self, entity: &E, bin: &str, prefix: &str) -> Result<E> {
        self.prepend_many(entity, &[(bin, prefix)]).await
    }

    /// Prepend to several string bins in one call
    pub async fn prepend_many<E: Entity + Clone>(&self, entity: &E, values: &[(&str, &str)]) -> Result<E> {
        self.narrow(entity, OperationKind::Prepend, prepend_ops(values.iter().copied())).await
    }

    // ========================================================================
    // Deletes and reads
    // ========================================================================

    /// Delete the `E` record with identifier `id`
    pub async fn delete<E: Entity, I: Persist>(&self, id: &I) -> Result<bool> {
        let key = self.converter.key_for_id::<E, I>(id)?;
        self.client
            .delete(&key)
            .await
            .map_err(|err| Error::from_client(OperationKind::Delete, key, err))
    }

    /// Delete the record of an entity
    pub async fn delete_entity<E: Entity>(&self, entity: &E) -> Result<bool> {
        let key = lookup::key_of(&self.converter, entity)?;
        self.client
            .delete(&key)
            .await
            .map_err(|err| Error::from_client(OperationKind::Delete, key, err))
    }

    /// Delete every `E` record by truncating the type's set
    pub async fn delete_all<E: Entity>(&self) -> Result<()> {
        let (namespace, set_name) = lookup::set_of::<E>(&self.converter)?;
        match self.client.truncate(&namespace, &set_name).await {
            Ok(()) => Ok(()),
            Err(err) => Err(lookup::truncate_failed(namespace, set_name, err)),
        }
    }

    /// Whether the `E` record with identifier `id` exists
    pub async fn exists<E: Entity, I: Persist>(&self, id: &I) -> Result<bool> {
        let key = self.converter.key_for_id::<E, I>(id)?;
        self.client
            .exists(&key)
            .await
            .map_err(|err| Error::from_client(OperationKind::Exists, key, err))
    }

    /// Read the `E` record with identifier `id`
    pub async fn find_by_id<E: Entity, I: Persist>(&self, id: &I) -> Result<Option<E>> {
        let (descriptor, plan) = lookup::plan_read::<E, I>(&self.converter, id)?;
        let result = match &plan {
            ReadPlan::Get(key) => self.client.get(key).await,
            ReadPlan::Touch(key, policy) => lookup::touched(self.client.operate(policy, key, TOUCH_AND_READ).await),
        };
        lookup::decode_one(&self.converter, &descriptor, plan.key().clone(), result)
    }

    /// Read several records, in the order of `ids`, skipping missing ones
    pub async fn find_by_ids<E: Entity, I: Persist>(&self, ids: &[I]) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (descriptor, keys) = lookup::keys_for::<E, I>(&self.converter, ids)?;
        let mut records: Vec<Option<ReadRecord>> = Vec::with_capacity(keys.len());
        for key in keys {
            let record = self
                .client
                .get(&key)
                .await
                .map_err(|err| Error::from_client(OperationKind::FindById, key, err))?;
            records.push(record);
        }
        lookup::decode_found(&self.converter, &descriptor, records)
    }
}
