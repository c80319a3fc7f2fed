//! Blocking template
//!
//! `Template` is the blocking entry point: every call runs the mapping and
//! write protocol on the calling thread and waits on the storage client.
//!
//! # Write operations
//!
//! | Method | Precondition | Bins |
//! |--------|--------------|------|
//! | `save` | generation check when versioned, none otherwise | replace |
//! | `insert` | must not exist | replace |
//! | `update` | generation check when versioned, must exist otherwise | replace |
//! | `persist` | from the record-exists action | from the action |
//! | `add`/`append`/`prepend` | none | named bins only |
//!
//! Full-record writes update the caller's entity in place (its version
//! field) only when the write commits. Narrow operations return an updated
//! copy instead.

use recmap_concurrency::{
    add_ops, append_ops, duplicate_outcome, find_duplicates, prepend_ops, NarrowWrite,
    PreparedWrite, WriteMode,
};
use recmap_core::{
    Error, Operation, OperationKind, ReadRecord, RecordExistsAction, Result, StorageClient,
};
use recmap_mapping::{Converter, Entity, Persist};
use tracing::info;

use crate::config::{ConfigError, TemplateConfig};
use crate::lookup::{self, ReadPlan, TOUCH_AND_READ};

/// Blocking entity operations over a [`StorageClient`]
pub struct Template<C> {
    client: C,
    converter: Converter,
}

impl<C: StorageClient> Template<C> {
    /// Create a template from a validated configuration
    pub fn new(client: C, config: &TemplateConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_converter(client, Converter::new(config.to_settings())))
    }

    /// Create a template around a prepared converter
    pub fn with_converter(client: C, converter: Converter) -> Self {
        info!(namespace = %converter.settings().namespace, adapter = "blocking", "template ready");
        Template { client, converter }
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

    fn write<E: Entity + Clone>(&self, entity: &mut E, mode: WriteMode) -> Result<()> {
        let prepared = PreparedWrite::prepare(&self.converter, entity.clone(), mode)?;
        let (updated, _) = prepared.execute(&self.client).into_result()?;
        *entity = updated;
        Ok(())
    }

    /// Save an entity
    ///
    /// A versioned entity at version 0 is created; at version `v` it
    /// replaces the record only if the record is still at generation `v`.
    /// An unversioned entity overwrites unconditionally.
    pub fn save<E: Entity + Clone>(&self, entity: &mut E) -> Result<()> {
        self.write(entity, WriteMode::Save)
    }

    /// Create a record, failing if one already exists
    pub fn insert<E: Entity + Clone>(&self, entity: &mut E) -> Result<()> {
        self.write(entity, WriteMode::Insert)
    }

    /// Replace an existing record
    pub fn update<E: Entity + Clone>(&self, entity: &mut E) -> Result<()> {
        self.write(entity, WriteMode::Update)
    }

    /// Write with an explicit record-exists action, ignoring the version
    pub fn persist<E: Entity + Clone>(&self, entity: &mut E, action: RecordExistsAction) -> Result<()> {
        self.write(entity, WriteMode::Persist(action))
    }

    /// Insert each entity independently
    ///
    /// Results are returned in input order. An entity sharing its key with
    /// an earlier element is rejected without a storage call; the other
    /// elements are unaffected.
    pub fn insert_all<E: Entity>(&self, entities: Vec<E>) -> Vec<Result<E>> {
        let keys = lookup::batch_keys(&self.converter, &entities);
        let duplicates = find_duplicates(keys.iter().map(Option::as_ref));
        entities
            .into_iter()
            .zip(keys)
            .zip(duplicates)
            .enumerate()
            .map(|(index, ((entity, key), duplicate))| match (key, duplicate) {
                (Some(key), Some(first)) => duplicate_outcome(OperationKind::Insert, key, index, first)
                    .into_result()
                    .map(|(entity, _)| entity),
                _ => PreparedWrite::prepare(&self.converter, entity, WriteMode::Insert)?
                    .execute(&self.client)
                    .into_result()
                    .map(|(entity, _)| entity),
            })
            .collect()
    }

    // ========================================================================
    // Narrow operations
    // ========================================================================

    fn narrow<E: Entity + Clone>(&self, entity: &E, operation: OperationKind, ops: Vec<Operation>) -> Result<E> {
        let narrow = NarrowWrite::prepare(&self.converter, entity.clone(), operation, ops)?;
        narrow
            .execute(&self.client)
            .into_result()
            .map(|(entity, _)| entity)
    }

    /// Add `delta` to an integer bin and return the updated entity
    pub fn add<E: Entity + Clone>(&self, entity: &E, bin: &str, delta: i64) -> Result<E> {
        self.add_many(entity, &[(bin, delta)])
    }

    /// Add to several integer bins in one call
    pub fn add_many<E: Entity + Clone>(&self, entity: &E, values: &[(&str, i64)]) -> Result<E> {
        self.narrow(entity, OperationKind::Add, add_ops(values.iter().copied()))
    }

    /// Append to a string bin and return the updated entity
    pub fn append<E: Entity + Clone>(&self, entity: &E, bin: &str, suffix: &str) -> Result<E> {
        self.append_many(entity, &[(bin, suffix)])
    }

    /// Append to several string bins in one call
    pub fn append_many<E: Entity + Clone>(&self, entity: &E, values: &[(&str, &str)]) -> Result<E> {
        self.narrow(entity, OperationKind::Append, append_ops(values.iter().copied()))
    }

    /// Prepend to a string bin and return the updated entity
    pub fn prepend<E: Entity + Clone>(&self, entity: &E, bin: &str, prefix: &str) -> Result<E> {
        self.prepend_many(entity, &[(bin, prefix)])
    }

    /// Prepend to several string bins in one call
    pub fn prepend_many<E: Entity + Clone>(&self, entity: &E, values: &[(&str, &str)]) -> Result<E> {
        self.narrow(entity, OperationKind::Prepend, prepend_ops(values.iter().copied()))
    }

    // ========================================================================
    // Deletes and reads
    // ========================================================================

    /// Delete the `E` record with identifier `id`
    ///
    /// Returns whether a record existed.
    pub fn delete<E: Entity, I: Persist>(&self, id: &I) -> Result<bool> {
        let key = self.converter.key_for_id::<E, I>(id)?;
        self.client
            .delete(&key)
            .map_err(|err| Error::from_client(OperationKind::Delete, key, err))
    }

    /// Delete the record of an entity
    pub fn delete_entity<E: Entity>(&self, entity: &E) -> Result<bool> {
        let key = lookup::key_of(&self.converter, entity)?;
        self.client
            .delete(&key)
            .map_err(|err| Error::from_client(OperationKind::Delete, key, err))
    }

    /// Delete every `E` record by truncating the type's set
    ///
    /// The set is the one `E` is written to, including any configured
    /// override. Other types sharing the namespace are untouched.
    pub fn delete_all<E: Entity>(&self) -> Result<()> {
        let (namespace, set_name) = lookup::set_of::<E>(&self.converter)?;
        match self.client.truncate(&namespace, &set_name) {
            Ok(()) => Ok(()),
            Err(err) => Err(lookup::truncate_failed(namespace, set_name, err)),
        }
    }

    /// Whether the `E` record with identifier `id` exists
    pub fn exists<E: Entity, I: Persist>(&self, id: &I) -> Result<bool> {
        let key = self.converter.key_for_id::<E, I>(id)?;
        self.client
            .exists(&key)
            .map_err(|err| Error::from_client(OperationKind::Exists, key, err))
    }

    /// Read the `E` record with identifier `id`
    ///
    /// Touch-on-read types refresh the record's time-to-live in the same
    /// call.
    pub fn find_by_id<E: Entity, I: Persist>(&self, id: &I) -> Result<Option<E>> {
        let (descriptor, plan) = lookup::plan_read::<E, I>(&self.converter, id)?;
        let result = match &plan {
            ReadPlan::Get(key) => self.client.get(key),
            ReadPlan::Touch(key, policy) => lookup::touched(self.client.operate(policy, key, TOUCH_AND_READ)),
        };
        lookup::decode_one(&self.converter, &descriptor, plan.key().clone(), result)
    }

    /// Read several records, in the order of `ids`, skipping missing ones
    pub fn find_by_ids<E: Entity, I: Persist>(&self, ids: &[I]) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (descriptor, keys) = lookup::keys_for::<E, I>(&self.converter, ids)?;
        let mut records: Vec<Option<ReadRecord>> = Vec::with_capacity(keys.len());
        for key in keys {
            let record = self
                .client
                .get(&key)
                .map_err(|err| Error::from_client(OperationKind::FindById, key, err))?;
            records.push(record);
        }
        lookup::decode_found(&self.converter, &descriptor, records)
    }
}
