//! Read and batch planning shared by both templates
//!
//! The templates differ only in how they wait on the client; the keys
//! they address and the way they decode and classify results live here.

use std::sync::Arc;

use recmap_core::{
    ClientError, Error, Key, Operation, OperationKind, PreconditionError, ReadRecord, Result,
    ResultCode, WritePolicy,
};
use recmap_mapping::{describe, Converter, Entity, EntityDescriptor, Persist};

/// Touch the record and read every bin in one call
pub(crate) const TOUCH_AND_READ: &[Operation] = &[Operation::Touch, Operation::GetAll];

/// How a point read is issued
pub(crate) enum ReadPlan {
    /// Plain get
    Get(Key),
    /// Touch with the type's expiration, then read
    Touch(Key, WritePolicy),
}

impl ReadPlan {
    pub(crate) fn key(&self) -> &Key {
        match self {
            ReadPlan::Get(key) | ReadPlan::Touch(key, _) => key,
        }
    }
}

/// Plan a point read of the `E` record with identifier `id`
pub(crate) fn plan_read<E: Entity, I: Persist>(
    cx: &Converter,
    id: &I,
) -> Result<(Arc<EntityDescriptor<E>>, ReadPlan)> {
    let descriptor = describe::<E>()?;
    let key = cx.key_for_id::<E, I>(id)?;
    if !descriptor.touch_on_read() {
        return Ok((descriptor, ReadPlan::Get(key)));
    }
    if descriptor.expiration_field().is_some() {
        return Err(PreconditionError::TouchOnReadWithExpirationField {
            type_tag: descriptor.type_tag().to_string(),
        }
        .into());
    }
    let policy = WritePolicy::new().with_expiration(descriptor.default_expiration());
    Ok((descriptor, ReadPlan::Touch(key, policy)))
}

/// A touch on a missing record reads as absent
pub(crate) fn touched(
    result: std::result::Result<ReadRecord, ClientError>,
) -> std::result::Result<Option<ReadRecord>, ClientError> {
    match result {
        Ok(record) => Ok(Some(record)),
        Err(err) if err.code == ResultCode::KeyNotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Decode a point-read result
pub(crate) fn decode_one<E>(
    cx: &Converter,
    descriptor: &EntityDescriptor<E>,
    key: Key,
    result: std::result::Result<Option<ReadRecord>, ClientError>,
) -> Result<Option<E>> {
    match result {
        Ok(Some(record)) => Ok(Some(cx.from_record_with(descriptor, record)?)),
        Ok(None) => Ok(None),
        Err(err) => Err(Error::from_client(OperationKind::FindById, key, err)),
    }
}

/// Keys for a multi-get, in id order
pub(crate) fn keys_for<E: Entity, I: Persist>(
    cx: &Converter,
    ids: &[I],
) -> Result<(Arc<EntityDescriptor<E>>, Vec<Key>)> {
    let descriptor = describe::<E>()?;
    let keys = ids
        .iter()
        .map(|id| cx.key_for_id::<E, I>(id))
        .collect::<Result<Vec<_>>>()?;
    Ok((descriptor, keys))
}

/// Decode a multi-get result, skipping missing records
pub(crate) fn decode_found<E>(
    cx: &Converter,
    descriptor: &EntityDescriptor<E>,
    records: Vec<Option<ReadRecord>>,
) -> Result<Vec<E>> {
    records
        .into_iter()
        .flatten()
        .map(|record| cx.from_record_with(descriptor, record).map_err(Error::from))
        .collect()
}

/// Keys of a batch, `None` where an element cannot be keyed
pub(crate) fn batch_keys<E: Entity>(cx: &Converter, entities: &[E]) -> Vec<Option<Key>> {
    match describe::<E>() {
        Ok(descriptor) => entities
            .iter()
            .map(|entity| cx.key_of(&descriptor, entity).ok())
            .collect(),
        Err(_) => vec![None; entities.len()],
    }
}

/// Key of an entity, for entity-addressed calls
pub(crate) fn key_of<E: Entity>(cx: &Converter, entity: &E) -> Result<Key> {
    let descriptor = describe::<E>()?;
    Ok(cx.key_of(&descriptor, entity)?)
}

/// Namespace and set holding every `E` record
pub(crate) fn set_of<E: Entity>(cx: &Converter) -> Result<(String, String)> {
    let descriptor = describe::<E>()?;
    Ok((cx.settings().namespace.clone(), cx.set_name_of(&descriptor)))
}

/// Translate a failed truncate of `namespace:set_name`
pub(crate) fn truncate_failed(namespace: String, set_name: String, source: ClientError) -> Error {
    Error::SetTransport {
        operation: OperationKind::DeleteAll,
        namespace,
        set_name,
        source,
    }
}
