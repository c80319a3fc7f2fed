//! Entity <-> record converter
//!
//! ## Record layout
//!
//! | Entity part | Record part |
//! |-------------|-------------|
//! | identifier field | key user key, plus the `user_key_bin` bin when enabled |
//! | version field | not written; read from the record generation |
//! | expiration field | record time-to-live |
//! | other fields | one bin each, named by the field's bin name |
//! | type alias | `type_key` bin |
//!
//! Null values are never written as bins. Nested entities become
//! `Value::Record` values carrying their type alias.

use std::collections::HashMap;

use recmap_core::{
    DecodeError, Key, MappingError, NestedRecord, ReadRecord, Result, UserKey, Value,
    WriteRecord,
};

use crate::conversions::CustomConversions;
use crate::descriptor::{Entity, EntityDescriptor, FieldRole};
use crate::persist::Persist;
use crate::registry;

/// Default bin holding the type discriminator
pub const DEFAULT_TYPE_KEY: &str = "@_class";
/// Default bin holding the stored identifier
pub const DEFAULT_USER_KEY_BIN: &str = "@user_key";
/// Default namespace
pub const DEFAULT_NAMESPACE: &str = "test";

/// Layout settings shared by every conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingSettings {
    /// Namespace of every key
    pub namespace: String,
    /// Bin holding the type discriminator
    pub type_key: String,
    /// Bin holding the stored identifier
    pub user_key_bin: String,
    /// Whether the identifier is also written as a bin
    pub store_user_key: bool,
    /// Set-name overrides, keyed by type alias
    pub set_names: HashMap<String, String>,
}

impl Default for MappingSettings {
    fn default() -> Self {
        MappingSettings {
            namespace: DEFAULT_NAMESPACE.to_string(),
            type_key: DEFAULT_TYPE_KEY.to_string(),
            user_key_bin: DEFAULT_USER_KEY_BIN.to_string(),
            store_user_key: true,
            set_names: HashMap::new(),
        }
    }
}

/// Bidirectional entity/record converter
///
/// Stateless apart from its settings and custom conversions; share one
/// instance freely across threads.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    settings: MappingSettings,
    conversions: CustomConversions,
}

impl Converter {
    /// Create a converter without custom conversions
    pub fn new(settings: MappingSettings) -> Self {
        Converter {
            settings,
            conversions: CustomConversions::new(),
        }
    }

    /// Create a converter with custom conversions
    pub fn with_conversions(settings: MappingSettings, conversions: CustomConversions) -> Self {
        Converter {
            settings,
            conversions,
        }
    }

    /// Layout settings
    pub fn settings(&self) -> &MappingSettings {
        &self.settings
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Convert a field value, custom conversions first
    pub fn write<T: Persist>(&self, value: &T) -> std::result::Result<Value, MappingError> {
        match self.conversions.write(value) {
            Some(result) => result,
            None => value.write_value(self),
        }
    }

    /// Decode a field value, custom conversions first
    pub fn read<T: Persist>(&self, value: Value) -> std::result::Result<T, DecodeError> {
        match self.conversions.read::<T>(value) {
            Ok(result) => result,
            Err(value) => T::read_value(value, self),
        }
    }

    /// Convert a nested entity into a typed record value
    pub fn write_nested<E: Entity>(&self, entity: &E) -> std::result::Result<Value, MappingError> {
        let descriptor = registry::describe::<E>()?;
        self.nested_record(&descriptor, entity).map(Value::Record)
    }

    /// Decode a nested entity of static type `E`
    ///
    /// A record tagged with another type's alias is rejected; an untagged
    /// record or string-keyed map decodes as `E`.
    pub fn read_nested<E: Entity>(&self, value: Value) -> std::result::Result<E, DecodeError> {
        let descriptor = registry::describe::<E>().map_err(|e| DecodeError::invalid(e.to_string()))?;
        let record = match value {
            Value::Record(record) => record,
            Value::Map(entries) => {
                let mut record = NestedRecord::untyped();
                for (k, v) in entries {
                    match k {
                        Value::String(name) => {
                            record.fields.insert(name, v);
                        }
                        other => return Err(DecodeError::type_mismatch("String", other.type_name())),
                    }
                }
                record
            }
            other => return Err(DecodeError::type_mismatch("Record", other.type_name())),
        };
        if let Some(tag) = &record.type_tag {
            if tag != descriptor.type_tag() {
                return Err(DecodeError::UnexpectedType {
                    field: String::new(),
                    expected: descriptor.type_tag().to_string(),
                    actual: tag.clone(),
                });
            }
        }
        self.entity_from_nested(&descriptor, record)
    }

    pub(crate) fn nested_record<E>(
        &self,
        descriptor: &EntityDescriptor<E>,
        entity: &E,
    ) -> std::result::Result<NestedRecord, MappingError> {
        let mut record = NestedRecord::new(descriptor.type_tag());
        for field in descriptor.fields() {
            if !matches!(field.role(), FieldRole::Id | FieldRole::Property) {
                continue;
            }
            let value = field.value_of(entity, self)?;
            if !value.is_null() {
                record.fields.insert(field.bin().to_string(), value);
            }
        }
        Ok(record)
    }

    pub(crate) fn entity_from_nested<E>(
        &self,
        descriptor: &EntityDescriptor<E>,
        mut record: NestedRecord,
    ) -> std::result::Result<E, DecodeError> {
        let slots = descriptor
            .fields()
            .iter()
            .map(|field| match field.role() {
                FieldRole::Id | FieldRole::Property => record.fields.remove(field.bin()),
                FieldRole::Version | FieldRole::Expiration { .. } => None,
            })
            .collect();
        descriptor.decode(slots, self)
    }

    // ========================================================================
    // Keys
    // ========================================================================

    /// Set name of a type, honoring configured overrides
    pub fn set_name_of<E>(&self, descriptor: &EntityDescriptor<E>) -> String {
        self.settings
            .set_names
            .get(descriptor.type_tag())
            .cloned()
            .unwrap_or_else(|| descriptor.set_name().to_string())
    }

    fn key_from_value<E>(
        &self,
        descriptor: &EntityDescriptor<E>,
        id: Value,
    ) -> std::result::Result<Key, MappingError> {
        let user_key = UserKey::from_value(&id).ok_or_else(|| MappingError::InvalidIdentifier {
            type_tag: descriptor.type_tag().to_string(),
            actual: id.type_name(),
        })?;
        Ok(Key::new(
            self.settings.namespace.clone(),
            self.set_name_of(descriptor),
            user_key,
        ))
    }

    /// Key of an entity
    pub fn key_of<E>(
        &self,
        descriptor: &EntityDescriptor<E>,
        entity: &E,
    ) -> std::result::Result<Key, MappingError> {
        let id = descriptor.id_value(entity, self)?;
        self.key_from_value(descriptor, id)
    }

    /// Key of the `E` record with the given identifier
    pub fn key_for_id<E: Entity, I: Persist>(&self, id: &I) -> Result<Key> {
        let descriptor = registry::describe::<E>()?;
        if descriptor.id_field().is_none() {
            return Err(MappingError::MissingIdentifier {
                type_tag: descriptor.type_tag().to_string(),
            }
            .into());
        }
        let id = self.write(id)?;
        Ok(self.key_from_value(&descriptor, id)?)
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Convert an entity into write data
    pub fn to_record<E: Entity>(&self, entity: &E) -> Result<WriteRecord> {
        let descriptor = registry::describe::<E>()?;
        Ok(self.to_record_with(&descriptor, entity)?)
    }

    /// Convert an entity into write data using a known descriptor
    ///
    /// The version field is never written; the policy resolver turns it
    /// into a precondition instead.
    pub fn to_record_with<E>(
        &self,
        descriptor: &EntityDescriptor<E>,
        entity: &E,
    ) -> std::result::Result<WriteRecord, MappingError> {
        let key = self.key_of(descriptor, entity)?;
        let mut record = WriteRecord::new(key);
        for field in descriptor.properties() {
            let value = field.value_of(entity, self)?;
            if !value.is_null() {
                record.put_bin(field.bin(), value);
            }
        }
        record.put_bin(
            self.settings.type_key.clone(),
            Value::String(descriptor.type_tag().to_string()),
        );
        if self.settings.store_user_key {
            let stored = record.key.user_key.to_value();
            record.put_bin(self.settings.user_key_bin.clone(), stored);
        }
        record.expiration = descriptor.expiration_of(entity, self)?;
        Ok(record)
    }

    /// Decode a stored record into an entity
    pub fn from_record<E: Entity>(&self, record: ReadRecord) -> Result<E> {
        let descriptor = registry::describe::<E>()?;
        Ok(self.from_record_with(&descriptor, record)?)
    }

    /// Decode a stored record using a known descriptor
    ///
    /// The identifier prefers the stored `user_key_bin` value over the
    /// key; the version always comes from the generation.
    pub fn from_record_with<E>(
        &self,
        descriptor: &EntityDescriptor<E>,
        record: ReadRecord,
    ) -> std::result::Result<E, DecodeError> {
        let ReadRecord {
            key,
            mut bins,
            generation,
            expiration,
        } = record;

        if let Some(stored) = bins.remove(&self.settings.type_key) {
            if stored.as_str() != Some(descriptor.type_tag()) {
                return Err(DecodeError::UnexpectedType {
                    field: String::new(),
                    expected: descriptor.type_tag().to_string(),
                    actual: match stored {
                        Value::String(s) => s,
                        other => other.type_name().to_string(),
                    },
                });
            }
        }
        if descriptor.id_field().is_none() {
            return Err(DecodeError::MissingIdentifier {
                type_tag: descriptor.type_tag().to_string(),
            });
        }
        let mut id = bins
            .remove(&self.settings.user_key_bin)
            .filter(|v| !v.is_null())
            .or_else(|| Some(key.user_key.to_value()));

        let slots = descriptor
            .fields()
            .iter()
            .map(|field| match field.role() {
                FieldRole::Id => id.take(),
                FieldRole::Version => Some(Value::Int(i64::from(generation))),
                FieldRole::Expiration { .. } => Some(descriptor.expiration_value(expiration)),
                FieldRole::Property => bins.remove(field.bin()),
            })
            .collect();
        descriptor.decode(slots, self)
    }

    /// Copy an entity and refresh only the fields stored in `bins`
    ///
    /// Used after narrow operations: values come from `record`, which
    /// holds the post-operation bins, and the version is reconciled from
    /// the record generation.
    pub fn apply_bins<E: Clone>(
        &self,
        descriptor: &EntityDescriptor<E>,
        entity: &E,
        record: &ReadRecord,
        bins: &[String],
    ) -> std::result::Result<E, DecodeError> {
        let mut updated = entity.clone();
        for bin in bins {
            let Some(field) = descriptor.property_by_bin(bin) else {
                continue;
            };
            if let Some(value) = record.bin(bin).filter(|v| !v.is_null()) {
                descriptor.assign(&mut updated, field, value.clone(), self)?;
            }
        }
        descriptor.set_version(&mut updated, record.generation, self)?;
        Ok(updated)
    }
}
