//! Polymorphic entity values
//!
//! A field of type `AnyEntity` holds an entity of any registered type.
//! It is written as a nested record carrying the concrete type's alias
//! and read back by resolving that alias in the registry, so a map of
//! `AnyEntity` values decodes each value to its own concrete type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use recmap_core::{DecodeError, MappingError, Value};

use crate::converter::Converter;
use crate::descriptor::Entity;
use crate::persist::{Persist, TypeShape};
use crate::registry::{self, ErasedDescriptor};

type DescriptorFn = fn() -> Result<Arc<dyn ErasedDescriptor>, MappingError>;

fn erased_of<E: Entity>() -> Result<Arc<dyn ErasedDescriptor>, MappingError> {
    registry::global().erased::<E>()
}

/// An entity of any registered type
#[derive(Clone)]
pub struct AnyEntity {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    descriptor: DescriptorFn,
}

impl AnyEntity {
    /// Wrap an entity
    pub fn new<E: Entity>(entity: E) -> Self {
        AnyEntity {
            inner: Arc::new(entity),
            type_name: std::any::type_name::<E>(),
            descriptor: erased_of::<E>,
        }
    }

    /// Borrow the entity as `E`, if that is its concrete type
    pub fn downcast_ref<E: Entity>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Whether the concrete type is `E`
    pub fn is<E: Entity>(&self) -> bool {
        self.inner.is::<E>()
    }

    /// Rust type name of the concrete type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type alias of the concrete type
    pub fn type_tag(&self) -> Result<String, MappingError> {
        (self.descriptor)().map(|d| d.type_tag().to_string())
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyEntity")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl Persist for AnyEntity {
    fn shape() -> TypeShape {
        TypeShape::Polymorphic
    }

    fn write_value(&self, cx: &Converter) -> Result<Value, MappingError> {
        let descriptor = (self.descriptor)()?;
        descriptor
            .write_any(self.inner.as_ref(), cx)
            .map(Value::Record)
    }

    fn read_value(value: Value, cx: &Converter) -> Result<Self, DecodeError> {
        let record = match value {
            Value::Record(record) => record,
            other => return Err(DecodeError::type_mismatch("Record", other.type_name())),
        };
        let alias = record.type_tag.clone().ok_or_else(|| DecodeError::UnknownTypeAlias {
            field: String::new(),
            alias: String::new(),
        })?;
        let descriptor = registry::global()
            .by_alias(&alias)
            .ok_or_else(|| DecodeError::UnknownTypeAlias {
                field: String::new(),
                alias,
            })?;
        descriptor.read_any(record, cx)
    }
}
