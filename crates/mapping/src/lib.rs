//! Entity mapping for recmap
//!
//! This crate converts typed entities to and from wide-column records:
//! - Persist: per-field value codec with built-in scalar and container shapes
//! - CustomConversions: per-type overrides consulted at every depth
//! - EntityDescriptor: explicit field-accessor table of an entity type
//! - Registry: process-wide, append-only descriptor cache
//! - AnyEntity: polymorphic nested entities resolved by type alias
//! - Converter: the bidirectional entity <-> record transformer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod any_entity;
pub mod conversions;
pub mod converter;
pub mod descriptor;
pub mod persist;
pub mod registry;

pub use any_entity::AnyEntity;
pub use conversions::CustomConversions;
pub use converter::{
    Converter, MappingSettings, DEFAULT_NAMESPACE, DEFAULT_TYPE_KEY, DEFAULT_USER_KEY_BIN,
};
pub use descriptor::{
    ConstructorArgs, DescriptorBuilder, Entity, EntityDescriptor, FieldDescriptor, FieldRole,
};
pub use persist::{Bytes, Persist, PersistEnum, TypeShape};
pub use registry::{describe, register, ErasedDescriptor, Registry};

// Re-exported for use by the persist macros and by entity definitions
pub use recmap_core::{DecodeError, MappingError, Value};
