//! Process-wide descriptor registry
//!
//! Descriptors are built lazily on first use and cached for the lifetime
//! of the process. The registry maintains two mappings:
//! - Rust type -> typed descriptor (for `describe::<E>()`)
//! - Type alias -> type-erased descriptor (for polymorphic decoding)
//!
//! ## Concurrency
//!
//! The registry is append-only. Threads racing to describe the same type
//! may each build a descriptor; the first insert wins and every caller
//! receives that one. Builds run outside any map lock, so a descriptor
//! build may itself describe other types.
//!
//! A type alias belongs to the first type that claims it. Describing a
//! second type with the same alias fails, and keeps failing, with
//! `MappingError::DuplicateTypeAlias`.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use recmap_core::{DecodeError, MappingError, NestedRecord};
use tracing::{debug, warn};

use crate::any_entity::AnyEntity;
use crate::converter::Converter;
use crate::descriptor::{Entity, EntityDescriptor};

/// Type-erased view of an [`EntityDescriptor`]
///
/// Lets the converter write and read nested entities whose concrete type
/// is only known at runtime.
pub trait ErasedDescriptor: Send + Sync {
    /// Type alias
    fn type_tag(&self) -> &str;

    /// Rust type name, for diagnostics
    fn type_name(&self) -> &'static str;

    /// Identity of the described Rust type
    fn entity_type(&self) -> TypeId;

    /// Write an entity of the described type as a nested record
    fn write_any(&self, entity: &dyn Any, cx: &Converter) -> Result<NestedRecord, MappingError>;

    /// Read a nested record into an entity of the described type
    fn read_any(&self, record: NestedRecord, cx: &Converter) -> Result<AnyEntity, DecodeError>;
}

impl<E: Entity> ErasedDescriptor for EntityDescriptor<E> {
    fn type_tag(&self) -> &str {
        EntityDescriptor::type_tag(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn entity_type(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn write_any(&self, entity: &dyn Any, cx: &Converter) -> Result<NestedRecord, MappingError> {
        let entity = entity.downcast_ref::<E>().ok_or_else(|| {
            MappingError::unsupported(
                std::any::type_name::<E>(),
                "descriptor invoked with an entity of another type",
            )
        })?;
        cx.nested_record(self, entity)
    }

    fn read_any(&self, record: NestedRecord, cx: &Converter) -> Result<AnyEntity, DecodeError> {
        cx.entity_from_nested(self, record).map(AnyEntity::new)
    }
}

struct Registered {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedDescriptor>,
}

/// Registry of entity descriptors
pub struct Registry {
    by_type: DashMap<TypeId, Registered>,
    by_alias: DashMap<String, Arc<dyn ErasedDescriptor>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Registry {
            by_type: DashMap::new(),
            by_alias: DashMap::new(),
        }
    }

    /// Descriptor of `E`, building and caching it on first use
    ///
    /// # Errors
    ///
    /// Returns the `MappingError` of a malformed type, or
    /// `DuplicateTypeAlias` when another type already holds the alias.
    /// Failed builds are not cached; every use of such a type reports the
    /// error.
    pub fn describe<E: Entity>(&self) -> Result<Arc<EntityDescriptor<E>>, MappingError> {
        if let Some(entry) = self.by_type.get(&TypeId::of::<E>()) {
            return Ok(downcast_descriptor::<E>(&entry.typed));
        }

        let built = Arc::new(E::describe()?);
        self.claim_alias(built.clone() as Arc<dyn ErasedDescriptor>)?;
        let entry = self
            .by_type
            .entry(TypeId::of::<E>())
            .or_insert_with(|| {
                debug!(
                    type_name = std::any::type_name::<E>(),
                    type_tag = built.type_tag(),
                    fields = built.fields().len(),
                    "built entity descriptor"
                );
                Registered {
                    typed: built.clone() as Arc<dyn Any + Send + Sync>,
                    erased: built.clone() as Arc<dyn ErasedDescriptor>,
                }
            });
        Ok(downcast_descriptor::<E>(&entry.typed))
    }

    fn claim_alias(&self, erased: Arc<dyn ErasedDescriptor>) -> Result<(), MappingError> {
        let alias = erased.type_tag().to_string();
        let existing = self.by_alias.entry(alias.clone()).or_insert_with(|| erased.clone());
        if existing.entity_type() == erased.entity_type() {
            return Ok(());
        }
        warn!(
            type_tag = %alias,
            registered = existing.type_name(),
            rejected = erased.type_name(),
            "type alias already registered for another type"
        );
        Err(MappingError::DuplicateTypeAlias {
            type_tag: alias,
            registered: existing.type_name().to_string(),
            conflicting: erased.type_name().to_string(),
        })
    }

    /// Type-erased descriptor of `E`
    pub fn erased<E: Entity>(&self) -> Result<Arc<dyn ErasedDescriptor>, MappingError> {
        self.describe::<E>()?;
        self.by_type
            .get(&TypeId::of::<E>())
            .map(|entry| entry.erased.clone())
            .ok_or_else(|| {
                MappingError::unsupported(std::any::type_name::<E>(), "descriptor vanished from registry")
            })
    }

    /// Type-erased descriptor registered under a type alias
    pub fn by_alias(&self, type_tag: &str) -> Option<Arc<dyn ErasedDescriptor>> {
        self.by_alias.get(type_tag).map(|entry| entry.clone())
    }

    /// Whether a type alias resolves to a registered type
    pub fn knows_alias(&self, type_tag: &str) -> bool {
        self.by_alias.contains_key(type_tag)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Whether no type is registered
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn downcast_descriptor<E: Entity>(typed: &Arc<dyn Any + Send + Sync>) -> Arc<EntityDescriptor<E>> {
    match typed.clone().downcast::<EntityDescriptor<E>>() {
        Ok(descriptor) => descriptor,
        // entries are keyed by TypeId::of::<E>() and always hold EntityDescriptor<E>
        Err(_) => unreachable!("registry entry for {} has the wrong type", std::any::type_name::<E>()),
    }
}

// =============================================================================
// Global Registry
// =============================================================================

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// The process-wide registry
pub fn global() -> &'static Registry {
    &REGISTRY
}

/// Descriptor of `E` from the process-wide registry
pub fn describe<E: Entity>() -> Result<Arc<EntityDescriptor<E>>, MappingError> {
    REGISTRY.describe::<E>()
}

/// Register `E` up front so its alias resolves in polymorphic reads
pub fn register<E: Entity>() -> Result<(), MappingError> {
    REGISTRY.describe::<E>().map(|_| ())
}
