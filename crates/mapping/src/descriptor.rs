//! Entity descriptors
//!
//! An `EntityDescriptor<E>` is the explicit field-accessor table of one
//! entity type: which field is the identifier, which one carries the
//! version, which one exposes the expiration, how every other field maps
//! to a bin, and how instances are constructed.
//!
//! Descriptors are built once through [`DescriptorBuilder`] and are
//! immutable afterwards. Malformed metadata is reported by
//! [`DescriptorBuilder::build`] as a [`MappingError`].
//!
//! ## Construction
//!
//! A type is constructed either from `Default` (every field is then
//! populated through its setter) or through an explicit constructor that
//! receives the decoded values of its parameter fields via
//! [`ConstructorArgs`]. A constructor parameter is never additionally
//! assigned after construction.
//!
//! ```
//! use recmap_mapping::{Entity, EntityDescriptor, MappingError};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Person {
//!     id: String,
//!     version: u32,
//!     name: String,
//! }
//!
//! impl Entity for Person {
//!     fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
//!         EntityDescriptor::builder("person")
//!             .id("id", |p: &Person| &p.id, |p, v| p.id = v)
//!             .version("version", |p: &Person| &p.version, |p, v| p.version = v)
//!             .field("name", |p: &Person| &p.name, |p, v| p.name = v)
//!             .default_constructor()
//!             .build()
//!     }
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use recmap_core::time::{offset_to_unix_time, unix_time_to_offset};
use recmap_core::{DecodeError, Expiration, Generation, MappingError, Value};

use crate::converter::Converter;
use crate::persist::{Persist, TypeShape};

/// A type that can be mapped to a record
pub trait Entity: Sized + Send + Sync + 'static {
    /// Build the descriptor of this type
    ///
    /// Called at most a few times per process; the result is cached in
    /// the registry.
    fn describe() -> Result<EntityDescriptor<Self>, MappingError>;
}

type Getter<E> = Box<dyn Fn(&E, &Converter) -> Result<Value, MappingError> + Send + Sync>;
type Setter<E> = Box<dyn Fn(&mut E, Value, &Converter) -> Result<(), DecodeError> + Send + Sync>;
type ErasedDecode = fn(Value, &Converter) -> Result<Box<dyn Any + Send>, DecodeError>;
type ErasedAbsent = fn() -> Option<Box<dyn Any + Send>>;
type ConstructorFn<E> = Box<dyn Fn(&mut ConstructorArgs) -> Result<E, DecodeError> + Send + Sync>;

fn decode_erased<T: Persist>(value: Value, cx: &Converter) -> Result<Box<dyn Any + Send>, DecodeError> {
    cx.read::<T>(value).map(|t| Box::new(t) as Box<dyn Any + Send>)
}

fn absent_erased<T: Persist>() -> Option<Box<dyn Any + Send>> {
    T::absent().map(|t| Box::new(t) as Box<dyn Any + Send>)
}

/// Role a field plays in the record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Identifier, stored in the record key
    Id,
    /// Version, populated from the record generation
    Version,
    /// Expiration, stored as the record time-to-live
    Expiration {
        /// Field holds an absolute unix time instead of seconds remaining
        unix_time: bool,
    },
    /// Ordinary field stored in a bin
    Property,
}

/// Metadata and accessors of one field
pub struct FieldDescriptor<E> {
    name: String,
    bin: String,
    role: FieldRole,
    shape: TypeShape,
    constructor_param: bool,
    required: bool,
    get: Getter<E>,
    set: Option<Setter<E>>,
    decode: ErasedDecode,
    absent: ErasedAbsent,
}

impl<E> FieldDescriptor<E> {
    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bin name the field is stored under
    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Role of the field
    pub fn role(&self) -> FieldRole {
        self.role
    }

    /// Static shape of the field type
    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }

    /// Whether the field is supplied to the constructor
    pub fn is_constructor_param(&self) -> bool {
        self.constructor_param
    }

    /// Whether the field can be assigned after construction
    pub fn is_settable(&self) -> bool {
        self.set.is_some()
    }

    /// Current value of this field in an entity
    pub fn value_of(&self, entity: &E, cx: &Converter) -> Result<Value, MappingError> {
        (self.get)(entity, cx)
    }
}

impl<E> fmt::Debug for FieldDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("bin", &self.bin)
            .field("role", &self.role)
            .field("shape", &self.shape)
            .field("constructor_param", &self.constructor_param)
            .finish()
    }
}

/// Decoded constructor parameters, keyed by field name
pub struct ConstructorArgs {
    type_tag: String,
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl ConstructorArgs {
    fn new(type_tag: &str) -> Self {
        ConstructorArgs {
            type_tag: type_tag.to_string(),
            values: HashMap::new(),
        }
    }

    /// Take the decoded value of a parameter field
    pub fn take<T: 'static>(&mut self, name: &str) -> Result<T, DecodeError> {
        let value = self.values.remove(name).ok_or_else(|| DecodeError::MissingField {
            field: name.to_string(),
        })?;
        value.downcast::<T>().map(|boxed| *boxed).map_err(|_| DecodeError::InvalidValue {
            field: name.to_string(),
            reason: format!(
                "constructor of '{}' requested the parameter as {}",
                self.type_tag,
                std::any::type_name::<T>()
            ),
        })
    }
}

enum Constructor<E> {
    Default(fn() -> E),
    Params(ConstructorFn<E>),
}

/// Immutable mapping metadata of an entity type
pub struct EntityDescriptor<E> {
    type_tag: String,
    set_name: String,
    fields: Vec<FieldDescriptor<E>>,
    id: Option<usize>,
    version: Option<usize>,
    expiration: Option<usize>,
    constructor: Constructor<E>,
    touch_on_read: bool,
    default_expiration: Expiration,
}

impl<E: Entity> EntityDescriptor<E> {
    /// Start describing a type with the given alias
    ///
    /// The alias doubles as the type discriminator and the default set
    /// name.
    pub fn builder(type_tag: impl Into<String>) -> DescriptorBuilder<E> {
        DescriptorBuilder::new(type_tag.into())
    }
}

impl<E> EntityDescriptor<E> {
    /// Type alias used as discriminator
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Default set name
    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    /// All fields, in declaration order
    pub fn fields(&self) -> &[FieldDescriptor<E>] {
        &self.fields
    }

    /// Identifier field
    pub fn id_field(&self) -> Option<&FieldDescriptor<E>> {
        self.id.map(|i| &self.fields[i])
    }

    /// Version field
    pub fn version_field(&self) -> Option<&FieldDescriptor<E>> {
        self.version.map(|i| &self.fields[i])
    }

    /// Expiration field
    pub fn expiration_field(&self) -> Option<&FieldDescriptor<E>> {
        self.expiration.map(|i| &self.fields[i])
    }

    /// Whether the type has a version field
    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// Whether reads refresh the record time-to-live
    pub fn touch_on_read(&self) -> bool {
        self.touch_on_read
    }

    /// Expiration applied when no expiration field overrides it
    pub fn default_expiration(&self) -> Expiration {
        self.default_expiration
    }

    /// Ordinary fields stored in bins
    pub fn properties(&self) -> impl Iterator<Item = &FieldDescriptor<E>> {
        self.fields.iter().filter(|f| f.role == FieldRole::Property)
    }

    /// Ordinary field stored under `bin`
    pub fn property_by_bin(&self, bin: &str) -> Option<&FieldDescriptor<E>> {
        self.properties().find(|f| f.bin == bin)
    }

    /// Identifier value of an entity
    pub fn id_value(&self, entity: &E, cx: &Converter) -> Result<Value, MappingError> {
        match self.id_field() {
            Some(field) => (field.get)(entity, cx),
            None => Err(MappingError::MissingIdentifier {
                type_tag: self.type_tag.clone(),
            }),
        }
    }

    /// Current version of an entity
    ///
    /// `None` for unversioned types, `Some(0)` for entities that were
    /// never persisted.
    pub fn version_of(&self, entity: &E, cx: &Converter) -> Result<Option<Generation>, MappingError> {
        let Some(field) = self.version_field() else {
            return Ok(None);
        };
        match (field.get)(entity, cx)? {
            Value::Null => Ok(Some(0)),
            Value::Int(v) => Generation::try_from(v).map(Some).map_err(|_| {
                MappingError::unsupported(
                    format!("version field '{}'", field.name),
                    format!("{} is not a valid generation", v),
                )
            }),
            other => Err(MappingError::UnsupportedVersionShape {
                type_tag: self.type_tag.clone(),
                field: field.name.clone(),
                shape: other.type_name().to_string(),
            }),
        }
    }

    /// Apply a store generation to the version field
    ///
    /// No-op for unversioned types.
    pub fn set_version(&self, entity: &mut E, generation: Generation, cx: &Converter) -> Result<(), DecodeError> {
        match self.version_field().and_then(|f| f.set.as_ref().map(|set| (f, set))) {
            Some((field, set)) => {
                set(entity, Value::Int(i64::from(generation)), cx).map_err(|e| e.at(&field.name))
            }
            None => Ok(()),
        }
    }

    /// Time-to-live to request when writing an entity
    ///
    /// Touch-on-read types always use the default expiration. Otherwise an
    /// expiration field, when present and set, takes precedence.
    pub fn expiration_of(&self, entity: &E, cx: &Converter) -> Result<Expiration, MappingError> {
        if self.touch_on_read {
            return Ok(self.default_expiration);
        }
        let Some(field) = self.expiration_field() else {
            return Ok(self.default_expiration);
        };
        let seconds = match (field.get)(entity, cx)? {
            Value::Null => return Ok(self.default_expiration),
            Value::Int(s) => s,
            other => {
                return Err(MappingError::unsupported(
                    format!("expiration field '{}'", field.name),
                    format!("expected an integer, found {}", other.type_name()),
                ))
            }
        };
        let offset = match field.role {
            // an absolute time already in the past still has to expire
            FieldRole::Expiration { unix_time: true } if seconds > 0 => {
                unix_time_to_offset(seconds).max(1)
            }
            _ => seconds,
        };
        Ok(Expiration::from_seconds(offset))
    }

    /// Value the expiration field receives for a stored time-to-live
    pub(crate) fn expiration_value(&self, ttl: Option<u32>) -> Value {
        let unix_time = matches!(
            self.expiration_field().map(|f| f.role),
            Some(FieldRole::Expiration { unix_time: true })
        );
        match ttl {
            None => Value::Int(-1),
            Some(seconds) if unix_time => Value::Int(offset_to_unix_time(i64::from(seconds))),
            Some(seconds) => Value::Int(i64::from(seconds)),
        }
    }

    /// Construct an entity from per-field values
    ///
    /// `slots` is aligned with [`fields`](Self::fields). Constructor
    /// parameters are decoded first and handed to the constructor; the
    /// remaining fields are assigned afterwards. Absent values leave a
    /// post-construction field untouched unless it is required.
    pub(crate) fn decode(&self, slots: Vec<Option<Value>>, cx: &Converter) -> Result<E, DecodeError> {
        let mut slots: Vec<Option<Value>> = slots
            .into_iter()
            .map(|slot| slot.filter(|v| !v.is_null()))
            .collect();
        slots.resize(self.fields.len(), None);

        let mut entity = match &self.constructor {
            Constructor::Default(make) => make(),
            Constructor::Params(make) => {
                let mut args = ConstructorArgs::new(&self.type_tag);
                for (field, slot) in self.fields.iter().zip(slots.iter_mut()) {
                    if !field.constructor_param {
                        continue;
                    }
                    let value = match slot.take() {
                        Some(value) => (field.decode)(value, cx).map_err(|e| e.at(&field.name))?,
                        None => (field.absent)().ok_or_else(|| DecodeError::MissingField {
                            field: field.name.clone(),
                        })?,
                    };
                    args.values.insert(field.name.clone(), value);
                }
                make(&mut args)?
            }
        };

        for (field, slot) in self.fields.iter().zip(slots) {
            if field.constructor_param {
                continue;
            }
            match (slot, &field.set) {
                (Some(value), Some(set)) => {
                    set(&mut entity, value, cx).map_err(|e| e.at(&field.name))?
                }
                (None, _) if field.required => {
                    return Err(DecodeError::MissingField {
                        field: field.name.clone(),
                    })
                }
                _ => {}
            }
        }
        Ok(entity)
    }

    /// Assign a single stored value to a settable field
    pub(crate) fn assign(
        &self,
        entity: &mut E,
        field: &FieldDescriptor<E>,
        value: Value,
        cx: &Converter,
    ) -> Result<(), DecodeError> {
        match &field.set {
            Some(set) => set(entity, value, cx).map_err(|e| e.at(&field.name)),
            None => Err(DecodeError::InvalidValue {
                field: field.name.clone(),
                reason: "constructor parameter cannot be updated in place".to_string(),
            }),
        }
    }
}

impl<E> fmt::Debug for EntityDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_tag", &self.type_tag)
            .field("set_name", &self.set_name)
            .field("fields", &self.fields)
            .field("touch_on_read", &self.touch_on_read)
            .field("default_expiration", &self.default_expiration)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EntityDescriptor`]
///
/// Metadata errors are collected while building and reported by
/// [`build`](Self::build); the first one wins.
pub struct DescriptorBuilder<E> {
    type_tag: String,
    set_name: Option<String>,
    fields: Vec<FieldDescriptor<E>>,
    id: Option<usize>,
    version: Option<usize>,
    expiration: Option<usize>,
    constructor: Option<Constructor<E>>,
    touch_on_read: bool,
    default_expiration: Expiration,
    error: Option<MappingError>,
}

impl<E: Entity> DescriptorBuilder<E> {
    fn new(type_tag: String) -> Self {
        DescriptorBuilder {
            type_tag,
            set_name: None,
            fields: Vec::new(),
            id: None,
            version: None,
            expiration: None,
            constructor: None,
            touch_on_read: false,
            default_expiration: Expiration::ServerDefault,
            error: None,
        }
    }

    fn fail(&mut self, error: MappingError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push<T, G>(
        &mut self,
        name: &str,
        bin: &str,
        role: FieldRole,
        get: G,
        set: Option<Setter<E>>,
    ) -> usize
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
    {
        if self.fields.iter().any(|f| f.name == name)
            || (role == FieldRole::Property
                && self
                    .fields
                    .iter()
                    .any(|f| f.role == FieldRole::Property && f.bin == bin))
        {
            self.fail(MappingError::DuplicateField {
                type_tag: self.type_tag.clone(),
                field: name.to_string(),
            });
        }
        let constructor_param = set.is_none();
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            bin: bin.to_string(),
            role,
            shape: T::shape(),
            constructor_param,
            required: false,
            get: Box::new(move |entity: &E, cx: &Converter| cx.write(get(entity))),
            set,
            decode: decode_erased::<T>,
            absent: absent_erased::<T>,
        });
        self.fields.len() - 1
    }

    fn setter<T, S>(set: S) -> Setter<E>
    where
        T: Persist,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        Box::new(move |entity: &mut E, value: Value, cx: &Converter| {
            let decoded = cx.read::<T>(value)?;
            set(entity, decoded);
            Ok(())
        })
    }

    fn mark_id(&mut self, index: usize) {
        match self.id {
            Some(first) => {
                let error = MappingError::DuplicateIdentifier {
                    type_tag: self.type_tag.clone(),
                    first: self.fields[first].name.clone(),
                    second: self.fields[index].name.clone(),
                };
                self.fail(error);
            }
            None => self.id = Some(index),
        }
    }

    /// Override the set name (defaults to the type alias)
    pub fn set_name(mut self, set_name: impl Into<String>) -> Self {
        self.set_name = Some(set_name.into());
        self
    }

    /// Declare the identifier field
    pub fn id<T, G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        let index = self.push(name, name, FieldRole::Id, get, Some(Self::setter(set)));
        self.mark_id(index);
        self
    }

    /// Declare the identifier field as a constructor parameter
    pub fn id_param<T, G>(mut self, name: &str, get: G) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
    {
        let index = self.push(name, name, FieldRole::Id, get, None);
        self.mark_id(index);
        self
    }

    /// Declare the version field
    ///
    /// The field must be an integer; it is populated from the record
    /// generation and never written as a bin.
    pub fn version<T, G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        if T::shape() != TypeShape::Int {
            let error = MappingError::UnsupportedVersionShape {
                type_tag: self.type_tag.clone(),
                field: name.to_string(),
                shape: T::shape().to_string(),
            };
            self.fail(error);
        }
        let index = self.push(name, name, FieldRole::Version, get, Some(Self::setter(set)));
        match self.version {
            Some(first) => {
                let error = MappingError::DuplicateVersion {
                    type_tag: self.type_tag.clone(),
                    first: self.fields[first].name.clone(),
                    second: name.to_string(),
                };
                self.fail(error);
            }
            None => self.version = Some(index),
        }
        self
    }

    fn expiration_field<T, G, S>(mut self, name: &str, unix_time: bool, get: G, set: S) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        let index = self.push(
            name,
            name,
            FieldRole::Expiration { unix_time },
            get,
            Some(Self::setter(set)),
        );
        if self.expiration.is_some() {
            let error = MappingError::DuplicateExpiration {
                type_tag: self.type_tag.clone(),
            };
            self.fail(error);
        } else {
            self.expiration = Some(index);
        }
        self
    }

    /// Declare the expiration field, in seconds remaining
    ///
    /// `-1` means never expire.
    pub fn expiration<T, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        self.expiration_field(name, false, get, set)
    }

    /// Declare the expiration field, as an absolute unix time in seconds
    pub fn expiration_unix_time<T, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        self.expiration_field(name, true, get, set)
    }

    /// Declare an ordinary field stored under its own name
    pub fn field<T, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        self.field_with_bin(name, name, get, set)
    }

    /// Declare an ordinary field stored under a different bin name
    pub fn field_with_bin<T, G, S>(mut self, name: &str, bin: &str, get: G, set: S) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        self.push(name, bin, FieldRole::Property, get, Some(Self::setter(set)));
        self
    }

    /// Declare an ordinary field supplied to the constructor
    pub fn param<T, G>(self, name: &str, get: G) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
    {
        self.param_with_bin(name, name, get)
    }

    /// Declare a constructor parameter stored under a different bin name
    pub fn param_with_bin<T, G>(mut self, name: &str, bin: &str, get: G) -> Self
    where
        T: Persist,
        G: Fn(&E) -> &T + Send + Sync + 'static,
    {
        self.push(name, bin, FieldRole::Property, get, None);
        self
    }

    /// Mark the most recently declared field as required
    ///
    /// Decoding a record without a value for it fails instead of leaving
    /// the constructed default in place.
    pub fn required(mut self) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.required = true;
        }
        self
    }

    /// Construct instances through an explicit constructor
    pub fn constructor<F>(mut self, make: F) -> Self
    where
        F: Fn(&mut ConstructorArgs) -> Result<E, DecodeError> + Send + Sync + 'static,
    {
        self.constructor = Some(Constructor::Params(Box::new(make)));
        self
    }

    /// Refresh the record time-to-live on every read
    pub fn touch_on_read(mut self, touch: bool) -> Self {
        self.touch_on_read = touch;
        self
    }

    /// Expiration written when no expiration field overrides it
    pub fn default_expiration(mut self, expiration: Expiration) -> Self {
        self.default_expiration = expiration;
        self
    }

    /// Validate and finish the descriptor
    pub fn build(self) -> Result<EntityDescriptor<E>, MappingError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let constructor = self.constructor.ok_or_else(|| MappingError::MissingConstructor {
            type_tag: self.type_tag.clone(),
        })?;
        let uses_params = matches!(constructor, Constructor::Params(_));
        if let Some(field) = self
            .fields
            .iter()
            .find(|f| f.constructor_param && !uses_params)
        {
            return Err(MappingError::MissingSetter {
                type_tag: self.type_tag.clone(),
                field: field.name.clone(),
            });
        }
        let set_name = self.set_name.unwrap_or_else(|| self.type_tag.clone());
        Ok(EntityDescriptor {
            type_tag: self.type_tag,
            set_name,
            fields: self.fields,
            id: self.id,
            version: self.version,
            expiration: self.expiration,
            constructor,
            touch_on_read: self.touch_on_read,
            default_expiration: self.default_expiration,
        })
    }
}

impl<E: Entity + Default> DescriptorBuilder<E> {
    /// Construct instances from `Default`
    pub fn default_constructor(mut self) -> Self {
        self.constructor = Some(Constructor::Default(E::default));
        self
    }
}
