//! Field value codec
//!
//! `Persist` converts a single field between its Rust type and the generic
//! `Value` model. Implementations for containers never call their element
//! codec directly; they go through `Converter::write` / `Converter::read`
//! so that custom conversions are consulted at every depth.
//!
//! ## Built-in shapes
//!
//! | Rust type | Stored as |
//! |-----------|-----------|
//! | integers | `Int` (range checked both ways) |
//! | `f32`, `f64` | `Float` |
//! | `bool` | `Bool` |
//! | `String` | `String` |
//! | `Bytes` | `Bytes` |
//! | `Vec<T>`, `HashSet<T>`, `BTreeSet<T>` | `List` |
//! | `HashMap<K, V>`, `BTreeMap<K, V>` | `Map` |
//! | `Option<T>` | inner value, `None` as `Null` |
//! | `DateTime<Utc>` | `Int` (epoch milliseconds) |
//! | `Uuid` | `String` |
//! | `Value` | itself, no interpretation |
//! | enums (`impl_persist_enum!`) | `String` (variant name) |
//! | entities (`impl_persist_entity!`) | `Record` with type discriminator |

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, TimeZone, Utc};
use recmap_core::{DecodeError, MappingError, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::converter::Converter;

/// Static shape of a field type
///
/// Used for descriptor validation (version fields must be integers) and
/// for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    /// Boolean
    Bool,
    /// Any integer width
    Int,
    /// Any float width
    Float,
    /// Text
    String,
    /// Byte blob
    Bytes,
    /// Enumeration stored by variant name
    Enum(&'static str),
    /// Point in time
    Timestamp,
    /// UUID
    Uuid,
    /// Ordered collection
    List(Box<TypeShape>),
    /// Unordered collection
    Set(Box<TypeShape>),
    /// Key/value collection
    Map(Box<TypeShape>, Box<TypeShape>),
    /// Nullable
    Optional(Box<TypeShape>),
    /// Nested entity of a single concrete type
    Entity(&'static str),
    /// Nested entity of any registered type
    Polymorphic,
    /// Generic container receiving raw values
    Generic,
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::List(inner) => write!(f, "List<{}>", inner),
            TypeShape::Set(inner) => write!(f, "Set<{}>", inner),
            TypeShape::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
            TypeShape::Optional(inner) => write!(f, "Optional<{}>", inner),
            TypeShape::Enum(name) | TypeShape::Entity(name) => f.write_str(name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Conversion of a field type to and from the generic value model
pub trait Persist: Sized + Send + 'static {
    /// Static shape of this type
    fn shape() -> TypeShape;

    /// Convert into a generic value
    fn write_value(&self, cx: &Converter) -> Result<Value, MappingError>;

    /// Convert from a generic value
    ///
    /// `Null` is never passed in for fields: absent and null bins are
    /// handled through [`Persist::absent`].
    fn read_value(value: Value, cx: &Converter) -> Result<Self, DecodeError>;

    /// Value used when a constructor parameter has no stored value
    ///
    /// Primitives default to zero, `Option` to `None`, collections to
    /// empty. `None` means the value is required.
    fn absent() -> Option<Self> {
        None
    }
}

// ============================================================================
// Scalars
// ============================================================================

macro_rules! persist_int {
    ($($ty:ty),+) => {
        $(
            impl Persist for $ty {
                fn shape() -> TypeShape {
                    TypeShape::Int
                }

                fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
                    i64::try_from(*self).map(Value::Int).map_err(|_| {
                        MappingError::unsupported(
                            stringify!($ty),
                            format!("{} does not fit a 64-bit signed integer", self),
                        )
                    })
                }

                fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(i).map_err(|_| {
                            DecodeError::invalid(format!(
                                "{} is out of range for {}",
                                i,
                                stringify!($ty)
                            ))
                        }),
                        other => Err(DecodeError::type_mismatch("Int", other.type_name())),
                    }
                }

                fn absent() -> Option<Self> {
                    Some(0)
                }
            }
        )+
    };
}

persist_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl Persist for f64 {
    fn shape() -> TypeShape {
        TypeShape::Float
    }

    fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
        Ok(Value::Float(*self))
    }

    fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(DecodeError::type_mismatch("Float", other.type_name())),
        }
    }

    fn absent() -> Option<Self> {
        Some(0.0)
    }
}

impl Persist for f32 {
    fn shape() -> TypeShape {
        TypeShape::Float
    }

    fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
        Ok(Value::Float(f64::from(*self)))
    }

    fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
        match value {
            Value::Float(f) => Ok(f as f32),
            other => Err(DecodeError::type_mismatch("Float", other.type_name())),
        }
    }

    fn absent() -> Option<Self> {
        Some(0.0)
    }
}

impl Persist for bool {
    fn shape() -> TypeShape {
        TypeShape::Bool
    }

    fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
        Ok(Value::Bool(*self))
    }

    fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(DecodeError::type_mismatch("Bool", other.type_name())),
        }
    }

    fn absent() -> Option<Self> {
        Some(false)
    }
}

impl Persist for String {
    fn shape() -> TypeShape {
        TypeShape::String
    }

    fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
        Ok(Value::String(self.clone()))
    }

    fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(DecodeError::type_mismatch("String", other.type_name())),
        }
    }
}

/// Byte blob field
///
/// A dedicated type so that binary data is stored as `Value::Bytes`
/// rather than as a list of small integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Borrow the raw bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Bytes(bytes.to_vec())
    }
}

impl Persist for Bytes {
    fn shape() -> TypeShape {
        TypeShape::Bytes
    }

    fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
        Ok(Value::Bytes(self.0.clone()))
    }

    fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
        match value {
            Value::Bytes(b) => Ok(Bytes(b)),
            other => Err(DecodeError::type_mismatch("Bytes", other.type_name())),
        }
    }
}

impl Persist for DateTime<Utc> {
    fn shape() -> TypeShape {
        TypeShape::Timestamp
    }

    fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
        Ok(Value::Int(self.timestamp_millis()))
    }

    fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
        match value {
            Value::Int(millis) => Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| DecodeError::invalid(format!("{} ms is not a valid timestamp", millis))),
            other => Err(DecodeError::type_mismatch("Int", other.type_name())),
        }
    }
}

impl Persist for Uuid {
    fn shape() -> TypeShape {
        TypeShape::Uuid
    }

    fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
        Ok(Value::String(self.to_string()))
    }

    fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
        match value {
            Value::String(s) => {
                Uuid::parse_str(&s).map_err(|e| DecodeError::invalid(format!("bad uuid '{}': {}", s, e)))
            }
            other => Err(DecodeError::type_mismatch("String", other.type_name())),
        }
    }
}

/// Raw values pass through untouched, including nested records whose
/// discriminator resolves to no registered type.
impl Persist for Value {
    fn shape() -> TypeShape {
        TypeShape::Generic
    }

    fn write_value(&self, _cx: &Converter) -> Result<Value, MappingError> {
        Ok(self.clone())
    }

    fn read_value(value: Value, _cx: &Converter) -> Result<Self, DecodeError> {
        Ok(value)
    }

    fn absent() -> Option<Self> {
        Some(Value::Null)
    }
}

// ============================================================================
// Containers
// ============================================================================

impl<T: Persist> Persist for Option<T> {
    fn shape() -> TypeShape {
        TypeShape::Optional(Box::new(T::shape()))
    }

    fn write_value(&self, cx: &Converter) -> Result<Value, MappingError> {
        match self {
            Some(inner) => cx.write(inner),
            None => Ok(Value::Null),
        }
    }

    fn read_value(value: Value, cx: &Converter) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            other => cx.read::<T>(other).map(Some),
        }
    }

    fn absent() -> Option<Self> {
        Some(None)
    }
}

fn read_list<T: Persist>(value: Value, cx: &Converter) -> Result<Vec<T>, DecodeError> {
    match value {
        Value::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| read_element::<T>(item, cx).map_err(|e| e.at(&format!("[{}]", i))))
            .collect(),
        other => Err(DecodeError::type_mismatch("List", other.type_name())),
    }
}

// Null elements inside a collection fall back to the element's absent value.
fn read_element<T: Persist>(value: Value, cx: &Converter) -> Result<T, DecodeError> {
    match value {
        Value::Null => T::absent().ok_or_else(DecodeError::missing),
        other => cx.read::<T>(other),
    }
}

impl<T: Persist> Persist for Vec<T> {
    fn shape() -> TypeShape {
        TypeShape::List(Box::new(T::shape()))
    }

    fn write_value(&self, cx: &Converter) -> Result<Value, MappingError> {
        self.iter()
            .map(|item| cx.write(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    fn read_value(value: Value, cx: &Converter) -> Result<Self, DecodeError> {
        read_list(value, cx)
    }

    fn absent() -> Option<Self> {
        Some(Vec::new())
    }
}

impl<T: Persist + Eq + Hash> Persist for HashSet<T> {
    fn shape() -> TypeShape {
        TypeShape::Set(Box::new(T::shape()))
    }

    fn write_value(&self, cx: &Converter) -> Result<Value, MappingError> {
        self.iter()
            .map(|item| cx.write(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    fn read_value(value: Value, cx: &Converter) -> Result<Self, DecodeError> {
        read_list::<T>(value, cx).map(|items| items.into_iter().collect())
    }

    fn absent() -> Option<Self> {
        Some(HashSet::new())
    }
}

impl<T: Persist + Ord> Persist for BTreeSet<T> {
    fn shape() -> TypeShape {
        TypeShape::Set(Box::new(T::shape()))
    }

    fn write_value(&self, cx: &Converter) -> Result<Value, MappingError> {
        self.iter()
            .map(|item| cx.write(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    fn read_value(value: Value, cx: &Converter) -> Result<Self, DecodeError> {
        read_list::<T>(value, cx).map(|items| items.into_iter().collect())
    }

    fn absent() -> Option<Self> {
        Some(BTreeSet::new())
    }
}

fn write_entries<'a, K, V, I>(entries: I, cx: &Converter) -> Result<Value, MappingError>
where
    K: Persist + 'a,
    V: Persist + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    entries
        .map(|(k, v)| Ok((cx.write(k)?, cx.write(v)?)))
        .collect::<Result<Vec<_>, MappingError>>()
        .map(Value::Map)
}

fn read_entries<K: Persist, V: Persist>(
    value: Value,
    cx: &Converter,
) -> Result<Vec<(K, V)>, DecodeError> {
    let entries = match value {
        Value::Map(entries) => entries,
        // an untyped nested record is a string-keyed map
        Value::Record(record) if record.type_tag.is_none() => record
            .fields
            .into_iter()
            .map(|(k, v)| (Value::String(k), v))
            .collect(),
        other => return Err(DecodeError::type_mismatch("Map", other.type_name())),
    };
    entries
        .into_iter()
        .map(|(k, v)| {
            let segment = match &k {
                Value::String(s) => s.clone(),
                other => format!("[{:?}]", other),
            };
            let key = cx.read::<K>(k).map_err(|e| e.at(&segment))?;
            let value = read_element::<V>(v, cx).map_err(|e| e.at(&segment))?;
            Ok((key, value))
        })
        .collect()
}

impl<K: Persist + Eq + Hash, V: Persist> Persist for HashMap<K, V> {
    fn shape() -> TypeShape {
        TypeShape::Map(Box::new(K::shape()), Box::new(V::shape()))
    }

    fn write_value(&self, cx: &Converter) -> Result<Value, MappingError> {
        write_entries(self.iter(), cx)
    }

    fn read_value(value: Value, cx: &Converter) -> Result<Self, DecodeError> {
        read_entries::<K, V>(value, cx).map(|entries| entries.into_iter().collect())
    }

    fn absent() -> Option<Self> {
        Some(HashMap::new())
    }
}

impl<K: Persist + Ord, V: Persist> Persist for BTreeMap<K, V> {
    fn shape() -> TypeShape {
        TypeShape::Map(Box::new(K::shape()), Box::new(V::shape()))
    }

    fn write_value(&self, cx: &Converter) -> Result<Value, MappingError> {
        write_entries(self.iter(), cx)
    }

    fn read_value(value: Value, cx: &Converter) -> Result<Self, DecodeError> {
        read_entries::<K, V>(value, cx).map(|entries| entries.into_iter().collect())
    }

    fn absent() -> Option<Self> {
        Some(BTreeMap::new())
    }
}

// ============================================================================
// Enums and nested entities
// ============================================================================

/// Enumeration stored by variant name
///
/// Implemented by [`impl_persist_enum!`](crate::impl_persist_enum).
pub trait PersistEnum: Sized {
    /// Enum type name, used in error messages
    const ENUM_NAME: &'static str;

    /// Stored name of this variant
    fn variant_name(&self) -> &'static str;

    /// Variant for a stored name
    fn from_variant_name(name: &str) -> Option<Self>;
}

/// Decode a stored variant name
pub fn read_enum<T: PersistEnum>(value: Value) -> Result<T, DecodeError> {
    match value {
        Value::String(name) => {
            T::from_variant_name(&name).ok_or(DecodeError::UnknownEnumVariant {
                field: String::new(),
                enum_name: T::ENUM_NAME,
                variant: name,
            })
        }
        other => Err(DecodeError::type_mismatch("String", other.type_name())),
    }
}

/// Implement [`Persist`] for a fieldless enum, storing variant names
///
/// ```
/// use recmap_mapping::impl_persist_enum;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Status { Active, Suspended }
///
/// impl_persist_enum!(Status { Active, Suspended });
/// ```
#[macro_export]
macro_rules! impl_persist_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::PersistEnum for $ty {
            const ENUM_NAME: &'static str = stringify!($ty);

            fn variant_name(&self) -> &'static str {
                match self {
                    $($ty::$variant => stringify!($variant),)+
                }
            }

            fn from_variant_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($variant) => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }

        impl $crate::Persist for $ty {
            fn shape() -> $crate::TypeShape {
                $crate::TypeShape::Enum(stringify!($ty))
            }

            fn write_value(
                &self,
                _cx: &$crate::Converter,
            ) -> Result<$crate::Value, $crate::MappingError> {
                Ok($crate::Value::String(
                    $crate::PersistEnum::variant_name(self).to_string(),
                ))
            }

            fn read_value(
                value: $crate::Value,
                _cx: &$crate::Converter,
            ) -> Result<Self, $crate::DecodeError> {
                $crate::persist::read_enum(value)
            }
        }
    };
}

/// Implement [`Persist`] for entity types so they can be nested in fields
///
/// The types must implement [`Entity`](crate::Entity). Nested values are
/// stored as records carrying the type discriminator.
#[macro_export]
macro_rules! impl_persist_entity {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Persist for $ty {
                fn shape() -> $crate::TypeShape {
                    $crate::TypeShape::Entity(stringify!($ty))
                }

                fn write_value(
                    &self,
                    cx: &$crate::Converter,
                ) -> Result<$crate::Value, $crate::MappingError> {
                    cx.write_nested(self)
                }

                fn read_value(
                    value: $crate::Value,
                    cx: &$crate::Converter,
                ) -> Result<Self, $crate::DecodeError> {
                    cx.read_nested(value)
                }
            }
        )+
    };
}
