//! Custom conversions
//!
//! A custom conversion replaces the built-in [`Persist`](crate::Persist)
//! codec of one Rust type. The converter looks conversions up before any
//! structural conversion, at every nesting depth: a conversion registered
//! for `DateTime<Utc>` applies to a top-level field, to the elements of a
//! `Vec<DateTime<Utc>>`, and to fields of nested entities alike.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use recmap_core::{DecodeError, MappingError, Value};
use rustc_hash::FxHashMap;

type WriteFn = Arc<dyn Fn(&dyn Any) -> Result<Value, MappingError> + Send + Sync>;
type ReadFn = Arc<dyn Fn(Value) -> Result<Box<dyn Any>, DecodeError> + Send + Sync>;

/// Registered per-type conversions
#[derive(Clone, Default)]
pub struct CustomConversions {
    writers: FxHashMap<TypeId, WriteFn>,
    readers: FxHashMap<TypeId, ReadFn>,
}

impl CustomConversions {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register both directions for `T`
    pub fn register<T, W, R>(&mut self, write: W, read: R) -> &mut Self
    where
        T: 'static,
        W: Fn(&T) -> Result<Value, MappingError> + Send + Sync + 'static,
        R: Fn(Value) -> Result<T, DecodeError> + Send + Sync + 'static,
    {
        self.register_writer::<T, _>(write);
        self.register_reader::<T, _>(read);
        self
    }

    /// Register a write conversion for `T`
    pub fn register_writer<T, W>(&mut self, write: W) -> &mut Self
    where
        T: 'static,
        W: Fn(&T) -> Result<Value, MappingError> + Send + Sync + 'static,
    {
        let erased: WriteFn = Arc::new(move |any: &dyn Any| match any.downcast_ref::<T>() {
            Some(value) => write(value),
            None => Err(MappingError::unsupported(
                std::any::type_name::<T>(),
                "custom writer invoked with a value of another type",
            )),
        });
        self.writers.insert(TypeId::of::<T>(), erased);
        self
    }

    /// Register a read conversion for `T`
    pub fn register_reader<T, R>(&mut self, read: R) -> &mut Self
    where
        T: 'static,
        R: Fn(Value) -> Result<T, DecodeError> + Send + Sync + 'static,
    {
        let erased: ReadFn =
            Arc::new(move |value: Value| read(value).map(|t| Box::new(t) as Box<dyn Any>));
        self.readers.insert(TypeId::of::<T>(), erased);
        self
    }

    /// Whether any conversion is registered
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty() && self.readers.is_empty()
    }

    /// Apply the write conversion for `T`, if one is registered
    pub(crate) fn write<T: 'static>(&self, value: &T) -> Option<Result<Value, MappingError>> {
        self.writers
            .get(&TypeId::of::<T>())
            .map(|write| write(value as &dyn Any))
    }

    /// Apply the read conversion for `T`, if one is registered
    ///
    /// Hands the value back when no reader exists.
    pub(crate) fn read<T: 'static>(
        &self,
        value: Value,
    ) -> std::result::Result<Result<T, DecodeError>, Value> {
        let Some(read) = self.readers.get(&TypeId::of::<T>()) else {
            return Err(value);
        };
        Ok(read(value).and_then(|any| {
            any.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
                DecodeError::invalid(format!(
                    "custom reader did not produce {}",
                    std::any::type_name::<T>()
                ))
            })
        }))
    }
}

impl fmt::Debug for CustomConversions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomConversions")
            .field("writers", &self.writers.len())
            .field("readers", &self.readers.len())
            .finish()
    }
}
