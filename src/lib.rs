//! recmap - typed entities over wide-column records
//!
//! recmap maps plain Rust structs to records made of named bins and
//! writes them under optimistic concurrency: a versioned entity carries
//! the record generation it was read at, and a write only lands if the
//! record is still at that generation.
//!
//! # Quick Start
//!
//! ```ignore
//! use recmap::{Entity, EntityDescriptor, InMemoryStore, MappingError, Template, TemplateConfig};
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
//!
//! let template = Template::new(InMemoryStore::new(), &TemplateConfig::default())?;
//! let mut ada = Person { id: "p1".into(), name: "Ada".into(), ..Default::default() };
//! template.save(&mut ada)?;            // created, version 1
//! let found: Option<Person> = template.find_by_id(&"p1".to_string())?;
//! ```
//!
//! # Architecture
//!
//! | Crate | Role |
//! |-------|------|
//! | `recmap-core` | values, keys, records, policies, errors, client traits |
//! | `recmap-mapping` | entity descriptors and the record converter |
//! | `recmap-concurrency` | write policy resolution and the OCC write protocol |
//! | `recmap-storage` | in-memory client |
//! | `recmap-engine` | blocking and async templates, configuration |

pub use recmap_concurrency::{WriteMode, WriteOutcome, WriteState};
pub use recmap_core::{
    AsyncStorageClient, BinMode, Bins, ClientError, DecodeError, Error, Expiration, Generation,
    Key, MappingError, Operation, OperationKind, PreconditionError, ReadRecord,
    RecordExistsAction, RejectReason, Result, ResultCode, StorageClient, UserKey, Value,
    VersionPolicy, WritePolicy, WriteRecord,
};
pub use recmap_engine::{ConfigError, ReactiveTemplate, Template, TemplateConfig, CONFIG_FILE_NAME};
pub use recmap_mapping::{
    AnyEntity, Bytes, Converter, CustomConversions, Entity, EntityDescriptor, MappingSettings,
    impl_persist_entity, impl_persist_enum, Persist, PersistEnum,
};
pub use recmap_storage::InMemoryStore;
