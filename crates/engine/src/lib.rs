//! Entity templates for recmap
//!
//! This crate is the entry point applications use:
//! - Template: blocking save/insert/update/find over a `StorageClient`
//! - ReactiveTemplate: the same operations over an `AsyncStorageClient`
//! - TemplateConfig: `recmap.toml` configuration
//!
//! Both templates share one converter type and one write protocol, so a
//! given sequence of calls produces the same records and the same errors
//! whichever adapter runs it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod lookup;
pub mod reactive;
pub mod template;

pub use config::{ConfigError, TemplateConfig, CONFIG_FILE_NAME};
pub use reactive::ReactiveTemplate;
pub use template::Template;
