//! Entities shared by the template test suites

#![allow(dead_code)]

use recmap_core::{Expiration, MappingError};
use recmap_mapping::{Bytes, Entity, EntityDescriptor};

/// Route template logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Versioned entity with a renamed bin and a byte blob
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Person {
    pub id: String,
    pub version: u32,
    pub name: String,
    pub email_address: String,
    pub visits: i64,
    pub avatar: Bytes,
    pub tags: Vec<String>,
}

impl Entity for Person {
    fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
        EntityDescriptor::builder("person")
            .id("id", |p: &Person| &p.id, |p, v| p.id = v)
            .version("version", |p: &Person| &p.version, |p, v| p.version = v)
            .field("name", |p: &Person| &p.name, |p, v| p.name = v)
            .field_with_bin(
                "email_address",
                "email",
                |p: &Person| &p.email_address,
                |p, v| p.email_address = v,
            )
            .field("visits", |p: &Person| &p.visits, |p, v| p.visits = v)
            .field("avatar", |p: &Person| &p.avatar, |p, v| p.avatar = v)
            .field("tags", |p: &Person| &p.tags, |p, v| p.tags = v)
            .default_constructor()
            .build()
    }
}

pub fn person(id: &str) -> Person {
    Person {
        id: id.to_string(),
        name: "Ada".to_string(),
        email_address: "ada@example.com".to_string(),
        avatar: Bytes(vec![0, 159, 146, 150]),
        tags: vec!["admin".to_string()],
        ..Default::default()
    }
}

/// Unversioned entity
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Note {
    pub id: i64,
    pub text: String,
}

impl Entity for Note {
    fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
        EntityDescriptor::builder("note")
            .id("id", |n: &Note| &n.id, |n, v| n.id = v)
            .field("text", |n: &Note| &n.text, |n, v| n.text = v)
            .default_constructor()
            .build()
    }
}

pub fn note(id: i64, text: &str) -> Note {
    Note {
        id,
        text: text.to_string(),
    }
}

/// Touch-on-read entity with a one minute lifetime
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CachedPage {
    pub url: String,
    pub body: String,
}

impl Entity for CachedPage {
    fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
        EntityDescriptor::builder("cached_page")
            .id("url", |c: &CachedPage| &c.url, |c, v| c.url = v)
            .field("body", |c: &CachedPage| &c.body, |c, v| c.body = v)
            .touch_on_read(true)
            .default_expiration(Expiration::Seconds(60))
            .default_constructor()
            .build()
    }
}

/// Touch-on-read entity that also maps its expiration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Lease {
    pub id: String,
    pub ttl: i64,
}

impl Entity for Lease {
    fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
        EntityDescriptor::builder("lease")
            .id("id", |l: &Lease| &l.id, |l, v| l.id = v)
            .expiration("ttl", |l: &Lease| &l.ttl, |l, v| l.ttl = v)
            .touch_on_read(true)
            .default_constructor()
            .build()
    }
}

/// Entity whose lifetime is a mapped field
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Token {
    pub id: String,
    pub ttl: i64,
}

impl Entity for Token {
    fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
        EntityDescriptor::builder("token")
            .id("id", |t: &Token| &t.id, |t, v| t.id = v)
            .expiration("ttl", |t: &Token| &t.ttl, |t, v| t.ttl = v)
            .default_constructor()
            .build()
    }
}
