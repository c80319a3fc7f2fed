//! End-to-end tests through the `recmap` facade
//!
//! One store shared by both templates, plus
//! property tests for entities with nested records.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use proptest::prelude::*;
use recmap::{
    Converter, Entity, EntityDescriptor, Expiration, InMemoryStore, MappingError, MappingSettings,
    ReactiveTemplate, ReadRecord, RejectReason, Template, TemplateConfig, impl_persist_entity,
};
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
struct Address {
    street: String,
    zip: i64,
}

impl Entity for Address {
    fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
        EntityDescriptor::builder("address")
            .field("street", |a: &Address| &a.street, |a, v| a.street = v)
            .field("zip", |a: &Address| &a.zip, |a, v| a.zip = v)
            .default_constructor()
            .build()
    }
}

impl_persist_entity!(Address);

#[derive(Debug, Clone, PartialEq, Default)]
struct Customer {
    id: Uuid,
    version: u32,
    name: String,
    joined: Option<DateTime<Utc>>,
    addresses: Vec<Address>,
    labels: BTreeMap<String, i64>,
}

impl Entity for Customer {
    fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
        EntityDescriptor::builder("customer")
            .id("id", |c: &Customer| &c.id, |c, v| c.id = v)
            .version("version", |c: &Customer| &c.version, |c, v| c.version = v)
            .field("name", |c: &Customer| &c.name, |c, v| c.name = v)
            .field("joined", |c: &Customer| &c.joined, |c, v| c.joined = v)
            .field("addresses", |c: &Customer| &c.addresses, |c, v| c.addresses = v)
            .field("labels", |c: &Customer| &c.labels, |c, v| c.labels = v)
            .default_constructor()
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Session {
    id: String,
    user: String,
}

impl Entity for Session {
    fn describe() -> Result<EntityDescriptor<Self>, MappingError> {
        EntityDescriptor::builder("session")
            .id("id", |s: &Session| &s.id, |s, v| s.id = v)
            .field("user", |s: &Session| &s.user, |s, v| s.user = v)
            .default_expiration(Expiration::Seconds(30))
            .default_constructor()
            .build()
    }
}

fn customer(n: u128) -> Customer {
    Customer {
        id: Uuid::from_u128(n),
        name: format!("customer {}", n),
        joined: Utc.timestamp_opt(1_600_000_000, 0).single(),
        addresses: vec![Address {
            street: "1 Main St".to_string(),
            zip: 12345,
        }],
        labels: BTreeMap::from([("tier".to_string(), 2)]),
        ..Default::default()
    }
}

// ============================================================================
// Shared store
// ============================================================================

#[tokio::test]
async fn test_blocking_and_async_templates_share_generations() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let config = TemplateConfig::default();
    let blocking = Template::new(Arc::clone(&store), &config).unwrap();
    let reactive = ReactiveTemplate::new(Arc::clone(&store), &config).unwrap();

    let mut c = customer(1);
    blocking.save(&mut c).unwrap();

    let mut seen: Customer = reactive.find_by_id(&c.id).await.unwrap().unwrap();
    assert_eq!(seen, c);
    seen.name = "renamed".to_string();
    reactive.save(&mut seen).await.unwrap();
    assert_eq!(seen.version, 2);

    let err = blocking.save(&mut c).unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::GenerationMismatch));
}

#[test]
fn test_default_expiration_applies_through_shared_store() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let template = Template::new(Arc::clone(&store), &TemplateConfig::default()).unwrap();
    for i in 0..10 {
        let mut session = Session {
            id: format!("s{}", i),
            user: "ada".to_string(),
        };
        template.save(&mut session).unwrap();
    }
    assert_eq!(store.len(), 10);

    store.advance_clock(29);
    assert!(template
        .find_by_id::<Session, String>(&"s0".to_string())
        .unwrap()
        .is_some());
    store.advance_clock(2);
    assert!(template
        .find_by_id::<Session, String>(&"s0".to_string())
        .unwrap()
        .is_none());
    assert_eq!(store.len(), 9);
}

#[test]
fn test_writers_on_distinct_records_all_commit() {
    let template = Arc::new(Template::new(InMemoryStore::new(), &TemplateConfig::default()).unwrap());
    let committed = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..8u128)
        .map(|n| {
            let template = Arc::clone(&template);
            let committed = Arc::clone(&committed);
            thread::spawn(move || {
                let mut c = customer(n);
                for _ in 0..10 {
                    template.save(&mut c).unwrap();
                }
                committed.lock().push(c.version);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(*committed.lock(), vec![10; 8]);
}

// ============================================================================
// Properties
// ============================================================================

fn address_strategy() -> impl Strategy<Value = Address> {
    ("[a-zA-Z0-9 ]{0,24}", any::<i64>()).prop_map(|(street, zip)| Address { street, zip })
}

proptest! {
    #[test]
    fn prop_customer_survives_a_record(
        n in any::<u128>(),
        name in ".{0,32}",
        addresses in prop::collection::vec(address_strategy(), 0..6),
        labels in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6),
        generation in 1u32..10_000,
    ) {
        let cx = Converter::new(MappingSettings::default());
        let c = Customer {
            id: Uuid::from_u128(n),
            version: 0,
            name,
            joined: None,
            addresses,
            labels,
        };
        let record = cx.to_record(&c).unwrap();
        let read = ReadRecord::new(record.key, record.bins, generation, None);
        let decoded: Customer = cx.from_record(read).unwrap();

        prop_assert_eq!(decoded.version, generation);
        prop_assert_eq!(decoded, Customer { version: generation, ..c });
    }

    #[test]
    fn prop_versions_follow_commits(saves in 1usize..20) {
        let template = Template::new(InMemoryStore::new(), &TemplateConfig::default()).unwrap();
        let mut c = customer(9);
        for _ in 0..saves {
            template.save(&mut c).unwrap();
        }
        prop_assert_eq!(c.version as usize, saves);
    }
}
