//! Blocking template tests
//!
//! Exercises the full stack (template -> protocol -> converter -> store)
//! through the public API only.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{note, person, CachedPage, Lease, Note, Person, Token};
use recmap_core::{
    Bins, Error, Key, OperationKind, PreconditionError, RecordExistsAction, RejectReason,
    StorageClient, Value, WritePolicy,
};
use recmap_engine::{Template, TemplateConfig};
use recmap_mapping::Bytes;
use recmap_storage::InMemoryStore;

fn template() -> Template<InMemoryStore> {
    common::init_tracing();
    Template::new(InMemoryStore::new(), &TemplateConfig::default()).unwrap()
}

// ============================================================================
// Versioned saves
// ============================================================================

#[test]
fn test_save_increments_version_and_round_trips() {
    let t = template();
    let mut p = person("p1");

    t.save(&mut p).unwrap();
    assert_eq!(p.version, 1);
    t.save(&mut p).unwrap();
    assert_eq!(p.version, 2);

    let found: Person = t.find_by_id(&"p1".to_string()).unwrap().unwrap();
    assert_eq!(found, p);
    assert_eq!(found.avatar, Bytes(vec![0, 159, 146, 150]));
}

#[test]
fn test_stale_save_rejected() {
    let t = template();
    let mut p = person("p1");
    t.save(&mut p).unwrap();

    let mut newer = p.clone();
    t.save(&mut newer).unwrap();
    assert_eq!(newer.version, 2);

    let mut stale = p.clone();
    let err = t.save(&mut stale).unwrap_err();
    assert!(err.is_optimistic_lock());
    assert_eq!(err.reject_reason(), Some(RejectReason::GenerationMismatch));
    assert!(matches!(
        err,
        Error::OptimisticLock {
            observed_generation: Some(2),
            ..
        }
    ));
    assert_eq!(stale.version, 1);

    let mut never_saved = person("p1");
    let err = t.save(&mut never_saved).unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::KeyExists));
    assert_eq!(never_saved.version, 0);
}

#[test]
fn test_racing_threads_one_wins() {
    const THREADS: usize = 5;
    let t = Arc::new(template());
    let mut p = person("shared");
    t.save(&mut p).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let t = Arc::clone(&t);
            let barrier = Arc::clone(&barrier);
            let mut copy = p.clone();
            copy.name = format!("writer {}", i);
            thread::spawn(move || {
                barrier.wait();
                t.save(&mut copy).map(|_| copy.version)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(wins, vec![&2]);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.reject_reason(), Some(RejectReason::GenerationMismatch));
    }
}

// ============================================================================
// Insert, update, persist
// ============================================================================

#[test]
fn test_insert_existing_is_key_exists_with_or_without_version() {
    let t = template();

    t.insert(&mut person("p1")).unwrap();
    let err = t.insert(&mut person("p1")).unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::KeyExists));

    t.insert(&mut note(1, "a")).unwrap();
    let err = t.insert(&mut note(1, "b")).unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::KeyExists));
}

#[test]
fn test_update_rules() {
    let t = template();

    let err = t.update(&mut note(9, "x")).unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            operation: OperationKind::Update,
            ..
        }
    ));

    let err = t.update(&mut person("p1")).unwrap_err();
    assert!(matches!(
        err,
        Error::Precondition(PreconditionError::VersionNotSet { .. })
    ));
    assert_eq!(t.client().round_trips(), 1);

    let mut p = person("p1");
    t.save(&mut p).unwrap();
    p.name = "Grace".to_string();
    t.update(&mut p).unwrap();
    assert_eq!(p.version, 2);
    let found: Person = t.find_by_id(&"p1".to_string()).unwrap().unwrap();
    assert_eq!(found.name, "Grace");
}

#[test]
fn test_persist_actions() {
    let t = template();

    let err = t
        .persist(&mut note(1, "a"), RecordExistsAction::UpdateOnly)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    t.persist(&mut note(1, "a"), RecordExistsAction::CreateOnly).unwrap();
    let err = t
        .persist(&mut note(1, "b"), RecordExistsAction::CreateOnly)
        .unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::KeyExists));

    t.persist(&mut note(1, "c"), RecordExistsAction::ReplaceOnly).unwrap();
    let found: Note = t.find_by_id(&1i64).unwrap().unwrap();
    assert_eq!(found.text, "c");
}

#[test]
fn test_insert_all_isolates_failures() {
    let t = template();
    t.insert(&mut note(5, "existing")).unwrap();

    let results = t.insert_all(vec![note(1, "a"), note(5, "clash"), note(2, "b"), note(1, "dup")]);
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].as_ref().unwrap(), &note(1, "a"));
    assert_eq!(
        results[1].as_ref().unwrap_err().reject_reason(),
        Some(RejectReason::KeyExists)
    );
    assert!(results[2].is_ok());
    assert_eq!(
        results[3].as_ref().unwrap_err().reject_reason(),
        Some(RejectReason::KeyExists)
    );

    let stored: Note = t.find_by_id(&1i64).unwrap().unwrap();
    assert_eq!(stored.text, "a");
    // one insert plus three element writes; the in-batch duplicate never left
    assert_eq!(t.client().round_trips(), 4);
}

// ============================================================================
// Narrow operations
// ============================================================================

#[test]
fn test_append_and_prepend_touch_only_named_bins() {
    let t = template();
    let mut p = person("p1");
    t.save(&mut p).unwrap();

    let appended = t
        .append_many(&p, &[("name", " Lovelace"), ("email", ".uk")])
        .unwrap();
    assert_eq!(appended.name, "Ada Lovelace");
    assert_eq!(appended.email_address, "ada@example.com.uk");
    assert_eq!(appended.tags, p.tags);
    assert_eq!(appended.version, 2);
    assert_eq!(p.version, 1);

    let prepended = t.prepend(&appended, "name", "Countess ").unwrap();
    assert_eq!(prepended.name, "Countess Ada Lovelace");

    let found: Person = t.find_by_id(&"p1".to_string()).unwrap().unwrap();
    assert_eq!(found, prepended);
}

#[test]
fn test_append_changes_only_named_field_of_returned_copy() {
    let t = template();
    let mut p = person("p1");
    t.save(&mut p).unwrap();
    p.tags.push("unsaved".to_string());

    let updated = t.append(&p, "name", "!").unwrap();
    assert_eq!(updated.name, "Ada!");
    assert_eq!(updated.tags, p.tags);
}

#[test]
fn test_add_counts() {
    let t = template();
    let mut p = person("p1");
    t.save(&mut p).unwrap();

    let once = t.add(&p, "visits", 3).unwrap();
    let twice = t.add_many(&once, &[("visits", 2)]).unwrap();
    assert_eq!(twice.visits, 5);
}

#[test]
fn test_narrow_ops_validate_bins() {
    let t = template();
    let mut p = person("p1");
    t.save(&mut p).unwrap();

    let err = t.append(&p, "email_address", "x").unwrap_err();
    assert!(matches!(
        err,
        Error::Precondition(PreconditionError::InvalidBin { .. })
    ));
    let err = t.add(&p, "name", 1).unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
}

// ============================================================================
// Reads and deletes
// ============================================================================

#[test]
fn test_find_by_ids_order_and_missing() {
    let t = template();
    for id in [1, 2, 3] {
        t.save(&mut note(id, &format!("n{}", id))).unwrap();
    }

    let found: Vec<Note> = t.find_by_ids(&[3i64, 99, 1]).unwrap();
    assert_eq!(found, vec![note(3, "n3"), note(1, "n1")]);

    let before = t.client().round_trips();
    let none: Vec<Note> = t.find_by_ids::<Note, i64>(&[]).unwrap();
    assert!(none.is_empty());
    assert_eq!(t.client().round_trips(), before);
}

#[test]
fn test_exists_and_delete() {
    let t = template();
    assert!(!t.exists::<Note, i64>(&1).unwrap());

    let mut n = note(1, "a");
    t.save(&mut n).unwrap();
    assert!(t.exists::<Note, i64>(&1).unwrap());
    assert!(t.delete::<Note, i64>(&1).unwrap());
    assert!(!t.delete::<Note, i64>(&1).unwrap());

    t.save(&mut n).unwrap();
    assert!(t.delete_entity(&n).unwrap());
    assert!(t.find_by_id::<Note, i64>(&1).unwrap().is_none());
}

#[test]
fn test_delete_all_removes_only_that_type() {
    let t = template();
    for id in ["p1", "p2"] {
        t.save(&mut person(id)).unwrap();
    }
    t.save(&mut note(1, "kept")).unwrap();

    t.delete_all::<Person>().unwrap();
    assert!(t.find_by_id::<Person, String>(&"p1".to_string()).unwrap().is_none());
    assert!(!t.exists::<Person, String>(&"p2".to_string()).unwrap());
    assert_eq!(t.find_by_id::<Note, i64>(&1).unwrap(), Some(note(1, "kept")));

    t.delete_all::<Person>().unwrap();
}

#[test]
fn test_touch_on_read_extends_lifetime() {
    let t = template();
    let mut page = CachedPage {
        url: "/home".to_string(),
        body: "<h1>hi</h1>".to_string(),
    };
    t.save(&mut page).unwrap();

    t.client().advance_clock(50);
    assert!(t.find_by_id::<CachedPage, String>(&page.url).unwrap().is_some());
    t.client().advance_clock(50);
    assert_eq!(
        t.find_by_id::<CachedPage, String>(&page.url).unwrap(),
        Some(page.clone())
    );
    t.client().advance_clock(61);
    assert!(t.find_by_id::<CachedPage, String>(&page.url).unwrap().is_none());
}

#[test]
fn test_touch_on_read_with_expiration_field_is_rejected() {
    let t = template();
    let err = t.find_by_id::<Lease, String>(&"l1".to_string()).unwrap_err();
    assert!(matches!(
        err,
        Error::Precondition(PreconditionError::TouchOnReadWithExpirationField { .. })
    ));
    assert_eq!(t.client().round_trips(), 0);
}

#[test]
fn test_expiration_field_maps_to_ttl() {
    let t = template();
    let mut token = Token {
        id: "t1".to_string(),
        ttl: 30,
    };
    t.save(&mut token).unwrap();
    t.client().advance_clock(10);

    let found: Token = t.find_by_id(&"t1".to_string()).unwrap().unwrap();
    assert!((19..=20).contains(&found.ttl), "ttl {}", found.ttl);

    let mut forever = Token {
        id: "t2".to_string(),
        ttl: -1,
    };
    t.save(&mut forever).unwrap();
    let found: Token = t.find_by_id(&"t2".to_string()).unwrap().unwrap();
    assert_eq!(found.ttl, -1);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_controls_record_layout() {
    let config: TemplateConfig = r#"
namespace = "app"

[sets]
person = "people"
"#
    .parse()
    .unwrap();
    let t = Template::new(InMemoryStore::new(), &config).unwrap();
    t.save(&mut person("p1")).unwrap();

    let record = t
        .client()
        .get(&Key::new("app", "people", "p1"))
        .unwrap()
        .unwrap();
    assert_eq!(record.bin("@_class"), Some(&Value::from("person")));
    assert_eq!(record.bin("@user_key"), Some(&Value::from("p1")));
    assert_eq!(record.bin("email"), Some(&Value::from("ada@example.com")));
    assert_eq!(record.bin("avatar"), Some(&Value::Bytes(vec![0, 159, 146, 150])));
    assert!(record.bin("version").is_none());
}

#[test]
fn test_delete_all_follows_set_override() {
    let config: TemplateConfig = r#"
namespace = "app"

[sets]
person = "people"
"#
    .parse()
    .unwrap();
    let t = Template::new(InMemoryStore::new(), &config).unwrap();
    t.save(&mut person("p1")).unwrap();
    let unrelated = Key::new("app", "person", "p1");
    t.client().put(&WritePolicy::new(), &unrelated, &Bins::new()).unwrap();

    t.delete_all::<Person>().unwrap();
    assert!(t.client().get(&Key::new("app", "people", "p1")).unwrap().is_none());
    assert!(t.client().exists(&unrelated).unwrap());
}

#[test]
fn test_invalid_config_rejected() {
    let config = TemplateConfig::with_namespace("");
    assert!(Template::new(InMemoryStore::new(), &config).is_err());
}
