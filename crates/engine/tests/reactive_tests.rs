//! Non-blocking template tests

mod common;

use std::time::Duration;

use async_trait::async_trait;
use common::{note, person, CachedPage, Note, Person};
use recmap_core::{
    AsyncStorageClient, Bins, ClientError, Error, Generation, Key, Operation, PreconditionError,
    ReadRecord, RejectReason, WritePolicy,
};
use recmap_engine::{ReactiveTemplate, TemplateConfig};
use recmap_storage::InMemoryStore;

fn template() -> ReactiveTemplate<InMemoryStore> {
    common::init_tracing();
    ReactiveTemplate::new(InMemoryStore::new(), &TemplateConfig::default()).unwrap()
}

/// Client whose writes never complete
struct StalledClient;

#[async_trait]
impl AsyncStorageClient for StalledClient {
    async fn get(&self, _key: &Key) -> Result<Option<ReadRecord>, ClientError> {
        Ok(None)
    }

    async fn put(&self, _policy: &WritePolicy, _key: &Key, _bins: &Bins) -> Result<Generation, ClientError> {
        std::future::pending().await
    }

    async fn operate(
        &self,
        _policy: &WritePolicy,
        _key: &Key,
        _ops: &[Operation],
    ) -> Result<ReadRecord, ClientError> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &Key) -> Result<bool, ClientError> {
        Ok(false)
    }

    async fn exists(&self, _key: &Key) -> Result<bool, ClientError> {
        Ok(false)
    }

    async fn truncate(&self, _namespace: &str, _set_name: &str) -> Result<(), ClientError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_save_and_find() {
    let t = template();
    let mut p = person("p1");

    t.save(&mut p).await.unwrap();
    t.save(&mut p).await.unwrap();
    assert_eq!(p.version, 2);

    let found: Person = t.find_by_id(&"p1".to_string()).await.unwrap().unwrap();
    assert_eq!(found, p);
    assert!(t.exists::<Person, String>(&"p1".to_string()).await.unwrap());
}

#[tokio::test]
async fn test_stale_save_leaves_entity_unchanged() {
    let t = template();
    let mut p = person("p1");
    t.save(&mut p).await.unwrap();
    t.save(&mut p.clone()).await.unwrap();

    let err = t.save(&mut p).await.unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::GenerationMismatch));
    assert_eq!(p.version, 1);
}

#[tokio::test]
async fn test_concurrent_saves_one_wins() {
    let t = template();
    let mut p = person("shared");
    t.save(&mut p).await.unwrap();

    let (mut a, mut b, mut c, mut d, mut e) = (p.clone(), p.clone(), p.clone(), p.clone(), p.clone());
    let results = tokio::join!(
        t.save(&mut a),
        t.save(&mut b),
        t.save(&mut c),
        t.save(&mut d),
        t.save(&mut e),
    );
    let results = [results.0, results.1, results.2, results.3, results.4];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.reject_reason(), Some(RejectReason::GenerationMismatch));
    }
    let versions = [a.version, b.version, c.version, d.version, e.version];
    assert_eq!(versions.iter().filter(|v| **v == 2).count(), 1);
    assert_eq!(versions.iter().filter(|v| **v == 1).count(), 4);
}

#[tokio::test]
async fn test_cancelled_save_leaves_entity_unchanged() {
    let t = ReactiveTemplate::new(StalledClient, &TemplateConfig::default()).unwrap();
    let mut p = person("p1");
    p.version = 3;

    let outcome = tokio::time::timeout(Duration::from_millis(20), t.save(&mut p)).await;
    assert!(outcome.is_err());
    assert_eq!(p.version, 3);
    assert_eq!(p, Person { version: 3, ..person("p1") });
}

#[tokio::test]
async fn test_update_unset_version_fails_before_any_call() {
    let t = ReactiveTemplate::new(StalledClient, &TemplateConfig::default()).unwrap();
    let err = t.update(&mut person("p1")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Precondition(PreconditionError::VersionNotSet { .. })
    ));
}

#[tokio::test]
async fn test_insert_all_with_duplicates() {
    let t = template();
    let results = t
        .insert_all(vec![note(1, "a"), note(2, "b"), note(1, "again")])
        .await;

    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert_eq!(
        results[2].as_ref().unwrap_err().reject_reason(),
        Some(RejectReason::KeyExists)
    );
    let found: Vec<Note> = t.find_by_ids(&[1i64, 2]).await.unwrap();
    assert_eq!(found, vec![note(1, "a"), note(2, "b")]);
}

#[tokio::test]
async fn test_narrow_operations() {
    let t = template();
    let mut p = person("p1");
    t.save(&mut p).await.unwrap();

    let counted = t.add(&p, "visits", 7).await.unwrap();
    assert_eq!(counted.visits, 7);
    let named = t.append(&counted, "name", " King").await.unwrap();
    let named = t.prepend(&named, "name", "Lady ").await.unwrap();
    assert_eq!(named.name, "Lady Ada King");
    assert_eq!(named.version, 4);
}

#[tokio::test]
async fn test_touch_on_read_and_delete() {
    let t = template();
    let mut page = CachedPage {
        url: "/a".to_string(),
        body: "body".to_string(),
    };
    t.save(&mut page).await.unwrap();

    t.client().advance_clock(45);
    assert!(t.find_by_id::<CachedPage, String>(&page.url).await.unwrap().is_some());
    t.client().advance_clock(45);
    assert!(t.find_by_id::<CachedPage, String>(&page.url).await.unwrap().is_some());

    assert!(t.delete_entity(&page).await.unwrap());
    assert!(t.find_by_id::<CachedPage, String>(&page.url).await.unwrap().is_none());
    assert!(!t.delete::<CachedPage, String>(&page.url).await.unwrap());
}

#[tokio::test]
async fn test_delete_all() {
    let t = template();
    t.save(&mut person("p1")).await.unwrap();
    t.save(&mut note(1, "kept")).await.unwrap();

    t.delete_all::<Person>().await.unwrap();
    assert!(!t.exists::<Person, String>(&"p1".to_string()).await.unwrap());
    assert!(t.exists::<Note, i64>(&1).await.unwrap());
}
