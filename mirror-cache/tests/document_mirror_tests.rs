//! Document Mirror Tests
//!
//! End-to-end use over JSON documents: filtered fetch, name-based fields,
//! dotted paths, list-valued grouping and serialized lookups.

use mirror_cache::{Cache, DocumentFilter, InMemoryCollection, JsonField, MirrorError};
use mirror_test_utils::fixtures;
use serde_json::json;
use std::sync::Arc;

fn active_places(collection: &Arc<InMemoryCollection>) -> Cache<Arc<InMemoryCollection>> {
    Cache::new(Arc::clone(collection), JsonField::new("id"))
        .query(DocumentFilter::new().eq("active", true))
        .group([
            JsonField::new("address.region"),
            JsonField::new("address.city"),
        ])
}

#[tokio::test]
async fn test_filter_applies_to_every_refresh() {
    let collection = Arc::new(fixtures::sample_collection());
    let cache = active_places(&collection);
    cache.update().await.unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.get("3").is_none());
    assert!(cache.get_by_group(&["US"]).is_empty());
    assert_eq!(
        cache.get_by_group(&["EU"]).keys().collect::<Vec<_>>(),
        ["Berlin", "Paris"]
    );

    collection.insert(json!({
        "id": "4", "active": true, "address": {"region": "US", "city": "Boston"}
    }));
    cache.update().await.unwrap();

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get_by_group(&["US", "Boston"]).ids(), ["4"]);
}

#[tokio::test]
async fn test_numeric_identifiers_are_stringified() {
    let collection = Arc::new(fixtures::sample_collection());
    let cache = Cache::new(Arc::clone(&collection), JsonField::new("id"));
    cache.update().await.unwrap();

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get("3").unwrap()["address"]["city"], "Boston");
    // Numeric keys are looked up by their string form.
    assert_eq!(cache.get(3).unwrap()["address"]["city"], "Boston");
    assert_eq!(cache.get(1), cache.get("1"));
}

#[tokio::test]
async fn test_numeric_group_keys() {
    let collection = Arc::new(InMemoryCollection::new("releases"));
    collection.replace_all(vec![
        json!({"id": 10, "year": 2023}),
        json!({"id": 11, "year": 2024}),
        json!({"id": 12, "year": 2024}),
    ]);
    let cache = Cache::new(Arc::clone(&collection), JsonField::new("id"))
        .group([JsonField::new("year")]);
    cache.update().await.unwrap();

    assert_eq!(cache.get_by_group(&[2024]).ids(), ["11", "12"]);
    assert_eq!(cache.get_by_group(&["2023"]).ids(), ["10"]);
}

#[tokio::test]
async fn test_lookup_serializes_as_nested_json() {
    let collection = Arc::new(fixtures::sample_collection());
    let cache = active_places(&collection);
    cache.update().await.unwrap();

    let eu = serde_json::to_value(cache.get_by_group(&["EU"])).unwrap();
    assert_eq!(eu, json!({"Berlin": ["1"], "Paris": ["2"]}));

    let leaf = serde_json::to_value(cache.get_by_group(&["EU", "Paris"])).unwrap();
    assert_eq!(leaf, json!(["2"]));

    let miss = serde_json::to_value(cache.get_by_group(&["EU", "Rome"])).unwrap();
    assert_eq!(miss, json!([]));
}

#[tokio::test]
async fn test_array_field_fans_out() {
    let collection = Arc::new(InMemoryCollection::new("posts"));
    collection.replace_all(vec![
        json!({"id": "a", "tags": ["rust", "cache", "rust"]}),
        json!({"id": "b", "tags": ["cache"]}),
        json!({"id": "c", "tags": []}),
    ]);
    let cache = Cache::new(Arc::clone(&collection), JsonField::new("id"))
        .group([JsonField::new("tags")]);
    cache.update().await.unwrap();

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get_by_group(&["rust"]).ids(), ["a"]);
    assert_eq!(cache.get_by_group(&["cache"]).ids(), ["a", "b"]);
    // Record with no tags is reachable by id only.
    assert!(cache.get("c").is_some());
}

#[tokio::test]
async fn test_array_filter_matches_membership() {
    let collection = Arc::new(InMemoryCollection::new("posts"));
    collection.replace_all(vec![
        json!({"id": "a", "tags": ["rust", "cache"]}),
        json!({"id": "b", "tags": ["go"]}),
    ]);
    let cache = Cache::new(Arc::clone(&collection), JsonField::new("id"))
        .query(DocumentFilter::new().eq("tags", "rust"));
    cache.update().await.unwrap();

    assert_eq!(cache.len(), 1);
    assert!(cache.get("a").is_some());
}

#[tokio::test]
async fn test_unavailable_collection_keeps_data() {
    let collection = Arc::new(fixtures::sample_collection());
    let cache = active_places(&collection);
    cache.update().await.unwrap();

    collection.set_available(false);
    let err = cache.update().await.unwrap_err();
    assert!(matches!(err, MirrorError::Fetch(_)));
    assert_eq!(cache.len(), 2);

    collection.set_available(true);
    collection.remove_where(&DocumentFilter::new().eq("id", "1"));
    cache.update().await.unwrap();
    assert_eq!(cache.len(), 1);
    assert!(cache.get_by_group(&["EU", "Berlin"]).is_empty());
}

#[tokio::test]
async fn test_object_valued_group_field_is_fatal() {
    let collection = Arc::new(fixtures::sample_collection());
    let cache = Cache::new(Arc::clone(&collection), JsonField::new("id"))
        .group([JsonField::new("address")]);

    let err = cache.update().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_array_identifier_is_fatal() {
    let collection = Arc::new(InMemoryCollection::new("odd"));
    collection.insert(json!({"id": ["x", "y"]}));
    let cache = Cache::new(Arc::clone(&collection), JsonField::new("id"));

    let err = cache.update().await.unwrap_err();
    assert!(err.is_fatal());
}
