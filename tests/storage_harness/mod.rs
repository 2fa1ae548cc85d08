//! Shared test harness for storage backend testing
//!
//! Provides a small tour collection fixture and the
//! `document_service_tests!` macro validating any [`StorageBackend`] against
//! the [`DocumentService`] contract.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//! use storage_harness::*;
//!
//! document_service_tests!(InMemoryBackend::new());
//! ```
//!
//! [`StorageBackend`]: tourbook::core::service::StorageBackend
//! [`DocumentService`]: tourbook::core::service::DocumentService

#![allow(dead_code)]

pub mod document_service_tests;

use serde_json::{Value, json};
use tourbook::core::document::Document;
use tourbook::core::service::{CollectionSpec, DocumentService};
use uuid::Uuid;

/// Collection spec with a unique `name` index
pub fn tours_spec() -> CollectionSpec {
    CollectionSpec {
        name: "harness_tours".to_string(),
        unique_indexes: vec![vec!["name".to_string()]],
    }
}

/// Collection spec with a compound unique index
pub fn reviews_spec() -> CollectionSpec {
    CollectionSpec {
        name: "harness_reviews".to_string(),
        unique_indexes: vec![vec!["tour".to_string(), "user".to_string()]],
    }
}

pub fn document(value: Value) -> Document {
    value.as_object().cloned().expect("fixture must be an object")
}

/// A stored tour as the schema layer would hand it to a backend
pub fn tour(name: &str, price: i64, difficulty: &str) -> Document {
    document(json!({
        "_id": Uuid::new_v4().to_string(),
        "__v": 0,
        "name": name,
        "price": price,
        "difficulty": difficulty,
        "secretTour": false,
        "startDates": ["2021-04-25T09:00:00.000Z"]
    }))
}

/// Insert four tours with distinct prices
pub async fn seed(service: &dyn DocumentService) -> Vec<Document> {
    let fixtures = vec![
        tour("The Forest Hiker", 397, "easy"),
        tour("The Sea Explorer", 497, "medium"),
        tour("The Snow Adventurer", 997, "difficult"),
        tour("The City Wanderer", 1197, "easy"),
    ];
    let mut stored = Vec::new();
    for doc in fixtures {
        stored.push(service.insert(doc).await.expect("Failed to seed"));
    }
    stored
}

pub fn id(doc: &Document) -> &str {
    doc["_id"].as_str().expect("document has an _id")
}

pub fn names(docs: &[Document]) -> Vec<&str> {
    docs.iter().filter_map(|d| d["name"].as_str()).collect()
}
