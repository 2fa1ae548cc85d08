//! Macro-generated test suite for the `DocumentService` contract.
//!
//! # Generated Tests
//!
//! ## CRUD
//! - `test_insert_and_find_one`: stored document comes back unchanged
//! - `test_find_one_missing`: unknown id yields `None`
//! - `test_update_sets_fields_and_bumps_version`
//! - `test_update_missing`: unknown id yields `None`
//! - `test_delete_returns_removed_document`
//!
//! ## Queries
//! - `test_filter_operators`: eq, ne, in and range comparisons
//! - `test_sort_skip_limit`
//! - `test_projection`: inclusion and exclusion, `_id` always kept
//! - `test_count`
//!
//! ## Indexes
//! - `test_unique_index`: duplicates rejected on insert and update
//! - `test_compound_unique_index`

/// Generate a `DocumentService` conformance suite.
///
/// `$factory` must evaluate to a `StorageBackend`. It is re-evaluated for
/// each test to ensure isolation.
#[macro_export]
macro_rules! document_service_tests {
    ($factory:expr) => {
        mod document_service_contract_tests {
            use super::*;
            use serde_json::json;
            use tourbook::core::error::StorageError;
            use tourbook::core::query::{
                ComparisonOp, Predicate, Projection, QueryDescriptor, SortSpec,
            };
            use tourbook::core::service::StorageBackend;

            // ==================================================================
            // CRUD
            // ==================================================================

            #[tokio::test]
            async fn test_insert_and_find_one() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                let doc = tour("The Forest Hiker", 397, "easy");

                let stored = service.insert(doc.clone()).await.unwrap();
                assert_eq!(stored, doc);

                let found = service
                    .find_one(&Predicate::eq("_id", id(&doc)))
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(found, doc);
            }

            #[tokio::test]
            async fn test_find_one_missing() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                seed(service.as_ref()).await;

                let found = service
                    .find_one(&Predicate::eq("_id", uuid::Uuid::new_v4().to_string()))
                    .await
                    .unwrap();
                assert!(found.is_none());
            }

            #[tokio::test]
            async fn test_update_sets_fields_and_bumps_version() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                let stored = seed(service.as_ref()).await;
                let target = id(&stored[0]).to_string();

                let updated = service
                    .update_one(
                        &Predicate::eq("_id", target.as_str()),
                        document(json!({"price": 450})),
                    )
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(updated["price"], json!(450));
                assert_eq!(updated["name"], json!("The Forest Hiker"));
                assert_eq!(updated["__v"], json!(1));

                let found = service
                    .find_one(&Predicate::eq("_id", target.as_str()))
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(found, updated);
            }

            #[tokio::test]
            async fn test_update_missing() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                seed(service.as_ref()).await;

                let updated = service
                    .update_one(
                        &Predicate::eq("name", "The Moon Walker"),
                        document(json!({"price": 1})),
                    )
                    .await
                    .unwrap();
                assert!(updated.is_none());
            }

            #[tokio::test]
            async fn test_delete_returns_removed_document() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                let stored = seed(service.as_ref()).await;
                let target = Predicate::eq("_id", id(&stored[1]));

                let deleted = service.delete_one(&target).await.unwrap().unwrap();
                assert_eq!(deleted["name"], json!("The Sea Explorer"));
                assert!(service.find_one(&target).await.unwrap().is_none());
                assert!(service.delete_one(&target).await.unwrap().is_none());
                assert_eq!(service.count(&Predicate::all()).await.unwrap(), 3);
            }

            // ==================================================================
            // Queries
            // ==================================================================

            #[tokio::test]
            async fn test_filter_operators() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                seed(service.as_ref()).await;
                let by_price = SortSpec::parse("price");

                let query = |predicate: Predicate| QueryDescriptor {
                    sort: by_price.clone(),
                    ..QueryDescriptor::new(predicate)
                };

                let easy = service.find(&query(Predicate::eq("difficulty", "easy"))).await.unwrap();
                assert_eq!(names(&easy), vec!["The Forest Hiker", "The City Wanderer"]);

                let range = Predicate::compare("price", ComparisonOp::Gte, 497)
                    .and(Predicate::compare("price", ComparisonOp::Lt, 1197));
                let mid = service.find(&query(range)).await.unwrap();
                assert_eq!(names(&mid), vec!["The Sea Explorer", "The Snow Adventurer"]);

                let not_easy = service
                    .find(&query(Predicate::ne("difficulty", "easy")))
                    .await
                    .unwrap();
                assert_eq!(names(&not_easy), vec!["The Sea Explorer", "The Snow Adventurer"]);

                let either = Predicate::any_of("difficulty", vec![json!("medium"), json!("difficult")]);
                assert_eq!(service.find(&query(either)).await.unwrap().len(), 2);

                let dated = Predicate::compare("startDates", ComparisonOp::Gte, "2021-01-01T00:00:00.000Z");
                assert_eq!(service.find(&query(dated)).await.unwrap().len(), 4);
            }

            #[tokio::test]
            async fn test_sort_skip_limit() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                seed(service.as_ref()).await;

                let page = QueryDescriptor {
                    sort: SortSpec::parse("-price"),
                    skip: 1,
                    limit: Some(2),
                    ..QueryDescriptor::new(Predicate::all())
                };
                let found = service.find(&page).await.unwrap();
                assert_eq!(names(&found), vec!["The Snow Adventurer", "The Sea Explorer"]);

                let chained = QueryDescriptor {
                    sort: SortSpec::parse("difficulty,-price"),
                    ..QueryDescriptor::new(Predicate::all())
                };
                let found = service.find(&chained).await.unwrap();
                assert_eq!(
                    names(&found),
                    vec![
                        "The Snow Adventurer",
                        "The City Wanderer",
                        "The Forest Hiker",
                        "The Sea Explorer"
                    ]
                );
            }

            #[tokio::test]
            async fn test_projection() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                seed(service.as_ref()).await;

                let included = QueryDescriptor {
                    projection: Projection::include(&["name", "price"]),
                    ..QueryDescriptor::new(Predicate::eq("name", "The Forest Hiker"))
                };
                let found = service.find(&included).await.unwrap();
                let mut keys: Vec<&str> = found[0].keys().map(String::as_str).collect();
                keys.sort();
                assert_eq!(keys, vec!["_id", "name", "price"]);

                let excluded = QueryDescriptor {
                    projection: Projection::exclude(&["__v", "startDates"]),
                    ..QueryDescriptor::new(Predicate::eq("name", "The Forest Hiker"))
                };
                let found = service.find(&excluded).await.unwrap();
                assert!(found[0].contains_key("_id"));
                assert!(found[0].contains_key("difficulty"));
                assert!(!found[0].contains_key("__v"));
                assert!(!found[0].contains_key("startDates"));

                let without_id = QueryDescriptor {
                    projection: Projection::exclude(&["_id", "price"]),
                    ..QueryDescriptor::new(Predicate::eq("name", "The Forest Hiker"))
                };
                let found = service.find(&without_id).await.unwrap();
                assert!(found[0].contains_key("_id"));
                assert!(found[0].contains_key("name"));
                assert!(!found[0].contains_key("price"));
            }

            #[tokio::test]
            async fn test_count() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                seed(service.as_ref()).await;

                assert_eq!(service.count(&Predicate::all()).await.unwrap(), 4);
                assert_eq!(service.count(&Predicate::eq("difficulty", "easy")).await.unwrap(), 2);
                assert_eq!(service.count(&Predicate::eq("secretTour", true)).await.unwrap(), 0);
            }

            // ==================================================================
            // Indexes
            // ==================================================================

            #[tokio::test]
            async fn test_unique_index() {
                let backend = $factory;
                let service = backend.collection(tours_spec()).await.unwrap();
                let stored = seed(service.as_ref()).await;

                let err = service
                    .insert(tour("The Forest Hiker", 1, "easy"))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StorageError::DuplicateKey { ref value, .. } if value == "The Forest Hiker"));

                let err = service
                    .update_one(
                        &Predicate::eq("_id", id(&stored[1])),
                        document(json!({"name": "The Forest Hiker"})),
                    )
                    .await
                    .unwrap_err();
                assert!(matches!(err, StorageError::DuplicateKey { .. }));
                assert_eq!(service.count(&Predicate::all()).await.unwrap(), 4);
            }

            #[tokio::test]
            async fn test_compound_unique_index() {
                let backend = $factory;
                let service = backend.collection(reviews_spec()).await.unwrap();
                let review = |tour: &str, user: &str| {
                    document(json!({
                        "_id": uuid::Uuid::new_v4().to_string(),
                        "tour": tour,
                        "user": user,
                        "rating": 5
                    }))
                };

                service.insert(review("t1", "u1")).await.unwrap();
                service.insert(review("t1", "u2")).await.unwrap();
                service.insert(review("t2", "u1")).await.unwrap();
                let err = service.insert(review("t1", "u1")).await.unwrap_err();
                assert!(matches!(err, StorageError::DuplicateKey { .. }));
            }
        }
    };
}
