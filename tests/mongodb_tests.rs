//! Integration tests for the MongoDB backend using the storage test harness.
//!
//! # Requirements
//!
//! - Docker must be running (testcontainers launches a MongoDB container)
//! - Feature flag `mongodb_backend` must be enabled
//!
//! # Running
//!
//! ```sh
//! cargo test --features mongodb_backend --test mongodb_tests
//! ```
//!
//! All tests share a single MongoDB container (via `OnceCell`). Each test
//! gets a database of its own.

#![cfg(feature = "mongodb_backend")]

#[macro_use]
mod storage_harness;

use std::sync::atomic::{AtomicU64, Ordering};
use storage_harness::*;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;
use tokio::sync::OnceCell;
use tourbook::storage::MongoBackend;

/// Holds the testcontainer handle (keeps it alive) and the connection URL.
struct MongoTestEnv {
    _container: ContainerAsync<Mongo>,
    connection_url: String,
}

static TEST_ENV: OnceCell<MongoTestEnv> = OnceCell::const_new();

async fn init_mongo_env() -> &'static MongoTestEnv {
    TEST_ENV
        .get_or_init(|| async {
            let container = Mongo::default()
                .start()
                .await
                .expect("Failed to start MongoDB container, is Docker running?");
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(27017).await.unwrap();
            MongoTestEnv {
                connection_url: format!("mongodb://{}:{}", host, port),
                _container: container,
            }
        })
        .await
}

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Backend on a fresh database, so tests can run in parallel
async fn mongo_backend() -> MongoBackend {
    let env = init_mongo_env().await;
    let db_num = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    MongoBackend::connect(&env.connection_url, &format!("tourbook_test_{}", db_num))
        .await
        .expect("Failed to connect to MongoDB")
}

document_service_tests!(mongo_backend().await);
