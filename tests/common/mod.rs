//! Shared fixtures for the HTTP integration tests
//!
//! Each test gets its own in-memory application. Users and tours are seeded
//! through the models directly so tests only exercise the routes they name.

#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;
use tourbook::config::{AppConfig, Environment};
use tourbook::core::model::ModelRegistry;
use tourbook::entities::{self, TOUR_MODEL, USER_MODEL};
use tourbook::server::{RestExposure, ServerBuilder};

pub struct TestApp {
    pub server: TestServer,
    pub models: Arc<ModelRegistry>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_environment(Environment::Development).await
    }

    pub async fn with_environment(environment: Environment) -> Self {
        let config = AppConfig {
            environment,
            ..Default::default()
        };
        let host = entities::register_all(ServerBuilder::new().with_config(config))
            .build_host()
            .await
            .expect("Failed to build host");
        let host = Arc::new(host);
        let models = host.models.clone();
        let router = RestExposure::build_router(host).expect("Failed to build router");
        let server = TestServer::try_new(router).expect("Failed to create test server");

        Self { server, models }
    }

    /// Store a user with the given role and return its id
    pub async fn user(&self, name: &str, role: &str) -> String {
        let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
        let user = self
            .models
            .get(USER_MODEL)
            .unwrap()
            .create(json!({
                "name": name,
                "email": email,
                "role": role,
                "password": "pass1234",
                "passwordConfirm": "pass1234"
            }))
            .await
            .expect("Failed to create user");
        id_of(&Value::Object(user))
    }

    /// Store a tour built from [`tour_payload`] merged with `overrides`
    pub async fn tour(&self, name: &str, overrides: Value) -> String {
        let mut payload = tour_payload(name);
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), overrides) {
            target.extend(extra);
        }
        let tour = self
            .models
            .get(TOUR_MODEL)
            .unwrap()
            .create(payload)
            .await
            .expect("Failed to create tour");
        id_of(&Value::Object(tour))
    }
}

/// A valid tour payload
pub fn tour_payload(name: &str) -> Value {
    json!({
        "name": name,
        "duration": 5,
        "maxGroupSize": 25,
        "difficulty": "easy",
        "price": 397,
        "summary": "Breathtaking hike through the Canadian Banff National Park",
        "imageCover": "tour-1-cover.jpg"
    })
}

pub fn id_of(doc: &Value) -> String {
    doc["_id"].as_str().expect("document has an _id").to_string()
}

/// Header identifying the caller
pub fn user_header() -> HeaderName {
    HeaderName::from_static("x-user-id")
}

pub fn header_value(user_id: &str) -> HeaderValue {
    HeaderValue::from_str(user_id).unwrap()
}

pub fn names(body: &Value) -> Vec<String> {
    body["data"]["data"]
        .as_array()
        .expect("list envelope")
        .iter()
        .map(|doc| doc["name"].as_str().unwrap_or_default().to_string())
        .collect()
}
