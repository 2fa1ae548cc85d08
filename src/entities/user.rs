//! Users and the `me` routes of the authenticated caller
//!
//! Accounts are created through the (external) signup flow, so `POST /users`
//! is answered with an error. Deactivated users vanish from every query.

use super::USER_MODEL;
use crate::core::auth::AuthPolicy;
use crate::core::error::{AppResult, StorageError, ValidationError};
use crate::core::model::{Model, UpdateOptions};
use crate::core::query::Predicate;
use crate::core::schema::{FieldDef, FieldKind, Schema};
use crate::core::service::StorageBackend;
use crate::core::validation::validators::{email, in_list, min_length};
use crate::server::extract::JsonPayload;
use crate::server::factory::{
    Envelope, Operation, ResourceDescriptor, ResourceHandlers, RoutePolicies,
};
use crate::server::resource_registry::Resource;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{delete, get, patch},
};
use serde_json::json;

pub const ROLES: [&str; 4] = ["user", "guide", "lead-guide", "admin"];

/// Fields a user may change about themselves
const SELF_EDITABLE: [&str; 2] = ["name", "email"];

pub fn user_schema() -> Schema {
    Schema::new()
        .field(
            FieldDef::new("name", FieldKind::String)
                .required("Please tell us your name!")
                .trim(),
        )
        .field(
            FieldDef::new("email", FieldKind::String)
                .required("Please provide your email")
                .unique()
                .trim()
                .lowercase()
                .validate(email("Please provide a valid email")),
        )
        .field(FieldDef::new("photo", FieldKind::String).default_value("default.jpg"))
        .field(
            FieldDef::new("role", FieldKind::String)
                .default_value("user")
                .validate(in_list(&ROLES, "Role is either: user, guide, lead-guide, admin")),
        )
        .field(
            FieldDef::new("password", FieldKind::String)
                .required("Please provide a password")
                .validate(min_length(8, "A password must have at least 8 characters"))
                .hidden(),
        )
        .field(
            FieldDef::new("passwordConfirm", FieldKind::String)
                .required("Please confirm your password")
                .transient()
                .must_equal("password", "Passwords are not the same!"),
        )
        .field(FieldDef::new("passwordChangedAt", FieldKind::Date))
        .field(FieldDef::new("active", FieldKind::Boolean).default_value(true).hidden())
}

pub struct UserResource;

#[async_trait]
impl Resource for UserResource {
    fn name(&self) -> &str {
        "user"
    }

    async fn model(&self, backend: &dyn StorageBackend) -> Result<Model, StorageError> {
        Ok(Model::register(backend, USER_MODEL, "users", user_schema())
            .await?
            .with_default_scope(Predicate::ne("active", false)))
    }

    fn descriptor(&self) -> ResourceDescriptor {
        let admin = AuthPolicy::roles(&["admin"]);
        ResourceDescriptor::new("user", "users", USER_MODEL)
            .policies(RoutePolicies {
                update: admin.clone(),
                delete: admin,
                ..RoutePolicies::all(AuthPolicy::Authenticated)
            })
            .disable(
                Operation::Create,
                "This route is not defined! Please use /signup instead",
            )
    }

    fn build_routes(&self, handlers: &ResourceHandlers) -> Router {
        let me = Router::new()
            .route("/users/me", get(get_me))
            .route("/users/updateme", patch(update_me))
            .route("/users/deleteme", delete(delete_me))
            .with_state(handlers.clone());
        handlers.routes().merge(me)
    }
}

async fn get_me(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
) -> AppResult<Json<Envelope>> {
    let context = handlers
        .authorize(&AuthPolicy::Authenticated, &headers)
        .await?;
    let user_id = context.require_user()?;
    Ok(Json(handlers.get_one(user_id).await?))
}

async fn update_me(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    JsonPayload(payload): JsonPayload,
) -> AppResult<Json<Envelope>> {
    let context = handlers
        .authorize(&AuthPolicy::Authenticated, &headers)
        .await?;
    if payload.get("password").is_some() || payload.get("passwordConfirm").is_some() {
        return Err(ValidationError::rejected(
            "This route is not for password updates. Please use /updateMyPassword.",
        )
        .into());
    }
    let user_id = context.require_user()?;
    Ok(Json(
        handlers
            .restricted_to(&SELF_EDITABLE)
            .update(user_id, payload)
            .await?,
    ))
}

async fn delete_me(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let context = handlers
        .authorize(&AuthPolicy::Authenticated, &headers)
        .await?;
    let user_id = context.require_user()?;
    handlers
        .model()
        .find_by_id_and_update(user_id, json!({"active": false}), UpdateOptions::default())
        .await?;
    tracing::info!(user = user_id, "user deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> serde_json::Value {
        json!({
            "name": "Laura Wilson",
            "email": "  Laura@Example.COM ",
            "password": "pass1234",
            "passwordConfirm": "pass1234"
        })
    }

    #[test]
    fn test_signup_payload_is_normalized() {
        let doc = user_schema().prepare_insert(signup()).unwrap();
        assert_eq!(doc["email"], json!("laura@example.com"));
        assert_eq!(doc["role"], json!("user"));
        assert_eq!(doc["photo"], json!("default.jpg"));
        assert_eq!(doc["active"], json!(true));
        assert!(!doc.contains_key("passwordConfirm"));
    }

    #[test]
    fn test_password_confirmation_must_match() {
        let mut payload = signup();
        payload["passwordConfirm"] = json!("pass12345");
        let err = user_schema().prepare_insert(payload).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input data. Passwords are not the same!");
    }

    #[test]
    fn test_invalid_email_and_role() {
        let mut payload = signup();
        payload["email"] = json!("not-an-email");
        payload["role"] = json!("owner");
        let err = user_schema().prepare_insert(payload).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid input data. Please provide a valid email. Role is either: user, guide, lead-guide, admin"
        );
    }

    #[test]
    fn test_hidden_fields_are_stripped() {
        let schema = user_schema();
        let doc = schema.prepare_insert(signup()).unwrap();
        let shown = schema.strip_hidden(doc);
        assert!(!shown.contains_key("password"));
        assert!(!shown.contains_key("active"));
        assert!(shown.contains_key("name"));
    }
}
