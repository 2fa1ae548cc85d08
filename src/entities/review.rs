//! Reviews, also reachable under `/tours/{id}/reviews`
//!
//! Every write recomputes the reviewed tour's rating average and count.

use super::{REVIEW_MODEL, TOUR_MODEL, USER_MODEL};
use crate::core::auth::AuthPolicy;
use crate::core::document::Document;
use crate::core::error::{AppResult, StorageError};
use crate::core::model::{Model, ModelRegistry, Relation, UpdateOptions};
use crate::core::query::{Predicate, Projection};
use crate::core::schema::{FieldDef, FieldKind, Schema};
use crate::core::service::StorageBackend;
use crate::core::validation::validators::{max_value, min_value};
use crate::server::factory::{PostWriteHook, ResourceDescriptor, RoutePolicies, WriteEvent};
use crate::server::resource_registry::Resource;
use async_trait::async_trait;
use serde_json::{Value, json};

/// Rating a tour falls back to once it has no reviews
pub const DEFAULT_RATING: f64 = 4.5;

pub fn review_schema() -> Schema {
    Schema::new()
        .field(FieldDef::new("review", FieldKind::String).required("Review cannot be empty!"))
        .field(
            FieldDef::new("rating", FieldKind::Number)
                .validate(min_value(
                    1.0,
                    "Path `rating` ({VALUE}) is less than minimum allowed value (1).",
                ))
                .validate(max_value(
                    5.0,
                    "Path `rating` ({VALUE}) is more than maximum allowed value (5).",
                )),
        )
        .field(FieldDef::new("tour", FieldKind::ObjectId).required("Review must belong to a tour!"))
        .field(FieldDef::new("user", FieldKind::ObjectId).required("Review must belong to a user!"))
        .with_created_at()
        .unique_together(&["tour", "user"])
}

/// Recompute `ratingsAverage` and `ratingsQuantity` of a tour from its reviews
pub async fn calc_average_ratings(models: &ModelRegistry, tour_id: &str) -> AppResult<()> {
    let reviews = models
        .get(REVIEW_MODEL)?
        .find(Predicate::eq("tour", tour_id))
        .select(Projection::include(&["rating"]))
        .exec()
        .await?;
    let ratings: Vec<f64> = reviews
        .iter()
        .filter_map(|review| review.get("rating").and_then(Value::as_f64))
        .collect();

    let (average, quantity) = if ratings.is_empty() {
        (DEFAULT_RATING, 0)
    } else {
        (ratings.iter().sum::<f64>() / ratings.len() as f64, ratings.len())
    };

    let updated = models
        .get(TOUR_MODEL)?
        .find_by_id_and_update(
            tour_id,
            json!({"ratingsAverage": average, "ratingsQuantity": quantity}),
            UpdateOptions {
                run_validators: false,
            },
        )
        .await?;
    tracing::debug!(
        tour = tour_id,
        average,
        quantity,
        found = updated.is_some(),
        "tour ratings recalculated"
    );
    Ok(())
}

pub struct RecalculateTourRatings;

fn reviewed_tour(review: &Document) -> Option<&str> {
    review.get("tour").and_then(Value::as_str)
}

#[async_trait]
impl PostWriteHook for RecalculateTourRatings {
    async fn after_write(&self, event: WriteEvent<'_>, models: &ModelRegistry) -> AppResult<()> {
        let current = reviewed_tour(event.document);
        if let Some(tour_id) = current {
            calc_average_ratings(models, tour_id).await?;
        }
        // the tour a review was moved away from
        match event.previous.and_then(reviewed_tour) {
            Some(previous) if Some(previous) != current => {
                calc_average_ratings(models, previous).await
            }
            _ => Ok(()),
        }
    }
}

pub struct ReviewResource;

#[async_trait]
impl Resource for ReviewResource {
    fn name(&self) -> &str {
        "review"
    }

    async fn model(&self, backend: &dyn StorageBackend) -> Result<Model, StorageError> {
        Model::register(backend, REVIEW_MODEL, "reviews", review_schema()).await
    }

    fn descriptor(&self) -> ResourceDescriptor {
        let writers = AuthPolicy::roles(&["user", "admin"]);
        ResourceDescriptor::new("review", "reviews", REVIEW_MODEL)
            .populate(
                Relation::reference("user", USER_MODEL)
                    .select(Projection::include(&["name", "photo"])),
            )
            .nested_under("tours", "tour")
            .owned_by("user")
            .policies(RoutePolicies {
                create: AuthPolicy::roles(&["user"]),
                update: writers.clone(),
                delete: writers,
                ..RoutePolicies::all(AuthPolicy::Authenticated)
            })
            .after_write(RecalculateTourRatings)
    }
}
