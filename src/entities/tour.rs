//! Tours: the central resource
//!
//! Besides the generic handlers, tours expose an alias route for the five
//! best cheap tours, two aggregate reports and two geospatial queries.

use super::{REVIEW_MODEL, TOUR_MODEL, USER_MODEL};
use crate::core::auth::AuthPolicy;
use crate::core::document::Document;
use crate::core::error::{AppResult, FieldValidationError, StorageError, ValidationError};
use crate::core::geo::{DistanceUnit, LatLng};
use crate::core::model::{Model, Relation};
use crate::core::query::{ComparisonOp, Predicate, Projection, QueryParams};
use crate::core::schema::{FieldDef, FieldKind, Schema};
use crate::core::service::StorageBackend;
use crate::core::validation::filters::round_decimals;
use crate::core::validation::validators::{in_list, max_length, max_value, min_length, min_value};
use crate::server::factory::{Envelope, ResourceDescriptor, ResourceHandlers, RoutePolicies};
use crate::server::resource_registry::Resource;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
};
use chrono::{DateTime, Datelike, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};

const STAFF: [&str; 2] = ["admin", "lead-guide"];
const PLANNERS: [&str; 3] = ["admin", "lead-guide", "guide"];

/// Query applied by `GET /tours/top-5-cheap`
const TOP_CHEAP_ALIAS: [(&str, &str); 3] = [
    ("limit", "5"),
    ("sort", "-ratingsAverage,price"),
    ("fields", "name,price,ratingsAverage,summary,difficulty"),
];

pub fn tour_schema() -> Schema {
    Schema::new()
        .field(
            FieldDef::new("name", FieldKind::String)
                .required("A tour must have a name")
                .unique()
                .trim()
                .validate(max_length(40, "A tour name must have less or equal then 40 characters"))
                .validate(min_length(10, "A tour name must have more or equal then 10 characters")),
        )
        .field(FieldDef::new("duration", FieldKind::Number).required("A tour must have a duration"))
        .field(
            FieldDef::new("maxGroupSize", FieldKind::Number)
                .required("A tour must have a group size"),
        )
        .field(
            FieldDef::new("difficulty", FieldKind::String)
                .required("A tour must have a difficulty")
                .validate(in_list(
                    &["easy", "medium", "difficult"],
                    "Difficulty is either: easy, medium, difficult",
                )),
        )
        .field(
            FieldDef::new("ratingsAverage", FieldKind::Number)
                .default_value(4.5)
                .set(round_decimals(1))
                .validate(min_value(1.0, "Rating must be above 1.0"))
                .validate(max_value(5.0, "Rating must be below 5.0")),
        )
        .field(FieldDef::new("ratingsQuantity", FieldKind::Number).default_value(0))
        .field(FieldDef::new("price", FieldKind::Number).required("A tour must have a price"))
        .field(FieldDef::new("priceDiscount", FieldKind::Number))
        .field(
            FieldDef::new("summary", FieldKind::String)
                .trim()
                .required("A tour must have a description"),
        )
        .field(FieldDef::new("description", FieldKind::String).trim())
        .field(
            FieldDef::new("imageCover", FieldKind::String)
                .required("A tour must have a cover image"),
        )
        .field(FieldDef::array("images", FieldKind::String))
        .field(FieldDef::array("startDates", FieldKind::Date))
        .field(FieldDef::new("secretTour", FieldKind::Boolean).default_value(false))
        .field(FieldDef::new("startLocation", FieldKind::GeoPoint))
        .field(FieldDef::array("locations", FieldKind::GeoPoint))
        .field(FieldDef::array("guides", FieldKind::ObjectId))
        .with_created_at()
        .check(discount_below_price)
}

fn discount_below_price(doc: &Document) -> Result<(), FieldValidationError> {
    let discount = doc.get("priceDiscount").and_then(Value::as_f64);
    let price = doc.get("price").and_then(Value::as_f64);
    match (discount, price) {
        (Some(discount), Some(price)) if discount >= price => Err(FieldValidationError::new(
            "priceDiscount",
            format!("Discount price ({}) should be below regular price", discount),
        )),
        _ => Ok(()),
    }
}

fn duration_weeks(doc: &Document) -> Option<Value> {
    let duration = doc.get("duration")?.as_f64()?;
    Some(json!(duration / 7.0))
}

pub struct TourResource;

#[async_trait]
impl Resource for TourResource {
    fn name(&self) -> &str {
        "tour"
    }

    async fn model(&self, backend: &dyn StorageBackend) -> Result<Model, StorageError> {
        Ok(Model::register(backend, TOUR_MODEL, "tours", tour_schema())
            .await?
            .with_default_scope(Predicate::ne("secretTour", true))
            .with_virtual("durationWeeks", duration_weeks))
    }

    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::new("tour", "tours", TOUR_MODEL)
            .populate(
                Relation::reference("guides", USER_MODEL)
                    .select(Projection::exclude(&["__v", "passwordChangedAt"])),
            )
            .populate_detail(
                Relation::virtual_field("reviews", REVIEW_MODEL, "tour").nested(
                    Relation::reference("user", USER_MODEL)
                        .select(Projection::include(&["name", "photo"])),
                ),
            )
            .policies(RoutePolicies {
                create: AuthPolicy::roles(&STAFF),
                update: AuthPolicy::roles(&STAFF),
                delete: AuthPolicy::roles(&STAFF),
                ..Default::default()
            })
    }

    fn build_routes(&self, handlers: &ResourceHandlers) -> Router {
        let reports = Router::new()
            .route("/tours/top-5-cheap", get(top_five_cheap))
            .route("/tours/tour-stats", get(tour_stats))
            .route("/tours/monthly-plan/{year}", get(get_monthly_plan))
            .route(
                "/tours/tours-within/{distance}/center/{latlng}/unit/{unit}",
                get(tours_within),
            )
            .route("/tours/distances/{latlng}/unit/{unit}", get(distances))
            .with_state(handlers.clone());
        handlers.routes().merge(reports)
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Aggregates of one difficulty level
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    #[serde(rename = "_id")]
    pub difficulty: String,
    pub num_tours: u64,
    pub num_ratings: u64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Default)]
struct StatsAccumulator {
    tours: u64,
    ratings: u64,
    rating_sum: f64,
    rated: u64,
    prices: Vec<f64>,
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Group tours by upper-cased difficulty, cheapest average price first
pub fn difficulty_stats(tours: &[Document]) -> Vec<DifficultyStats> {
    let mut groups: IndexMap<String, StatsAccumulator> = IndexMap::new();
    for tour in tours {
        let difficulty = tour
            .get("difficulty")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_uppercase();
        let acc = groups.entry(difficulty).or_default();
        acc.tours += 1;
        acc.ratings += tour.get("ratingsQuantity").and_then(Value::as_u64).unwrap_or(0);
        if let Some(rating) = tour.get("ratingsAverage").and_then(Value::as_f64) {
            acc.rating_sum += rating;
            acc.rated += 1;
        }
        if let Some(price) = tour.get("price").and_then(Value::as_f64) {
            acc.prices.push(price);
        }
    }

    let mut stats: Vec<DifficultyStats> = groups
        .into_iter()
        .map(|(difficulty, acc)| DifficultyStats {
            difficulty,
            num_tours: acc.tours,
            num_ratings: acc.ratings,
            avg_rating: mean(acc.rating_sum, acc.rated),
            avg_price: mean(acc.prices.iter().sum(), acc.prices.len() as u64),
            min_price: acc.prices.iter().copied().fold(f64::INFINITY, f64::min),
            max_price: acc.prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
        .collect();
    stats.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
    stats
}

/// Tour starts of one month
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthPlan {
    pub month: u32,
    pub num_tour_starts: u64,
    pub tours: Vec<String>,
}

/// Tour starts per month of `year`, busiest month first
pub fn monthly_plan(tours: &[Document], year: i32) -> Vec<MonthPlan> {
    let mut months: IndexMap<u32, Vec<String>> = IndexMap::new();
    for tour in tours {
        let name = tour.get("name").and_then(Value::as_str).unwrap_or_default();
        let starts = tour
            .get("startDates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for start in starts.iter().filter_map(Value::as_str) {
            let Ok(date) = DateTime::parse_from_rfc3339(start) else {
                continue;
            };
            let date = date.with_timezone(&Utc);
            if date.year() == year {
                months.entry(date.month()).or_default().push(name.to_string());
            }
        }
    }

    let mut plan: Vec<MonthPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthPlan {
            month,
            num_tour_starts: tours.len() as u64,
            tours,
        })
        .collect();
    plan.sort_by(|a, b| {
        b.num_tour_starts
            .cmp(&a.num_tour_starts)
            .then(a.month.cmp(&b.month))
    });
    plan.truncate(12);
    plan
}

async fn top_five_cheap(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    params: QueryParams,
) -> AppResult<Json<Envelope>> {
    handlers
        .authorize(&handlers.descriptor().policies.list, &headers)
        .await?;
    let params = TOP_CHEAP_ALIAS
        .iter()
        .fold(params, |params, (key, value)| params.with(*key, *value));
    Ok(Json(handlers.list(&params, None).await?))
}

async fn tour_stats(State(handlers): State<ResourceHandlers>) -> AppResult<Json<Value>> {
    let tours = handlers
        .model()
        .find(Predicate::compare("ratingsAverage", ComparisonOp::Gte, 4.5))
        .exec()
        .await?;
    let stats = difficulty_stats(&tours);
    Ok(Json(json!({"status": "success", "data": {"stats": stats}})))
}

async fn get_monthly_plan(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    Path(year): Path<String>,
) -> AppResult<Json<Value>> {
    handlers.authorize(&AuthPolicy::roles(&PLANNERS), &headers).await?;
    let year_number: i32 = year
        .trim()
        .parse()
        .map_err(|_| ValidationError::cast("year", &year))?;
    let tours = handlers.model().find(Predicate::all()).exec().await?;
    let plan = monthly_plan(&tours, year_number);
    Ok(Json(json!({"status": "success", "results": plan.len(), "data": {"plan": plan}})))
}

fn start_of(tour: &Document) -> Option<LatLng> {
    tour.get("startLocation").and_then(LatLng::from_geojson)
}

async fn tours_within(
    State(handlers): State<ResourceHandlers>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> AppResult<Json<Envelope>> {
    let radius: f64 = distance
        .parse()
        .map_err(|_| ValidationError::cast("distance", &distance))?;
    let center: LatLng = latlng.parse()?;
    let unit: DistanceUnit = unit.parse()?;

    let tours = handlers.model().find(Predicate::all()).exec().await?;
    let inside: Vec<Document> = tours
        .into_iter()
        .filter(|tour| start_of(tour).is_some_and(|start| center.within(&start, radius, unit)))
        .collect();
    let inside = handlers
        .models()
        .expand(inside, &handlers.descriptor().populate)
        .await?;
    tracing::debug!(radius, results = inside.len(), "tours within");
    Ok(Json(Envelope::many(inside)))
}

async fn distances(
    State(handlers): State<ResourceHandlers>,
    Path((latlng, unit)): Path<(String, String)>,
) -> AppResult<Json<Envelope>> {
    let origin: LatLng = latlng.parse()?;
    let unit: DistanceUnit = unit.parse()?;

    let tours = handlers
        .model()
        .find(Predicate::all())
        .select(Projection::include(&["name", "startLocation"]))
        .exec()
        .await?;
    let mut measured: Vec<(f64, Document)> = tours
        .into_iter()
        .filter_map(|tour| {
            let distance = origin.distance_meters(&start_of(&tour)?) * unit.from_meters();
            let mut row = Document::new();
            row.insert("_id".to_string(), tour.get("_id").cloned().unwrap_or(Value::Null));
            row.insert("name".to_string(), tour.get("name").cloned().unwrap_or(Value::Null));
            row.insert("distance".to_string(), json!(distance));
            Some((distance, row))
        })
        .collect();
    measured.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(Json(Envelope::many(measured.into_iter().map(|(_, row)| row).collect())))
}
