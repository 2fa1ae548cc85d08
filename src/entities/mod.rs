//! The tour-booking resources
//!
//! ```rust,ignore
//! let app = entities::register_all(ServerBuilder::new().with_config(config))
//!     .build()
//!     .await?;
//! ```

pub mod review;
pub mod tour;
pub mod user;

use crate::server::ServerBuilder;

pub use review::ReviewResource;
pub use tour::TourResource;
pub use user::UserResource;

pub const TOUR_MODEL: &str = "Tour";
pub const REVIEW_MODEL: &str = "Review";
pub const USER_MODEL: &str = "User";

/// Register tours, reviews and users, identifying callers against the users
pub fn register_all(builder: ServerBuilder) -> ServerBuilder {
    builder
        .register(TourResource)
        .register(ReviewResource)
        .register(UserResource)
        .with_header_auth(USER_MODEL)
}
