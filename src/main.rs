//! Tourbook API server
//!
//! Reads its configuration (see [`tourbook::config`]) and serves the tour,
//! review and user resources until interrupted.

use anyhow::Result;
use tourbook::config::{AppConfig, StorageConfig};
use tourbook::entities;
use tourbook::server::ServerBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let address = config.server.address();
    tracing::info!(environment = ?config.environment, "starting tourbook");

    let builder = match &config.storage {
        StorageConfig::InMemory => ServerBuilder::new(),
        #[cfg(feature = "mongodb_backend")]
        StorageConfig::Mongodb { uri, database } => ServerBuilder::new()
            .with_backend(tourbook::storage::MongoBackend::connect(uri, database).await?),
        #[cfg(not(feature = "mongodb_backend"))]
        StorageConfig::Mongodb { .. } => {
            anyhow::bail!(
                "MongoDB storage is configured but the `mongodb_backend` feature is disabled"
            )
        }
    };

    entities::register_all(builder.with_config(config))
        .serve(&address)
        .await
}
