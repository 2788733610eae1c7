//! Pet Registry REST API Server
//!
//! ## Usage
//!
//! ```bash
//! # Start the server against Postgres (migrations run on startup)
//! DATABASE_URL=postgresql://localhost/pets cargo run --bin pet_server --features server
//!
//! # Or without a database
//! PETS_STORE=memory cargo run --bin pet_server --features server
//!
//! # Test endpoints
//! curl -X POST http://localhost:3000/api/pets/ \
//!   -H "Content-Type: application/json" \
//!   -d '{
//!     "name": "Rex", "age": 3, "weight": 12.5, "sex": "Male",
//!     "group": {"scientific_name": "Canis lupus"},
//!     "traits": [{"name": "Friendly"}, {"name": "Loyal"}]
//!   }'
//!
//! curl "http://localhost:3000/api/pets/?trait=loyal"
//! curl -X PATCH http://localhost:3000/api/pets/1/ \
//!   -H "Content-Type: application/json" -d '{"traits": [{"name": "calm"}]}'
//! curl -X DELETE http://localhost:3000/api/pets/1/
//! ```

use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pet_registry::api::{create_pet_router, PetAppState};
use pet_registry::config::{ServerConfig, StoreBackend};
use pet_registry::database::{DatabaseConfig, DatabaseManager, InMemoryPetStore, PetStore};
use pet_registry::services::PetResolutionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pet_registry=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    info!("Starting pet registry server ({:?} store)", config.store);

    let store: Arc<dyn PetStore> = match config.store {
        StoreBackend::Postgres => {
            let db = DatabaseManager::new(DatabaseConfig::default())
                .await
                .context("Failed to connect to database")?;
            db.run_migrations()
                .await
                .context("Failed to run migrations")?;
            Arc::new(db.pet_store())
        }
        StoreBackend::Memory => Arc::new(InMemoryPetStore::new()),
    };

    let state = PetAppState::new(PetResolutionService::new(store)).with_page_size(config.page_size);

    let app = create_pet_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server running on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
