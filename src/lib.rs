//! Pet Registry
//!
//! Record management for pets, each belonging to a taxonomic group and tagged
//! with shared traits. Groups and traits are resolved by natural key and
//! created on demand when a pet references them.
//!
//! ## Architecture
//! Request body -> validator -> `PetResolutionService` -> `PetStore` (one
//! transaction per request) -> expanded `Pet`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pet_registry::database::InMemoryPetStore;
//! use pet_registry::services::PetResolutionService;
//!
//! # async fn run() -> Result<(), pet_registry::error::PetError> {
//! let service = PetResolutionService::new(Arc::new(InMemoryPetStore::new()));
//! let pet = service
//!     .create_pet_from_json(&serde_json::json!({
//!         "name": "Rex",
//!         "age": 3,
//!         "weight": 12.5,
//!         "group": {"scientific_name": "Canis lupus"},
//!         "traits": [{"name": "Friendly"}]
//!     }))
//!     .await?;
//! assert_eq!(pet.trait_names(), vec!["friendly"]);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Server configuration
pub mod config;

// Domain records and payloads
pub mod models;

// Entity Store: contract, in-memory backend, Postgres backend (when enabled)
pub mod database;

// Validation and the upsert-and-link protocol
pub mod services;

// REST API (when enabled)
#[cfg(feature = "server")]
pub mod api;

pub use error::{PetError, PetResult, ValidationErrors};
pub use models::{Group, Pet, PetTrait, Sex};
pub use services::PetResolutionService;
