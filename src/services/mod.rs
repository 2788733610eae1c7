//! Services module for pet registry business logic
//!
//! The validator turns raw request bodies into typed payloads; the resolution
//! service runs the upsert-and-link protocol against the Entity Store.

pub mod pet_resolution;
pub mod pet_validator;

pub use pet_resolution::{normalized_trait_names, PetPage, PetResolutionService};
pub use pet_validator::{validate_create, validate_update};
