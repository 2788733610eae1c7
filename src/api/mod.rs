//! REST API module
//!
//! Axum routers for the pet registry. Enabled by the `server` feature.

pub mod pagination;
pub mod pet_routes;

pub use pagination::{InvalidPage, PageRequest, Paginated};
pub use pet_routes::{create_pet_router, ApiError, ListPetsQuery, PetAppState};
