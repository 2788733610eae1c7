//! Pet API Routes
//!
//! HTTP boundary over the pet resolution service.
//!
//! ## Endpoints
//!
//! - `POST   /api/pets/` - Create a pet (group and traits resolved on demand)
//! - `GET    /api/pets/?trait=<name>&page=<n>` - Paginated listing, optional trait filter
//! - `GET    /api/pets/{pet_id}/` - Fetch one pet
//! - `PATCH  /api/pets/{pet_id}/` - Partial update
//! - `DELETE /api/pets/{pet_id}/` - Delete (groups and traits are kept)
//! - `GET    /api/health` - Liveness
//!
//! Every route also answers without the trailing slash.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, RawQuery, State,
    },
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::error;

use super::pagination::{page_link, InvalidPage, PageRequest, Paginated};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::database::PetFilter;
use crate::error::PetError;
use crate::models::Pet;
use crate::services::PetResolutionService;

/// Application state for pet routes
#[derive(Clone)]
pub struct PetAppState {
    pub service: PetResolutionService,
    pub page_size: u64,
}

impl PetAppState {
    pub fn new(service: PetResolutionService) -> Self {
        Self {
            service,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Boundary errors and their HTTP rendering
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pet(#[from] PetError),

    #[error(transparent)]
    InvalidPage(#[from] InvalidPage),

    #[error("JSON parse error - {0}")]
    InvalidJson(String),

    #[error("Not found.")]
    UnknownRoute,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Pet(PetError::ValidationFailed(errors)) => {
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            ApiError::Pet(PetError::NotFound { .. }) | ApiError::UnknownRoute => {
                detail(StatusCode::NOT_FOUND, "Not found.")
            }
            ApiError::Pet(PetError::Store(err)) => {
                error!("Pet store failure: {}", err);
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            }
            ApiError::InvalidPage(err) => detail(StatusCode::NOT_FOUND, &err.to_string()),
            ApiError::InvalidJson(message) => detail(
                StatusCode::BAD_REQUEST,
                &format!("JSON parse error - {}", message),
            ),
        }
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Router
// ============================================================================

/// Create router for pet endpoints
pub fn create_pet_router(state: PetAppState) -> Router {
    Router::new()
        .route("/api/pets", get(list_pets).post(create_pet))
        .route("/api/pets/", get(list_pets).post(create_pet))
        .route(
            "/api/pets/:pet_id",
            get(get_pet).patch(update_pet).delete(delete_pet),
        )
        .route(
            "/api/pets/:pet_id/",
            get(get_pet).patch(update_pet).delete(delete_pet),
        )
        .route("/api/health", get(health))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Query params for pet listing
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListPetsQuery {
    /// Exact stored trait name (`?trait=`)
    pub trait_name: Option<String>,

    /// Kept as text so a malformed page is a 404, not a 400
    pub page: Option<String>,
}

impl ListPetsQuery {
    /// Parse a raw query string. A repeated key takes its last value and
    /// unknown keys are ignored, so parsing never fails.
    pub fn from_query(raw: Option<&str>) -> Self {
        let mut query = Self::default();
        for (key, value) in url::form_urlencoded::parse(raw.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "trait" => query.trait_name = Some(value.into_owned()),
                "page" => query.page = Some(value.into_owned()),
                _ => {}
            }
        }
        query
    }
}

/// POST /api/pets/
async fn create_pet(
    State(state): State<PetAppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Pet>)> {
    let Json(body) = body.map_err(|e| ApiError::InvalidJson(e.body_text()))?;
    let pet = state.service.create_pet_from_json(&body).await?;
    Ok((StatusCode::CREATED, Json(pet)))
}

/// GET /api/pets/
async fn list_pets(
    State(state): State<PetAppState>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    uri: Uri,
) -> ApiResult<Json<Paginated<Pet>>> {
    let query = ListPetsQuery::from_query(raw_query.as_deref());
    let page = PageRequest::parse(query.page.as_deref(), state.page_size)?;

    let filter = PetFilter {
        trait_name: query.trait_name.clone().filter(|t| !t.is_empty()),
        ..Default::default()
    }
    .window(page.offset(), page.limit());

    let listing = state.service.list_pets(&filter).await?;
    page.check_in_range(listing.count)?;

    let base_url = absolute_base_url(&headers, &uri);
    let mut params: Vec<(&str, &str)> = Vec::new();
    if let Some(trait_name) = query.trait_name.as_deref() {
        params.push(("trait", trait_name));
    }

    Ok(Json(Paginated {
        count: listing.count,
        next: page
            .has_next(listing.count)
            .then(|| page_link(&base_url, &params, page.page + 1)),
        previous: page
            .has_previous()
            .then(|| page_link(&base_url, &params, page.page - 1)),
        results: listing.pets,
    }))
}

/// GET /api/pets/{pet_id}/
async fn get_pet(
    State(state): State<PetAppState>,
    pet_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Pet>> {
    let Path(pet_id) = pet_id.map_err(|_| ApiError::UnknownRoute)?;
    Ok(Json(state.service.get_pet(pet_id).await?))
}

/// PATCH /api/pets/{pet_id}/
async fn update_pet(
    State(state): State<PetAppState>,
    pet_id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Pet>> {
    let Path(pet_id) = pet_id.map_err(|_| ApiError::UnknownRoute)?;
    let Json(body) = body.map_err(|e| ApiError::InvalidJson(e.body_text()))?;
    Ok(Json(state.service.update_pet_from_json(pet_id, &body).await?))
}

/// DELETE /api/pets/{pet_id}/
async fn delete_pet(
    State(state): State<PetAppState>,
    pet_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(pet_id) = pet_id.map_err(|_| ApiError::UnknownRoute)?;
    state.service.delete_pet(pet_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `http://<host><path>` for the current request, used for page links
fn absolute_base_url(headers: &HeaderMap, uri: &Uri) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let scheme = uri.scheme_str().unwrap_or("http");
    format!("{}://{}{}", scheme, host, uri.path())
}
