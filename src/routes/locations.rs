//! Location registry endpoints.
//!
//! - GET    /api/locations
//! - POST   /api/locations
//! - DELETE /api/locations/:id
//! - PUT    /api/locations/:id/favorite
//! - GET    /api/locations/search?q=...&limit=N

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AppState;
use crate::db::{models, queries};
use crate::errors::AppError;
use crate::services::openweather::GeoMatch;

/// Default number of geocoding hits returned by the search endpoint.
const DEFAULT_SEARCH_LIMIT: u32 = 5;

/// A tracked location.
#[derive(Debug, Serialize, ToSchema)]
pub struct LocationResponse {
    /// Unique location identifier
    pub id: Uuid,
    /// Unique display/lookup name (e.g. "Tokyo")
    pub name: String,
    /// Localized name (e.g. "東京"), cosmetic only
    pub name_local: Option<String>,
    /// Latitude (WGS84), used only for search/display
    pub latitude: Option<f64>,
    /// Longitude (WGS84), used only for search/display
    pub longitude: Option<f64>,
    /// 2-letter country code
    pub country_code: String,
    /// Favorite flag; favorites sort first in listings
    pub is_favorite: bool,
    /// Creation time in ISO 8601 / RFC 3339 format
    pub created_at: String,
}

impl From<models::Location> for LocationResponse {
    fn from(l: models::Location) -> Self {
        Self {
            id: l.id,
            name: l.name,
            name_local: l.name_local,
            latitude: l.latitude,
            longitude: l.longitude,
            country_code: l.country_code,
            is_favorite: l.is_favorite,
            created_at: l.created_at.to_rfc3339(),
        }
    }
}

/// Body for POST /api/locations.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddLocationRequest {
    /// Location name (required, unique)
    pub name: String,
    /// Localized name
    pub name_local: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// 2-letter country code; falls back to the configured default
    pub country_code: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Free-text location name query
    pub q: String,
    /// Maximum number of hits (default 5)
    pub limit: Option<u32>,
}

/// List all tracked locations, favorites first.
#[utoipa::path(
    get,
    path = "/api/locations",
    tag = "Locations",
    responses(
        (status = 200, description = "All tracked locations", body = Vec<LocationResponse>),
    )
)]
pub async fn list_locations(
    State(state): State<AppState>,
) -> Result<Json<Vec<LocationResponse>>, AppError> {
    let locations = queries::list_locations(&state.pool).await?;
    Ok(Json(locations.into_iter().map(Into::into).collect()))
}

/// Add a location.
///
/// Adding a name that already exists returns the existing record unchanged
/// rather than erroring.
#[utoipa::path(
    post,
    path = "/api/locations",
    tag = "Locations",
    request_body = AddLocationRequest,
    responses(
        (status = 201, description = "Location added (or already present)", body = LocationResponse),
        (status = 400, description = "Missing name or location limit reached", body = crate::errors::ErrorResponse),
    )
)]
pub async fn add_location(
    State(state): State<AppState>,
    Json(request): Json<AddLocationRequest>,
) -> Result<(StatusCode, Json<LocationResponse>), AppError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }

    // The cap only guards genuinely new locations; re-adding an existing
    // name stays idempotent even at the limit. Count-then-insert is racy:
    // two concurrent adds at the cap can both pass, briefly exceeding it
    // by one. Tolerated at this scale; the cap is advisory, not a schema
    // invariant.
    if queries::get_location_by_name(&state.pool, &name).await?.is_none()
        && queries::count_locations(&state.pool).await? >= state.config.max_locations
    {
        return Err(AppError::BadRequest(format!(
            "location limit reached ({} max)",
            state.config.max_locations
        )));
    }

    let location = queries::add_location(
        &state.pool,
        queries::NewLocation {
            name,
            name_local: request.name_local,
            latitude: request.latitude,
            longitude: request.longitude,
            country_code: request
                .country_code
                .unwrap_or_else(|| state.config.default_country_code.clone()),
        },
    )
    .await?;

    tracing::info!("Location added: {}", location.name);
    Ok((StatusCode::CREATED, Json(location.into())))
}

/// Delete a location and, with it, all of its cached forecasts.
#[utoipa::path(
    delete,
    path = "/api/locations/{id}",
    tag = "Locations",
    params(("id" = Uuid, Path, description = "Location UUID")),
    responses(
        (status = 204, description = "Location deleted"),
        (status = 404, description = "Location not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if queries::delete_location(&state.pool, id).await? {
        tracing::info!("Location deleted: {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Location {} not found", id)))
    }
}

/// Toggle the favorite flag on a location.
#[utoipa::path(
    put,
    path = "/api/locations/{id}/favorite",
    tag = "Locations",
    params(("id" = Uuid, Path, description = "Location UUID")),
    responses(
        (status = 200, description = "Updated location", body = LocationResponse),
        (status = 404, description = "Location not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LocationResponse>, AppError> {
    let location = queries::toggle_favorite(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Location {} not found", id)))?;

    tracing::info!(
        "Favorite updated: {} -> {}",
        location.name,
        location.is_favorite
    );
    Ok(Json(location.into()))
}

/// Search locations by name via the geocoding service (pass-through).
#[utoipa::path(
    get,
    path = "/api/locations/search",
    tag = "Locations",
    params(SearchQuery),
    responses(
        (status = 200, description = "Geocoding hits", body = Vec<GeoMatch>),
        (status = 400, description = "Empty query", body = crate::errors::ErrorResponse),
        (status = 502, description = "Geocoding service unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn search_locations(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<GeoMatch>>, AppError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest("query is required".to_string()));
    }

    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let hits = state.weather.search_location(query, limit).await?;
    Ok(Json(hits))
}
