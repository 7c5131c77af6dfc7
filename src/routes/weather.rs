//! Weather endpoints.
//!
//! - GET  /api/weather/forecast?location_ids=a,b,c&date=YYYY-MM-DD
//! - POST /api/weather/refresh
//! - GET  /api/weather/export?format=csv|json&location_ids=...&date=...
//! - POST /api/weather/cleanup?days=N

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::Json;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::locations::LocationResponse;
use super::AppState;
use crate::db::{models, queries};
use crate::errors::AppError;
use crate::services::refresh::refresh_locations;

/// A cached tomorrow-forecast record.
#[derive(Debug, Serialize, ToSchema)]
pub struct WeatherResponse {
    /// Unique record identifier
    pub id: Uuid,
    /// Owning location
    pub location_id: Uuid,
    /// Local calendar date the forecast is for (YYYY-MM-DD)
    pub forecast_date: NaiveDate,
    /// Weather category (e.g. "Rain")
    pub weather_main: Option<String>,
    /// Weather description (e.g. "light rain")
    pub weather_description: Option<String>,
    /// Daily maximum temperature in Celsius
    pub temp_max: Option<f64>,
    /// Daily minimum temperature in Celsius
    pub temp_min: Option<f64>,
    /// Relative humidity percentage
    pub humidity: Option<i32>,
    /// Pressure in hPa
    pub pressure: Option<i32>,
    /// Wind speed in m/s
    pub wind_speed: Option<f64>,
    /// Wind direction in degrees
    pub wind_deg: Option<i32>,
    /// Precipitation probability, 0–100
    pub precipitation_probability: Option<i32>,
    /// Weather icon code (e.g. "10d")
    pub icon_code: Option<String>,
    /// When this record was computed (ISO 8601)
    pub fetched_at: String,
}

impl From<models::ForecastRecord> for WeatherResponse {
    fn from(f: models::ForecastRecord) -> Self {
        Self {
            id: f.id,
            location_id: f.location_id,
            forecast_date: f.forecast_date,
            weather_main: f.weather_main,
            weather_description: f.weather_description,
            temp_max: f.temp_max,
            temp_min: f.temp_min,
            humidity: f.humidity,
            pressure: f.pressure,
            wind_speed: f.wind_speed,
            wind_deg: f.wind_deg,
            precipitation_probability: f.precipitation_probability,
            icon_code: f.icon_code,
            fetched_at: f.fetched_at.to_rfc3339(),
        }
    }
}

/// A location together with its cached forecast.
#[derive(Debug, Serialize, ToSchema)]
pub struct LocationForecast {
    pub location: LocationResponse,
    pub weather: WeatherResponse,
}

/// Response for the batch forecast lookup.
#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastListResponse {
    /// One entry per requested location that has a record; the rest are
    /// silently omitted (best effort)
    pub forecasts: Vec<LocationForecast>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ForecastQuery {
    /// Comma-separated location UUIDs, in desired output order
    pub location_ids: String,
    /// Exact local forecast date (YYYY-MM-DD); latest record when omitted
    pub date: Option<NaiveDate>,
}

/// Body for POST /api/weather/refresh.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub location_ids: Vec<Uuid>,
}

/// Response for the batch refresh, reporting partial success explicitly.
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    /// Freshly committed records, one per succeeded location
    pub forecasts: Vec<LocationForecast>,
    /// Per-location failure messages ("Tokyo: forecast request timed out")
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Summary, e.g. "2 locations refreshed, 1 failed"
    pub message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExportQuery {
    /// "csv" (default) or "json"
    pub format: Option<String>,
    /// Comma-separated location UUIDs
    pub location_ids: String,
    /// Exact local forecast date (YYYY-MM-DD); latest record when omitted
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CleanupQuery {
    /// Retention window in days; configured default when omitted
    pub days: Option<i64>,
}

/// Response for the retention cleanup.
#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    /// Number of forecast records deleted
    pub deleted: u64,
    /// Cutoff instant used (ISO 8601); records fetched before it are gone
    pub cutoff: String,
}

/// Parse a comma-separated UUID list, preserving order.
fn parse_location_ids(raw: &str) -> Result<Vec<Uuid>, AppError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Uuid>()
                .map_err(|_| AppError::BadRequest(format!("invalid location id: {}", s)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err(AppError::BadRequest("location_ids is required".to_string()));
    }
    Ok(ids)
}

fn pair_to_response(pair: (models::Location, models::ForecastRecord)) -> LocationForecast {
    LocationForecast {
        location: pair.0.into(),
        weather: pair.1.into(),
    }
}

/// Get cached forecasts for a set of locations.
///
/// Locations with no cached record are omitted from the result; an empty
/// list is a normal outcome, not an error.
#[utoipa::path(
    get,
    path = "/api/weather/forecast",
    tag = "Weather",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Cached forecasts, input order preserved", body = ForecastListResponse),
        (status = 400, description = "Invalid location ids or date", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_forecasts(
    State(state): State<AppState>,
    Query(params): Query<ForecastQuery>,
) -> Result<Json<ForecastListResponse>, AppError> {
    let ids = parse_location_ids(&params.location_ids)?;
    let pairs = queries::get_forecasts_for_locations(&state.pool, &ids, params.date).await?;

    Ok(Json(ForecastListResponse {
        forecasts: pairs.into_iter().map(pair_to_response).collect(),
    }))
}

/// Refresh the cached tomorrow-forecast for the given locations.
///
/// Each location is fetched, normalized and committed independently; the
/// response carries both the successes and the per-location failures. The
/// call itself only fails on storage errors.
#[utoipa::path(
    post,
    path = "/api/weather/refresh",
    tag = "Weather",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Refresh outcome with per-location errors", body = RefreshResponse),
        (status = 400, description = "No location ids given", body = crate::errors::ErrorResponse),
    )
)]
pub async fn refresh_weather(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    if request.location_ids.is_empty() {
        return Err(AppError::BadRequest("location_ids is required".to_string()));
    }

    let outcome = refresh_locations(&state.pool, &state.weather, &request.location_ids).await?;

    let message = format!(
        "{} locations refreshed, {} failed",
        outcome.successes.len(),
        outcome.failures.len()
    );
    tracing::info!("{}", message);

    Ok(Json(RefreshResponse {
        forecasts: outcome
            .successes
            .into_iter()
            .map(|s| pair_to_response((s.location, s.record)))
            .collect(),
        errors: outcome.failures.iter().map(|f| f.describe()).collect(),
        message,
    }))
}

/// Export cached forecasts as CSV (attachment) or JSON.
#[utoipa::path(
    get,
    path = "/api/weather/export",
    tag = "Weather",
    params(ExportQuery),
    responses(
        (status = 200, description = "CSV attachment or JSON body"),
        (status = 400, description = "Unsupported format or invalid ids", body = crate::errors::ErrorResponse),
    )
)]
pub async fn export_weather(
    State(state): State<AppState>,
    Query(params): Query<ExportQuery>,
) -> Result<axum::response::Response, AppError> {
    use axum::response::IntoResponse;

    let ids = parse_location_ids(&params.location_ids)?;
    let pairs = queries::get_forecasts_for_locations(&state.pool, &ids, params.date).await?;

    match params.format.as_deref().unwrap_or("csv") {
        "csv" => {
            let body = build_csv(&pairs)?;
            let filename = format!("weather_forecast_{}.csv", Utc::now().format("%Y%m%d"));

            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            );
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&format!("attachment; filename={}", filename))
                    .map_err(|e| AppError::InternalError(format!("Invalid filename: {}", e)))?,
            );
            Ok((headers, body).into_response())
        }
        "json" => Ok(Json(ForecastListResponse {
            forecasts: pairs.into_iter().map(pair_to_response).collect(),
        })
        .into_response()),
        other => Err(AppError::BadRequest(format!(
            "unsupported export format: {}",
            other
        ))),
    }
}

/// Render forecast pairs as CSV with the legacy Japanese header row.
fn build_csv(pairs: &[(models::Location, models::ForecastRecord)]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            "地域名",
            "ローカル名",
            "日付",
            "天気",
            "天気詳細",
            "最高気温(℃)",
            "最低気温(℃)",
            "湿度(%)",
            "気圧(hPa)",
            "風速(m/s)",
            "風向(度)",
            "降水確率(%)",
        ])
        .map_err(|e| AppError::InternalError(format!("CSV write error: {}", e)))?;

    for (location, forecast) in pairs {
        writer
            .write_record([
                location.name.clone(),
                location.name_local.clone().unwrap_or_default(),
                forecast.forecast_date.to_string(),
                forecast.weather_main.clone().unwrap_or_default(),
                forecast.weather_description.clone().unwrap_or_default(),
                fmt_opt(forecast.temp_max),
                fmt_opt(forecast.temp_min),
                fmt_opt(forecast.humidity),
                fmt_opt(forecast.pressure),
                fmt_opt(forecast.wind_speed),
                fmt_opt(forecast.wind_deg),
                fmt_opt(forecast.precipitation_probability),
            ])
            .map_err(|e| AppError::InternalError(format!("CSV write error: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::InternalError(format!("CSV flush error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::InternalError(format!("CSV encoding: {}", e)))
}

fn fmt_opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// Resolve the purge cutoff for a retention window. `days` comes straight
/// from the query string, so windows that do not fit the time arithmetic
/// are a client error, not a panic.
fn cleanup_cutoff(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, AppError> {
    if days < 0 {
        return Err(AppError::BadRequest(
            "days must not be negative".to_string(),
        ));
    }
    let window = Duration::try_days(days)
        .ok_or_else(|| AppError::BadRequest(format!("days is out of range: {}", days)))?;
    now.checked_sub_signed(window)
        .ok_or_else(|| AppError::BadRequest(format!("days is out of range: {}", days)))
}

/// Delete forecast records older than the retention window.
///
/// Meant to be hit by an external scheduler; calling it with nothing to
/// delete is fine and reports 0.
#[utoipa::path(
    post,
    path = "/api/weather/cleanup",
    tag = "Weather",
    params(CleanupQuery),
    responses(
        (status = 200, description = "Number of records purged", body = CleanupResponse),
        (status = 400, description = "Invalid retention window", body = crate::errors::ErrorResponse),
    )
)]
pub async fn cleanup_forecasts(
    State(state): State<AppState>,
    Query(params): Query<CleanupQuery>,
) -> Result<Json<CleanupResponse>, AppError> {
    let days = params.days.unwrap_or(state.config.retention_days);
    let cutoff = cleanup_cutoff(Utc::now(), days)?;
    let deleted = queries::purge_forecasts_older_than(&state.pool, cutoff).await?;

    tracing::info!("Purged {} forecast records older than {}", deleted, cutoff);
    Ok(Json(CleanupResponse {
        deleted,
        cutoff: cutoff.to_rfc3339(),
    }))
}
