use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A tracked location. `name` is the unique lookup key; coordinates and the
/// localized name are cosmetic.
#[derive(Debug, Clone, FromRow)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub name_local: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country_code: String,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// One cached "tomorrow" forecast for a location. At most one row exists
/// per (location_id, forecast_date); a refresh replaces it in place.
#[derive(Debug, Clone, FromRow)]
pub struct ForecastRecord {
    pub id: Uuid,
    pub location_id: Uuid,
    /// Local calendar date at the location.
    pub forecast_date: NaiveDate,
    pub weather_main: Option<String>,
    pub weather_description: Option<String>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub humidity: Option<i32>,
    pub pressure: Option<i32>,
    pub wind_speed: Option<f64>,
    pub wind_deg: Option<i32>,
    /// Integer percentage, 0–100.
    pub precipitation_probability: Option<i32>,
    pub icon_code: Option<String>,
    /// When the record was computed; drives retention cleanup and the
    /// "most recent" pick when no date is given.
    pub fetched_at: DateTime<Utc>,
}
