use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{ForecastRecord, Location};
use crate::services::normalizer::TomorrowForecast;

const LOCATION_COLUMNS: &str =
    "id, name, name_local, latitude, longitude, country_code, is_favorite, created_at";

const FORECAST_COLUMNS: &str = "id, location_id, forecast_date, weather_main, \
     weather_description, temp_max, temp_min, humidity, pressure, wind_speed, wind_deg, \
     precipitation_probability, icon_code, fetched_at";

/// Parameters for creating a location.
pub struct NewLocation {
    pub name: String,
    pub name_local: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country_code: String,
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// List all locations, favorites first.
pub async fn list_locations(pool: &PgPool) -> Result<Vec<Location>, sqlx::Error> {
    sqlx::query_as::<_, Location>(&format!(
        "SELECT {} FROM locations ORDER BY is_favorite DESC, created_at",
        LOCATION_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

pub async fn get_location(pool: &PgPool, id: Uuid) -> Result<Option<Location>, sqlx::Error> {
    sqlx::query_as::<_, Location>(&format!(
        "SELECT {} FROM locations WHERE id = $1",
        LOCATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_location_by_name(
    pool: &PgPool,
    name: &str,
) -> Result<Option<Location>, sqlx::Error> {
    sqlx::query_as::<_, Location>(&format!(
        "SELECT {} FROM locations WHERE name = $1",
        LOCATION_COLUMNS
    ))
    .bind(name)
    .fetch_optional(pool)
    .await
}

pub async fn count_locations(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM locations")
        .fetch_one(pool)
        .await
}

/// Add a location, idempotently on name: adding an existing name returns
/// the pre-existing row untouched.
pub async fn add_location(pool: &PgPool, new: NewLocation) -> Result<Location, sqlx::Error> {
    if let Some(existing) = get_location_by_name(pool, &new.name).await? {
        tracing::warn!("Location already exists: {}", new.name);
        return Ok(existing);
    }

    let inserted = sqlx::query_as::<_, Location>(&format!(
        "INSERT INTO locations (id, name, name_local, latitude, longitude, country_code)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (name) DO NOTHING
         RETURNING {}",
        LOCATION_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(&new.name_local)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(&new.country_code)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(location) => Ok(location),
        // Lost a race with a concurrent insert of the same name.
        None => get_location_by_name(pool, &new.name)
            .await?
            .ok_or(sqlx::Error::RowNotFound),
    }
}

/// Delete a location. Its forecast rows go with it (ON DELETE CASCADE).
/// Returns whether a row was removed.
pub async fn delete_location(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM locations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Flip the favorite flag, returning the updated row if it exists.
pub async fn toggle_favorite(pool: &PgPool, id: Uuid) -> Result<Option<Location>, sqlx::Error> {
    sqlx::query_as::<_, Location>(&format!(
        "UPDATE locations SET is_favorite = NOT is_favorite WHERE id = $1 RETURNING {}",
        LOCATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

// ---------------------------------------------------------------------------
// Forecasts
// ---------------------------------------------------------------------------

/// Replace-or-insert the forecast for (location, body.forecast_date) in one
/// statement. The UNIQUE constraint plus ON CONFLICT makes this atomic:
/// concurrent upserts for the same key serialize (last commit wins) and
/// there is never a moment with zero or two rows for the key.
pub async fn upsert_forecast(
    pool: &PgPool,
    location_id: Uuid,
    body: &TomorrowForecast,
    fetched_at: DateTime<Utc>,
) -> Result<ForecastRecord, sqlx::Error> {
    sqlx::query_as::<_, ForecastRecord>(&format!(
        "INSERT INTO weather_forecasts (
            id, location_id, forecast_date, weather_main, weather_description,
            temp_max, temp_min, humidity, pressure, wind_speed, wind_deg,
            precipitation_probability, icon_code, fetched_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (location_id, forecast_date) DO UPDATE SET
            weather_main = EXCLUDED.weather_main,
            weather_description = EXCLUDED.weather_description,
            temp_max = EXCLUDED.temp_max,
            temp_min = EXCLUDED.temp_min,
            humidity = EXCLUDED.humidity,
            pressure = EXCLUDED.pressure,
            wind_speed = EXCLUDED.wind_speed,
            wind_deg = EXCLUDED.wind_deg,
            precipitation_probability = EXCLUDED.precipitation_probability,
            icon_code = EXCLUDED.icon_code,
            fetched_at = EXCLUDED.fetched_at
        RETURNING {}",
        FORECAST_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(location_id)
    .bind(body.forecast_date)
    .bind(&body.weather_main)
    .bind(&body.weather_description)
    .bind(body.temp_max)
    .bind(body.temp_min)
    .bind(body.humidity)
    .bind(body.pressure)
    .bind(body.wind_speed)
    .bind(body.wind_deg)
    .bind(body.precipitation_probability)
    .bind(&body.icon_code)
    .bind(fetched_at)
    .fetch_one(pool)
    .await
}

/// Fetch the record for an exact (location, date) key, or, with no date,
/// the most recently fetched record for the location. Absence is a normal
/// outcome, not an error.
pub async fn get_latest_forecast(
    pool: &PgPool,
    location_id: Uuid,
    date: Option<NaiveDate>,
) -> Result<Option<ForecastRecord>, sqlx::Error> {
    sqlx::query_as::<_, ForecastRecord>(&format!(
        "SELECT {}
         FROM weather_forecasts
         WHERE location_id = $1
           AND ($2::date IS NULL OR forecast_date = $2)
         ORDER BY fetched_at DESC
         LIMIT 1",
        FORECAST_COLUMNS
    ))
    .bind(location_id)
    .bind(date)
    .fetch_optional(pool)
    .await
}

/// Batch lookup across locations, preserving the order of `location_ids`.
/// Locations with no matching record are silently omitted — best effort by
/// contract, never a partial-failure error.
pub async fn get_forecasts_for_locations(
    pool: &PgPool,
    location_ids: &[Uuid],
    date: Option<NaiveDate>,
) -> Result<Vec<(Location, ForecastRecord)>, sqlx::Error> {
    let mut results = Vec::with_capacity(location_ids.len());

    for &location_id in location_ids {
        let location = get_location(pool, location_id).await?;
        let forecast = get_latest_forecast(pool, location_id, date).await?;

        if let (Some(location), Some(forecast)) = (location, forecast) {
            results.push((location, forecast));
        }
    }

    Ok(results)
}

/// Delete every forecast fetched strictly before `cutoff`. Returns the
/// number of rows removed; running it again right away deletes 0.
pub async fn purge_forecasts_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM weather_forecasts WHERE fetched_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
