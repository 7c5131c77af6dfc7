//! Batch refresh: fetch → normalize → upsert, per location.
//!
//! Each location is self-contained; a failure for one never rolls back or
//! aborts its siblings. Failures are collected and reported next to the
//! successes — partial success is the expected outcome. Only a storage
//! failure aborts the whole batch.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{ForecastRecord, Location};
use crate::db::queries;
use crate::services::normalizer;
use crate::services::openweather::OwmClient;

/// One committed refresh.
pub struct RefreshSuccess {
    pub location: Location,
    pub record: ForecastRecord,
}

/// One failed refresh, with enough context for the caller to report it.
pub struct RefreshFailure {
    pub location_id: Uuid,
    /// Display name when the location was resolved before failing.
    pub location_name: Option<String>,
    pub message: String,
}

impl RefreshFailure {
    /// "Tokyo: forecast request timed out" style label.
    pub fn describe(&self) -> String {
        match &self.location_name {
            Some(name) => format!("{}: {}", name, self.message),
            None => format!("location {}: {}", self.location_id, self.message),
        }
    }
}

/// Outcome of a batch refresh: successes and failures side by side.
pub struct RefreshOutcome {
    pub successes: Vec<RefreshSuccess>,
    pub failures: Vec<RefreshFailure>,
}

/// Refresh the cached tomorrow-forecast for every given location.
///
/// Locations are fetched from the source in parallel; results come back in
/// input order. Source errors become per-location failures, storage errors
/// abort the batch.
pub async fn refresh_locations(
    pool: &PgPool,
    client: &OwmClient,
    location_ids: &[Uuid],
) -> Result<RefreshOutcome, sqlx::Error> {
    let tasks = location_ids
        .iter()
        .map(|&id| refresh_one(pool, client, id));
    let results = futures::future::join_all(tasks).await;

    let mut outcome = RefreshOutcome {
        successes: Vec::new(),
        failures: Vec::new(),
    };

    for result in results {
        match result? {
            Ok(success) => outcome.successes.push(success),
            Err(failure) => {
                tracing::warn!("Refresh failed for {}", failure.describe());
                outcome.failures.push(failure);
            }
        }
    }

    Ok(outcome)
}

/// Refresh a single location. Outer error = storage failure (fatal for the
/// batch); inner error = per-location failure (collected).
async fn refresh_one(
    pool: &PgPool,
    client: &OwmClient,
    location_id: Uuid,
) -> Result<Result<RefreshSuccess, RefreshFailure>, sqlx::Error> {
    let location = match queries::get_location(pool, location_id).await? {
        Some(location) => location,
        None => {
            return Ok(Err(RefreshFailure {
                location_id,
                location_name: None,
                message: "location not found".to_string(),
            }));
        }
    };

    let fetched = match client
        .fetch_forecast(&location.name, &location.country_code)
        .await
    {
        Ok(fetched) => fetched,
        Err(e) => {
            return Ok(Err(RefreshFailure {
                location_id,
                location_name: Some(location.name),
                message: e.to_string(),
            }));
        }
    };

    let body = normalizer::normalize(&fetched.samples, fetched.utc_offset_seconds);
    let record = queries::upsert_forecast(pool, location.id, &body, Utc::now()).await?;

    tracing::info!(
        "Saved forecast for {} ({})",
        location.name,
        body.forecast_date
    );

    Ok(Ok(RefreshSuccess { location, record }))
}
