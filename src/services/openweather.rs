//! OpenWeatherMap client.
//!
//! Fetches the 5-day/3-hour forecast feed and the geocoding (direct search)
//! endpoint. See: https://openweathermap.org/forecast5
//!
//! Failures at this boundary are classified into the retryable/permanent
//! taxonomy in [`SourceError`]; everything downstream decides per kind.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::normalizer::RawSample;

/// Number of 3-hour samples to request. 40 slots = 5 days, which always
/// spans at least two full local days, so tomorrow's window is covered
/// regardless of the location's UTC offset.
const FORECAST_SAMPLE_COUNT: u32 = 40;

/// Connection settings for OpenWeatherMap, passed in explicitly — no
/// ambient/global configuration.
#[derive(Debug, Clone)]
pub struct OwmConfig {
    pub api_key: String,
    /// Base URL of the data API (e.g. "https://api.openweathermap.org/data/2.5").
    pub forecast_base_url: String,
    /// Base URL of the geocoding API (e.g. "http://api.openweathermap.org/geo/1.0").
    pub geo_base_url: String,
    pub timeout: Duration,
}

/// Errors at the forecast-source boundary.
///
/// All kinds are retryable from the orchestrator's point of view except
/// `NotFound`, which stays permanent until the location's name or country
/// changes.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("forecast request timed out")]
    Timeout,

    #[error("forecast source rejected the API key")]
    Unauthorized,

    #[error("location not known to the forecast source: {0}")]
    NotFound(String),

    #[error("forecast source rate limit reached")]
    RateLimited,

    #[error("forecast source request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected forecast source response: {0}")]
    Protocol(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SourceError::NotFound(_))
    }
}

/// Raw samples for one location, plus its fixed UTC offset.
#[derive(Debug, Clone)]
pub struct ForecastSamples {
    pub samples: Vec<RawSample>,
    pub utc_offset_seconds: i32,
}

/// A geocoding search hit, passed through to the caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GeoMatch {
    pub name: String,
    /// Localized names keyed by language code, when the source has them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_names: Option<std::collections::HashMap<String, String>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub country: String,
    pub state: String,
}

// --- OpenWeatherMap JSON response types ---

#[derive(Debug, Deserialize)]
struct OwmForecastResponse {
    #[serde(default)]
    list: Vec<OwmSlot>,
    city: Option<OwmCity>,
}

#[derive(Debug, Deserialize)]
struct OwmCity {
    /// UTC offset in seconds.
    timezone: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OwmSlot {
    /// Unix timestamp (UTC).
    dt: i64,
    main: Option<OwmMain>,
    #[serde(default)]
    weather: Vec<OwmWeather>,
    wind: Option<OwmWind>,
    pop: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    humidity: Option<i32>,
    pressure: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    main: Option<String>,
    description: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: Option<f64>,
    deg: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OwmGeoHit {
    name: Option<String>,
    local_names: Option<std::collections::HashMap<String, String>>,
    lat: Option<f64>,
    lon: Option<f64>,
    country: Option<String>,
    state: Option<String>,
}

/// Client for the OpenWeatherMap forecast and geocoding APIs.
#[derive(Debug, Clone)]
pub struct OwmClient {
    client: reqwest::Client,
    config: OwmConfig,
}

impl OwmClient {
    pub fn new(config: OwmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self { client, config }
    }

    /// Fetch the raw 3-hour sample sequence for a location, keyed by its
    /// display name and country code.
    pub async fn fetch_forecast(
        &self,
        location_name: &str,
        country_code: &str,
    ) -> Result<ForecastSamples, SourceError> {
        let url = format!("{}/forecast", self.config.forecast_base_url);

        tracing::info!("Fetching forecast for {}", location_name);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", format!("{},{}", location_name, country_code)),
                ("appid", self.config.api_key.clone()),
                ("units", "metric".to_string()),
                ("lang", "ja".to_string()),
                ("cnt", FORECAST_SAMPLE_COUNT.to_string()),
            ])
            .send()
            .await
            .map_err(|e| classify_request_error(e))?;

        let response = check_status(response, location_name)?;

        let body: OwmForecastResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Protocol(format!("forecast JSON parse error: {}", e)))?;

        Ok(convert_forecast(body))
    }

    /// Search locations by free-text name via the geocoding endpoint.
    pub async fn search_location(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeoMatch>, SourceError> {
        let url = format!("{}/direct", self.config.geo_base_url);

        tracing::info!("Searching locations for '{}'", query);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query.to_string()),
                ("limit", limit.to_string()),
                ("appid", self.config.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| classify_request_error(e))?;

        let response = check_status(response, query)?;

        let hits: Vec<OwmGeoHit> = response
            .json()
            .await
            .map_err(|e| SourceError::Protocol(format!("geocoding JSON parse error: {}", e)))?;

        Ok(hits
            .into_iter()
            .map(|h| GeoMatch {
                name: h.name.unwrap_or_default(),
                local_names: h.local_names,
                lat: h.lat,
                lon: h.lon,
                country: h.country.unwrap_or_default(),
                state: h.state.unwrap_or_default(),
            })
            .collect())
    }
}

/// Map a reqwest send error to the boundary taxonomy.
fn classify_request_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Transport(e)
    }
}

/// Map an HTTP status to the boundary taxonomy, passing 2xx through.
fn check_status(
    response: reqwest::Response,
    subject: &str,
) -> Result<reqwest::Response, SourceError> {
    match response.status() {
        s if s.is_success() => Ok(response),
        reqwest::StatusCode::UNAUTHORIZED => Err(SourceError::Unauthorized),
        reqwest::StatusCode::NOT_FOUND => Err(SourceError::NotFound(subject.to_string())),
        reqwest::StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited),
        s => Err(SourceError::Protocol(format!(
            "forecast source returned HTTP {}",
            s
        ))),
    }
}

/// Convert the wire response into the normalizer's input shape, defaulting
/// absent non-temperature fields at this boundary.
fn convert_forecast(body: OwmForecastResponse) -> ForecastSamples {
    let utc_offset_seconds = body.city.and_then(|c| c.timezone).unwrap_or(0);

    let samples = body
        .list
        .into_iter()
        .filter_map(|slot| {
            let timestamp: DateTime<Utc> = match DateTime::from_timestamp(slot.dt, 0) {
                Some(ts) => ts,
                None => {
                    tracing::warn!("Skipping sample with out-of-range timestamp {}", slot.dt);
                    return None;
                }
            };

            let main = slot.main;
            let weather = slot.weather.into_iter().next();
            let wind = slot.wind;

            Some(RawSample {
                timestamp,
                temperature: main.as_ref().and_then(|m| m.temp),
                temperature_max: main.as_ref().and_then(|m| m.temp_max),
                temperature_min: main.as_ref().and_then(|m| m.temp_min),
                humidity: main.as_ref().and_then(|m| m.humidity).unwrap_or(0),
                pressure: main.as_ref().and_then(|m| m.pressure).unwrap_or(0),
                wind_speed: wind.as_ref().and_then(|w| w.speed).unwrap_or(0.0),
                wind_deg: wind.as_ref().and_then(|w| w.deg).unwrap_or(0),
                pop: slot.pop.unwrap_or(0.0),
                weather_main: weather
                    .as_ref()
                    .and_then(|w| w.main.clone())
                    .unwrap_or_default(),
                weather_description: weather
                    .as_ref()
                    .and_then(|w| w.description.clone())
                    .unwrap_or_default(),
                icon_code: weather.and_then(|w| w.icon).unwrap_or_default(),
            })
        })
        .collect();

    ForecastSamples {
        samples,
        utc_offset_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: serde_json::Value) -> ForecastSamples {
        convert_forecast(serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_convert_full_slot() {
        let result = parse(serde_json::json!({
            "list": [
                {
                    "dt": 1704967200,
                    "main": {
                        "temp": 5.3, "temp_min": 4.1, "temp_max": 6.0,
                        "humidity": 72, "pressure": 1018
                    },
                    "weather": [
                        { "main": "Rain", "description": "light rain", "icon": "10d" }
                    ],
                    "wind": { "speed": 4.2, "deg": 210 },
                    "pop": 0.35
                }
            ],
            "city": { "timezone": 32400 }
        }));

        assert_eq!(result.utc_offset_seconds, 32400);
        assert_eq!(result.samples.len(), 1);
        let s = &result.samples[0];
        assert_eq!(s.temperature, Some(5.3));
        assert_eq!(s.temperature_max, Some(6.0));
        assert_eq!(s.temperature_min, Some(4.1));
        assert_eq!(s.humidity, 72);
        assert_eq!(s.pressure, 1018);
        assert_eq!(s.wind_speed, 4.2);
        assert_eq!(s.wind_deg, 210);
        assert_eq!(s.pop, 0.35);
        assert_eq!(s.weather_main, "Rain");
        assert_eq!(s.weather_description, "light rain");
        assert_eq!(s.icon_code, "10d");
    }

    #[test]
    fn test_convert_sparse_slot_defaults() {
        let result = parse(serde_json::json!({
            "list": [ { "dt": 1704967200 } ],
            "city": {}
        }));

        assert_eq!(result.utc_offset_seconds, 0);
        let s = &result.samples[0];
        assert_eq!(s.temperature, None);
        assert_eq!(s.temperature_max, None);
        assert_eq!(s.temperature_min, None);
        assert_eq!(s.humidity, 0);
        assert_eq!(s.pressure, 0);
        assert_eq!(s.wind_speed, 0.0);
        assert_eq!(s.pop, 0.0);
        assert_eq!(s.weather_main, "");
        assert_eq!(s.icon_code, "");
    }

    #[test]
    fn test_convert_missing_city_and_list() {
        let result = parse(serde_json::json!({}));
        assert_eq!(result.utc_offset_seconds, 0);
        assert!(result.samples.is_empty());
    }

    #[test]
    fn test_not_found_is_permanent_rest_retryable() {
        assert!(!SourceError::NotFound("Atlantis".to_string()).is_retryable());
        assert!(SourceError::Timeout.is_retryable());
        assert!(SourceError::Unauthorized.is_retryable());
        assert!(SourceError::RateLimited.is_retryable());
        assert!(SourceError::Protocol("boom".to_string()).is_retryable());
    }

    // --- wire-level tests against a mock server ---

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer, timeout: Duration) -> OwmClient {
        OwmClient::new(OwmConfig {
            api_key: "test-key".to_string(),
            forecast_base_url: server.uri(),
            geo_base_url: server.uri(),
            timeout,
        })
    }

    #[tokio::test]
    async fn test_fetch_forecast_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .and(query_param("q", "Tokyo,JP"))
            .and(query_param("appid", "test-key"))
            .and(query_param("cnt", "40"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "list": [
                    {
                        "dt": 1704967200,
                        "main": { "temp": 5.3, "temp_min": 4.1, "temp_max": 6.0,
                                  "humidity": 72, "pressure": 1018 },
                        "weather": [ { "main": "Clouds", "description": "overcast",
                                       "icon": "04d" } ],
                        "wind": { "speed": 2.0, "deg": 90 },
                        "pop": 0.1
                    }
                ],
                "city": { "timezone": 32400 }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_secs(5));
        let result = client.fetch_forecast("Tokyo", "JP").await.unwrap();

        assert_eq!(result.utc_offset_seconds, 32400);
        assert_eq!(result.samples.len(), 1);
        assert_eq!(result.samples[0].weather_main, "Clouds");
    }

    #[tokio::test]
    async fn test_fetch_forecast_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_secs(5));
        let err = client.fetch_forecast("Tokyo", "JP").await.unwrap_err();
        assert!(matches!(err, SourceError::Unauthorized));
    }

    #[tokio::test]
    async fn test_fetch_forecast_location_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_secs(5));
        let err = client.fetch_forecast("Atlantis", "JP").await.unwrap_err();
        match err {
            SourceError::NotFound(name) => assert_eq!(name, "Atlantis"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_forecast_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_secs(5));
        let err = client.fetch_forecast("Tokyo", "JP").await.unwrap_err();
        assert!(matches!(err, SourceError::RateLimited));
    }

    #[tokio::test]
    async fn test_fetch_forecast_server_error_is_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_secs(5));
        let err = client.fetch_forecast("Tokyo", "JP").await.unwrap_err();
        assert!(matches!(err, SourceError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_fetch_forecast_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "list": [], "city": {} }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_millis(100));
        let err = client.fetch_forecast("Tokyo", "JP").await.unwrap_err();
        assert!(matches!(err, SourceError::Timeout));
    }

    #[tokio::test]
    async fn test_search_location_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/direct"))
            .and(query_param("q", "Kyoto"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "name": "Kyoto",
                    "local_names": { "ja": "京都" },
                    "lat": 35.0116,
                    "lon": 135.7681,
                    "country": "JP",
                    "state": "Kyoto Prefecture"
                }
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_secs(5));
        let hits = client.search_location("Kyoto", 5).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Kyoto");
        assert_eq!(hits[0].country, "JP");
        assert_eq!(
            hits[0].local_names.as_ref().unwrap().get("ja").unwrap(),
            "京都"
        );
    }
}
