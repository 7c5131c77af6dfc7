// Tenki API v0.1
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod routes;
mod services;

use config::{AppConfig, PRESET_LOCATIONS};
use routes::AppState;
use services::openweather::{OwmClient, OwmConfig};

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Tenki API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tenki API",
        version = "0.1.0",
        description = "Tracks a small set of locations and caches tomorrow's weather \
            for each, normalized from the OpenWeatherMap 5-day/3-hour forecast into \
            one record per location per local date.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Locations", description = "Tracked-location management and search"),
        (name = "Weather", description = "Cached forecast retrieval, refresh, export and cleanup"),
    ),
    paths(
        routes::health::health_check,
        routes::locations::list_locations,
        routes::locations::add_location,
        routes::locations::delete_location,
        routes::locations::toggle_favorite,
        routes::locations::search_locations,
        routes::weather::get_forecasts,
        routes::weather::refresh_weather,
        routes::weather::export_weather,
        routes::weather::cleanup_forecasts,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::locations::LocationResponse,
            routes::locations::AddLocationRequest,
            routes::weather::WeatherResponse,
            routes::weather::LocationForecast,
            routes::weather::ForecastListResponse,
            routes::weather::RefreshRequest,
            routes::weather::RefreshResponse,
            routes::weather::CleanupResponse,
            services::openweather::GeoMatch,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenki_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Seed preset locations (idempotent — existing names are returned as-is)
    for preset in PRESET_LOCATIONS {
        let new = db::queries::NewLocation {
            name: preset.name.to_string(),
            name_local: Some(preset.name_local.to_string()),
            latitude: Some(preset.lat),
            longitude: Some(preset.lon),
            country_code: config.default_country_code.clone(),
        };
        match db::queries::add_location(&pool, new).await {
            Ok(location) => {
                tracing::debug!("Preset location ready: {}", location.name);
            }
            Err(e) => {
                tracing::error!("Failed to seed preset location '{}': {}", preset.name, e);
            }
        }
    }

    // Create OpenWeatherMap client
    let weather = OwmClient::new(OwmConfig {
        api_key: config.api_key.clone(),
        forecast_base_url: config.forecast_base_url.clone(),
        geo_base_url: config.geo_base_url.clone(),
        timeout: Duration::from_secs(config.api_timeout_secs),
    });

    // Build shared application state
    let state = AppState {
        pool,
        weather,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route(
            "/api/locations",
            get(routes::locations::list_locations).post(routes::locations::add_location),
        )
        .route(
            "/api/locations/search",
            get(routes::locations::search_locations),
        )
        .route("/api/locations/:id", delete(routes::locations::delete_location))
        .route(
            "/api/locations/:id/favorite",
            put(routes::locations::toggle_favorite),
        )
        .route("/api/weather/forecast", get(routes::weather::get_forecasts))
        .route("/api/weather/refresh", post(routes::weather::refresh_weather))
        .route("/api/weather/export", get(routes::weather::export_weather))
        .route("/api/weather/cleanup", post(routes::weather::cleanup_forecasts))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
