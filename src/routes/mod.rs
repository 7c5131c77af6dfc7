pub mod health;
pub mod locations;
pub mod weather;

use crate::config::AppConfig;
use crate::services::openweather::OwmClient;

/// Shared application state for all endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) pool: sqlx::PgPool,
    pub(crate) weather: OwmClient,
    pub(crate) config: AppConfig,
}
