use crate::{
    config::OpenWeatherConfig,
    model::{Coordinates, WeatherSnapshot},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt::Debug;

pub mod openweather;

/// Why an upstream lookup produced no usable data.
///
/// Callers currently treat every variant the same way; the distinction is kept for logs.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} responded with status {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{endpoint} returned no {what}")]
    Empty {
        endpoint: &'static str,
        what: &'static str,
    },
}

/// Outbound geocoding and weather lookups.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// First geocoding match for `city`.
    async fn resolve_coordinates(
        &self,
        city: &str,
        api_key: &str,
    ) -> Result<Coordinates, FetchError>;

    /// The `current` block of the one-call response.
    async fn fetch_current_weather(
        &self,
        coord: Coordinates,
        api_key: &str,
    ) -> Result<WeatherSnapshot, FetchError>;

    /// First entry of the time-machine `data` list for `timestamp` (epoch seconds).
    async fn fetch_historical_weather(
        &self,
        coord: Coordinates,
        timestamp: i64,
        api_key: &str,
    ) -> Result<WeatherSnapshot, FetchError>;
}

/// Construct the OpenWeather provider from config.
pub fn provider_from_config(config: &OpenWeatherConfig) -> Box<dyn WeatherProvider> {
    Box::new(OpenWeatherProvider::new(
        config.geo_url.clone(),
        config.onecall_url.clone(),
    ))
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        let head: String = body.chars().take(MAX).collect();
        format!("{head}...")
    } else {
        body.to_string()
    }
}
