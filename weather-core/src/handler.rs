//! Request pipeline shared by the current and historical weather endpoints.
//!
//! Each lookup runs validate → geocode → fetch → archive → respond, strictly in order.
//! Every failure is turned into an [`ApiResponse`] here; nothing escapes to the caller
//! as an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use crate::{
    archive::{ArchiveError, ArchiveWriter, archive_from_config},
    config::{ArchivePolicy, Config},
    model::{ArchiveKey, Envelope, WeatherSnapshot},
    provider::{FetchError, WeatherProvider, provider_from_config},
};

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Runtime settings the handlers read on every request.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub api_key: Option<String>,
    pub bucket: Option<String>,
    pub archive_policy: ArchivePolicy,
    pub allow_origin: String,
}

impl HandlerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.api_key().map(str::to_owned),
            bucket: config.bucket_name.clone(),
            archive_policy: config.archive.policy,
            allow_origin: config.server.allow_origin.clone(),
        }
    }
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Transport-neutral response: status, headers and the JSON envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub body: Envelope,
}

impl ApiResponse {
    pub fn body_json(&self) -> String {
        self.body
            .to_json()
            .unwrap_or_else(|_| r#"{"error":"Internal Server Error"}"#.to_string())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("City parameter is required")]
    MissingCity,

    #[error("Missing weather api key in environment")]
    MissingApiKey,

    #[error("invoke coordinate api error.")]
    Coordinates(#[source] FetchError),

    #[error("invoke current weather api error.")]
    CurrentWeather(#[source] FetchError),

    #[error("invoke history weather api error.")]
    HistoryWeather(#[source] FetchError),

    #[error("Internal Server Error")]
    Archive(#[source] ArchiveError),

    #[error("Internal Server Error")]
    Encode(#[source] serde_json::Error),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::MissingCity | HandlerError::MissingApiKey => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeatherService {
    provider: Arc<dyn WeatherProvider>,
    archive: Arc<dyn ArchiveWriter>,
    settings: HandlerSettings,
}

impl WeatherService {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        archive: Arc<dyn ArchiveWriter>,
        settings: HandlerSettings,
    ) -> Self {
        Self { provider, archive, settings }
    }

    /// Wire up the OpenWeather provider and the configured archive backend.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::from(provider_from_config(&config.openweather)),
            Arc::from(archive_from_config(&config.archive.backend)),
            HandlerSettings::from_config(config),
        )
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    /// `GET /weather/{city}`
    pub async fn current_weather(&self, city: Option<&str>) -> ApiResponse {
        tracing::info!(city, "current weather request");
        let result = self.try_current_weather(city).await;
        self.respond(result)
    }

    /// `GET /weather/history/{city}?dt=<epoch seconds>`
    pub async fn history_weather(&self, city: Option<&str>, dt: Option<&str>) -> ApiResponse {
        tracing::info!(city, dt, "history weather request");
        let result = self.try_history_weather(city, dt).await;
        self.respond(result)
    }

    async fn try_current_weather(&self, city: Option<&str>) -> Result<Envelope, HandlerError> {
        let city = require_city(city)?;
        let api_key = self.require_api_key()?;

        let coord = self
            .provider
            .resolve_coordinates(city, api_key)
            .await
            .map_err(HandlerError::Coordinates)?;

        let weather = self
            .provider
            .fetch_current_weather(coord, api_key)
            .await
            .map_err(HandlerError::CurrentWeather)?;

        self.archive_and_wrap(ArchiveKey::current(city, Utc::now()), weather).await
    }

    async fn try_history_weather(
        &self,
        city: Option<&str>,
        dt: Option<&str>,
    ) -> Result<Envelope, HandlerError> {
        let city = require_city(city)?;
        let api_key = self.require_api_key()?;
        let timestamp = resolve_timestamp(dt, Utc::now());

        let coord = self
            .provider
            .resolve_coordinates(city, api_key)
            .await
            .map_err(HandlerError::Coordinates)?;

        let weather = self
            .provider
            .fetch_historical_weather(coord, timestamp, api_key)
            .await
            .map_err(HandlerError::HistoryWeather)?;

        self.archive_and_wrap(ArchiveKey::history(city, Utc::now()), weather).await
    }

    fn require_api_key(&self) -> Result<&str, HandlerError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(HandlerError::MissingApiKey)
    }

    async fn archive_and_wrap(
        &self,
        key: ArchiveKey,
        weather: WeatherSnapshot,
    ) -> Result<Envelope, HandlerError> {
        let envelope = Envelope::Data(weather);
        let body = envelope.to_json().map_err(HandlerError::Encode)?;
        let bucket = self.settings.bucket.as_deref().unwrap_or_default();

        match self
            .archive
            .put(bucket, key.as_str(), body.into_bytes(), CONTENT_TYPE_JSON)
            .await
        {
            Ok(()) => {
                tracing::info!(bucket, key = %key, "response archived");
                Ok(envelope)
            }
            Err(err) if self.settings.archive_policy == ArchivePolicy::BestEffort => {
                tracing::warn!(bucket, key = %key, error = %err, "archive write failed; returning data anyway");
                Ok(envelope)
            }
            Err(err) => Err(HandlerError::Archive(err)),
        }
    }

    /// A 400 envelope for requests rejected before reaching a handler, e.g. undecodable paths.
    pub fn bad_request(&self, message: impl Into<String>) -> ApiResponse {
        let message = message.into();
        tracing::info!(error = %message, "request rejected");
        ApiResponse {
            status: StatusCode::BAD_REQUEST,
            headers: self.response_headers(),
            body: Envelope::error(message),
        }
    }

    fn respond(&self, result: Result<Envelope, HandlerError>) -> ApiResponse {
        let (status, body) = match result {
            Ok(envelope) => (StatusCode::OK, envelope),
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    match std::error::Error::source(&err) {
                        Some(cause) => tracing::error!(error = %err, cause = %cause, "request failed"),
                        None => tracing::error!(error = %err, "request failed"),
                    }
                } else {
                    tracing::info!(error = %err, "request rejected");
                }
                (status, Envelope::error(err.to_string()))
            }
        };

        ApiResponse {
            status,
            headers: self.response_headers(),
            body,
        }
    }

    fn response_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("content-type", CONTENT_TYPE_JSON.to_string()),
            ("access-control-allow-origin", self.settings.allow_origin.clone()),
            ("access-control-allow-headers", "Content-Type".to_string()),
            ("access-control-allow-methods", "GET".to_string()),
        ]
    }
}

fn require_city(city: Option<&str>) -> Result<&str, HandlerError> {
    city.filter(|c| !c.is_empty()).ok_or(HandlerError::MissingCity)
}

/// Parse the `dt` query value as epoch seconds, falling back to `now`.
///
/// Reads the longest leading decimal number, so `"1643803200abc"` is `1643803200`.
/// Fractional values are truncated; absent, empty or non-numeric input means "now".
pub fn resolve_timestamp(dt: Option<&str>, now: DateTime<Utc>) -> i64 {
    dt.and_then(numeric_prefix)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
        .unwrap_or_else(|| now.timestamp())
}

/// `[+-]digits[.digits][(e|E)[+-]digits]` at the start of `s`, after leading whitespace.
fn numeric_prefix(s: &str) -> Option<&str> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    Some(&s[..end])
}
