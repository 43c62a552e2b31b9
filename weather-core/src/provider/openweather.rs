use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::model::{Coordinates, WeatherSnapshot};

use super::{FetchError, WeatherProvider, truncate_body};

const GEOCODING: &str = "geocoding";
const ONE_CALL: &str = "one-call";
const TIME_MACHINE: &str = "time-machine";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    geo_url: String,
    onecall_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(geo_url: String, onecall_url: String) -> Self {
        Self {
            geo_url,
            onecall_url,
            http: Client::new(),
        }
    }

    fn timemachine_url(&self) -> String {
        format!("{}/timemachine", self.onecall_url.trim_end_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Transport { endpoint, source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Transport { endpoint, source })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint,
                status,
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|source| FetchError::Decode { endpoint, source })
    }

    async fn coordinates(&self, city: &str, api_key: &str) -> Result<Coordinates, FetchError> {
        let matches: Vec<GeoMatch> = self
            .get_json(
                GEOCODING,
                &self.geo_url,
                &[
                    ("q", city.to_string()),
                    ("limit", "1".to_string()),
                    ("appid", api_key.to_string()),
                ],
            )
            .await?;

        matches
            .into_iter()
            .next()
            .map(|m| Coordinates { lat: m.lat, lon: m.lon })
            .ok_or(FetchError::Empty { endpoint: GEOCODING, what: "matches" })
    }

    async fn current(&self, coord: Coordinates, api_key: &str) -> Result<WeatherSnapshot, FetchError> {
        let parsed: OneCallResponse = self
            .get_json(
                ONE_CALL,
                &self.onecall_url,
                &[
                    ("lat", coord.lat.to_string()),
                    ("lon", coord.lon.to_string()),
                    ("appid", api_key.to_string()),
                ],
            )
            .await?;

        parsed
            .current
            .filter(|v| !v.is_null())
            .map(WeatherSnapshot::from)
            .ok_or(FetchError::Empty { endpoint: ONE_CALL, what: "current block" })
    }

    async fn historical(
        &self,
        coord: Coordinates,
        timestamp: i64,
        api_key: &str,
    ) -> Result<WeatherSnapshot, FetchError> {
        let parsed: TimeMachineResponse = self
            .get_json(
                TIME_MACHINE,
                &self.timemachine_url(),
                &[
                    ("lat", coord.lat.to_string()),
                    ("lon", coord.lon.to_string()),
                    ("dt", timestamp.to_string()),
                    ("appid", api_key.to_string()),
                ],
            )
            .await?;

        parsed
            .data
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(WeatherSnapshot::from)
            .ok_or(FetchError::Empty { endpoint: TIME_MACHINE, what: "data entries" })
    }
}

#[derive(Debug, Deserialize)]
struct GeoMatch {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    current: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TimeMachineResponse {
    #[serde(default)]
    data: Option<Vec<Value>>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn resolve_coordinates(
        &self,
        city: &str,
        api_key: &str,
    ) -> Result<Coordinates, FetchError> {
        self.coordinates(city, api_key)
            .await
            .inspect_err(|err| tracing::error!(city, error = %err, "Error fetching coordinates"))
    }

    async fn fetch_current_weather(
        &self,
        coord: Coordinates,
        api_key: &str,
    ) -> Result<WeatherSnapshot, FetchError> {
        self.current(coord, api_key).await.inspect_err(|err| {
            tracing::error!(lat = coord.lat, lon = coord.lon, error = %err, "Error fetching current weather")
        })
    }

    async fn fetch_historical_weather(
        &self,
        coord: Coordinates,
        timestamp: i64,
        api_key: &str,
    ) -> Result<WeatherSnapshot, FetchError> {
        self.historical(coord, timestamp, api_key).await.inspect_err(|err| {
            tracing::error!(
                lat = coord.lat,
                lon = coord.lon,
                dt = timestamp,
                error = %err,
                "Error fetching history weather"
            )
        })
    }
}
