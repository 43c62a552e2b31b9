use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A latitude/longitude pair resolved from a city name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Provider-defined weather record, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeatherSnapshot(Value);

impl WeatherSnapshot {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for WeatherSnapshot {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Body of every response and of every archived object.
///
/// Serializes as `{"data": ...}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope {
    Data(WeatherSnapshot),
    Error(String),
}

impl Envelope {
    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error(message.into())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Object key under which a successful envelope is archived.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey(String);

impl ArchiveKey {
    /// `responses/<city>-<epoch-ms>.json`
    pub fn current(city: &str, at: DateTime<Utc>) -> Self {
        Self(format!("responses/{city}-{}.json", unique_epoch_millis(at)))
    }

    /// `responses/history-<city>-<epoch-ms>.json`
    pub fn history(city: &str, at: DateTime<Utc>) -> Self {
        Self(format!("responses/history-{city}-{}.json", unique_epoch_millis(at)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

static LAST_KEY_MILLIS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Millisecond stamp that never repeats within the process.
fn unique_epoch_millis(at: DateTime<Utc>) -> i64 {
    let wanted = at.timestamp_millis();
    let mut last = LAST_KEY_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = if wanted > last { wanted } else { last + 1 };
        match LAST_KEY_MILLIS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(observed) => last = observed,
        }
    }
}
