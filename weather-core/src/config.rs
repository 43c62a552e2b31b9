use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

pub const DEFAULT_GEO_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";
pub const DEFAULT_ONECALL_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";

/// Top-level configuration, read from disk and overlaid with environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// OpenWeather API key. Its absence is reported per request, not at load time.
    pub api_key: Option<String>,

    /// Target bucket for archived responses.
    pub bucket_name: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    /// Example TOML:
    /// [archive]
    /// policy = "best_effort"
    /// backend = { kind = "http", endpoint = "http://localhost:9000" }
    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub openweather: OpenWeatherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Value of `Access-Control-Allow-Origin` on every response.
    pub allow_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            allow_origin: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ArchiveConfig {
    pub policy: ArchivePolicy,
    pub backend: ArchiveBackend,
}

/// What a failed archive write does to an otherwise successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchivePolicy {
    /// The write is part of the request; failure yields a 500.
    #[default]
    Required,
    /// Failure is logged and the weather data is still returned.
    BestEffort,
}

impl TryFrom<&str> for ArchivePolicy {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().replace('-', "_").as_str() {
            "required" => Ok(ArchivePolicy::Required),
            "best_effort" => Ok(ArchivePolicy::BestEffort),
            _ => Err(anyhow!(
                "Unknown archive policy '{value}'. Supported policies: required, best_effort."
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArchiveBackend {
    /// Objects land at `<root>/<bucket>/<key>`.
    Fs { root: PathBuf },
    /// Objects are sent as `PUT <endpoint>/<bucket>/<key>`.
    Http {
        endpoint: String,
        #[serde(default)]
        token: Option<String>,
    },
}

impl Default for ArchiveBackend {
    fn default() -> Self {
        ArchiveBackend::Fs { root: PathBuf::from("archive") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenWeatherConfig {
    pub geo_url: String,
    pub onecall_url: String,
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            geo_url: DEFAULT_GEO_URL.to_string(),
            onecall_url: DEFAULT_ONECALL_URL.to_string(),
        }
    }
}

impl Config {
    /// Load config from disk (or defaults if absent), then apply the process environment.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;
        cfg.apply_env(|name| std::env::var(name).ok())?;
        Ok(cfg)
    }

    /// Load config from an explicit path, or return an empty default if it doesn't exist yet.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Overlay `API_KEY`, `BUCKET_NAME`, `WEATHER_BIND` and `ARCHIVE_POLICY`.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(key) = get("API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(bucket) = get("BUCKET_NAME") {
            self.bucket_name = Some(bucket);
        }
        if let Some(bind) = get("WEATHER_BIND") {
            self.server.bind = bind;
        }
        if let Some(policy) = get("ARCHIVE_POLICY") {
            self.archive.policy = ArchivePolicy::try_from(policy.as_str())?;
        }

        Ok(())
    }

    /// Write config as TOML to `path`, creating parent directories as needed.
    ///
    /// Values that came from the environment are written too; callers wanting a
    /// file-only config should start from [`Config::load_from`].
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to save config file: {}", path.display()))
    }

    /// Path to the config file; `WEATHER_CONFIG` takes precedence over the platform directory.
    pub fn config_file_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os("WEATHER_CONFIG").filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }

        let dirs = ProjectDirs::from("dev", "weather-task", "weather-api")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// API key, if one is configured and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}
