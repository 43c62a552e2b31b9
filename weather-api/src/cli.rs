use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use inquire::{Password, Text};
use weather_api::telemetry;
use weather_core::{ApiResponse, Config, WeatherService};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-api", version, about = "Weather lookup service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Listen address; overrides config and WEATHER_BIND.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Store the OpenWeather API key and archive bucket in the config file.
    Configure,

    /// Look up current weather for a city and print the response envelope.
    Current {
        /// City name, e.g. "melbourne".
        city: String,
    },

    /// Look up historical weather for a city and print the response envelope.
    History {
        /// City name, e.g. "melbourne".
        city: String,

        /// Epoch seconds; if absent, means "now".
        #[arg(long, conflicts_with = "date")]
        dt: Option<String>,

        /// UTC date as YYYY-MM-DD, taken at midnight.
        #[arg(long)]
        date: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Serve { bind } => {
                let config = load_config()?;
                let addr = bind.unwrap_or_else(|| config.server.bind.clone());
                weather_api::serve(WeatherService::from_config(&config), &addr).await
            }
            Command::Current { city } => {
                let service = WeatherService::from_config(&load_config()?);
                print_response(service.current_weather(Some(&city)).await)
            }
            Command::History { city, dt, date } => {
                let dt = match date {
                    Some(date) => Some(date_to_epoch(&date)?.to_string()),
                    None => dt,
                };
                let service = WeatherService::from_config(&load_config()?);
                print_response(service.history_weather(Some(&city), dt.as_deref()).await)
            }
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    telemetry::init("weather-api");
    Config::load()
}

fn configure() -> anyhow::Result<()> {
    let path = Config::config_file_path()?;
    let mut config = Config::load_from(&path)?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let mut bucket = Text::new("Archive bucket name:");
    if let Some(current) = config.bucket_name.as_deref() {
        bucket = bucket.with_default(current);
    }
    let bucket = bucket.prompt().context("Failed to read bucket name")?;

    config.api_key = Some(api_key).filter(|k| !k.is_empty());
    config.bucket_name = Some(bucket).filter(|b| !b.is_empty());
    config.save_to(&path)?;

    println!("Saved configuration to {}", path.display());
    Ok(())
}

fn date_to_epoch(date: &str) -> anyhow::Result<i64> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{date}', expected YYYY-MM-DD"))?;

    Ok(day.and_time(chrono::NaiveTime::MIN).and_utc().timestamp())
}

fn print_response(res: ApiResponse) -> anyhow::Result<()> {
    let pretty = serde_json::to_string_pretty(&res.body).context("Failed to render response")?;
    println!("{pretty}");

    if !res.status.is_success() {
        bail!("lookup failed with status {}", res.status);
    }
    Ok(())
}
