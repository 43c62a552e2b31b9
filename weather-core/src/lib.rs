//! Core library for the weather lookup service.
//!
//! This crate defines:
//! - Configuration (config file plus environment overlay)
//! - The OpenWeather geocoding/weather client behind the `WeatherProvider` trait
//! - Response archiving behind the `ArchiveWriter` trait
//! - The request pipeline shared by the current and historical endpoints
//!
//! It is used by `weather-api`, which only adapts `ApiResponse` values to HTTP.

pub mod archive;
pub mod config;
pub mod handler;
pub mod model;
pub mod provider;

pub use archive::{ArchiveError, ArchiveWriter, FsArchive, HttpArchive};
pub use config::{ArchiveBackend, ArchivePolicy, Config};
pub use handler::{ApiResponse, HandlerSettings, WeatherService};
pub use model::{ArchiveKey, Coordinates, Envelope, WeatherSnapshot};
pub use provider::{FetchError, WeatherProvider};
