//! HTTP surface for the weather lookup service.
//!
//! Routes:
//! - `GET /weather/{city}`: current weather
//! - `GET /weather/history/{city}?dt=<epoch seconds>`: historical weather
//! - `GET /weather`, `GET /weather/history`: no city given (always a 400)
//!
//! Every response, including rejected paths, carries a JSON envelope.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    body::Body,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use weather_core::{ApiResponse, WeatherService};

pub mod telemetry;

type AppState = Arc<WeatherService>;

/// Query string as ordered pairs, so repeated keys are kept rather than rejected.
type QueryPairs = Query<Vec<(String, String)>>;

pub fn build_app(service: AppState) -> Router {
    Router::new()
        .route("/weather", get(current_without_city))
        .route("/weather/", get(current_without_city))
        .route("/weather/history", get(history_without_city))
        .route("/weather/history/", get(history_without_city))
        .route("/weather/:city", get(current))
        .route("/weather/history/:city", get(history))
        .with_state(service)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(service: WeatherService, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
    let local = listener.local_addr().context("Failed to read bound address")?;

    tracing::info!(%local, "HTTP server listening");
    axum::serve(listener, build_app(Arc::new(service)))
        .await
        .context("HTTP server error")
}

async fn current(
    State(service): State<AppState>,
    city: Result<Path<String>, PathRejection>,
) -> Response {
    let res = match city {
        Ok(Path(city)) => service.current_weather(Some(&city)).await,
        Err(rejection) => service.bad_request(rejection.body_text()),
    };
    into_http(res)
}

async fn current_without_city(State(service): State<AppState>) -> Response {
    into_http(service.current_weather(None).await)
}

async fn history(
    State(service): State<AppState>,
    city: Result<Path<String>, PathRejection>,
    query: Result<QueryPairs, QueryRejection>,
) -> Response {
    let res = match city {
        Ok(Path(city)) => {
            let dt = last_dt(query);
            service.history_weather(Some(&city), dt.as_deref()).await
        }
        Err(rejection) => service.bad_request(rejection.body_text()),
    };
    into_http(res)
}

async fn history_without_city(
    State(service): State<AppState>,
    query: Result<QueryPairs, QueryRejection>,
) -> Response {
    let dt = last_dt(query);
    into_http(service.history_weather(None, dt.as_deref()).await)
}

/// Last `dt` value wins; an unparseable query string counts as no `dt`.
fn last_dt(query: Result<QueryPairs, QueryRejection>) -> Option<String> {
    let Query(pairs) = query
        .inspect_err(|rejection| tracing::debug!(error = %rejection, "ignoring malformed query string"))
        .ok()?;

    pairs.into_iter().rev().find(|(key, _)| key == "dt").map(|(_, value)| value)
}

fn into_http(res: ApiResponse) -> Response {
    let mut builder = axum::http::Response::builder().status(res.status);
    for (name, value) in &res.headers {
        builder = builder.header(*name, value.as_str());
    }

    builder.body(Body::from(res.body_json())).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to build HTTP response");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}
