use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rand::Rng;
use serde_json::json;
use tokio::net::TcpListener;

use crate::core::{MortalityTable, SimulationInput, run_simulation};

/// Runtime configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub auth_token: String,
}

struct AppState {
    auth_token: String,
    mortality: MortalityTable,
}

pub async fn run_http_server(config: ServerConfig) -> std::io::Result<()> {
    let state = Arc::new(AppState {
        auth_token: config.auth_token,
        mortality: MortalityTable::default(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("retirement simulation server listening on http://{addr}");

    axum::serve(listener, router(state)).await
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/simulation", post(simulation_handler))
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Retirement Simulation API"
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn simulation_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, &state.auth_token) {
        tracing::warn!("rejected unauthorized simulation request");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "You must be authorized to perform that action.",
        );
    }

    let started = Instant::now();

    let input: SimulationInput = match serde_json::from_slice(&body) {
        Ok(input) => input,
        Err(_) => {
            tracing::warn!("rejected simulation request with malformed body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON structure.");
        }
    };

    let trials = input.number_of_trials;
    let seed = input.seed.unwrap_or_else(|| rand::rng().random());
    let mortality = state.mortality.clone();

    // The engine is CPU-bound and fans out on rayon internally.
    let joined = tokio::task::spawn_blocking(move || run_simulation(&input, &mortality, seed)).await;

    match joined {
        Ok(Ok(timesteps)) => {
            tracing::info!(
                trials,
                months = timesteps.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "processed simulation request"
            );
            json_response(
                StatusCode::OK,
                &json!({ "success": true, "timesteps": timesteps }),
            )
        }
        Ok(Err(err)) => {
            tracing::warn!("rejected simulation request: {err}");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(err) => {
            tracing::error!("simulation worker failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed.")
        }
    }
}

/// Literal comparison of the Authorization header against the configured
/// token. An absent or empty header never authorizes.
fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    match headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        Some(provided) => !provided.is_empty() && provided == expected,
        None => false,
    }
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
    (status, axum::Json(body.clone())).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(status, &json!({ "success": false, "message": message }))
}
