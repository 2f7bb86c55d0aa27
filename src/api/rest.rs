// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only diagnostics under `/api/v1/`. Nothing here mutates state.
//
// CORS is configured permissively; the listener is expected to sit behind a
// private network boundary.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::{AppState, SymbolHealth};
use crate::market_data::DynamicThresholds;

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/view/:symbol", get(view))
        .route("/api/v1/thresholds/:symbol", get(thresholds))
        .route("/api/v1/volatility/:symbol", get(volatility))
        .route("/api/v1/params", get(params))
        .layer(cors)
        .with_state(state)
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    uptime_secs: u64,
    server_time: i64,
    symbols: Vec<SymbolHealth>,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.health_snapshot();
    Json(HealthResponse {
        status: "ok",
        state_version: snapshot.state_version,
        uptime_secs: snapshot.uptime_secs,
        server_time: chrono::Utc::now().timestamp_millis(),
        symbols: snapshot.symbols,
    })
}

// =============================================================================
// Merged view
// =============================================================================

async fn view(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> impl IntoResponse {
    let symbol = normalize(&symbol);
    match state.get_indicator_view(&symbol) {
        Some(view) => Json(view).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "symbol": symbol,
                "error": "indicator view not ready",
            })),
        )
            .into_response(),
    }
}

// =============================================================================
// Calibration
// =============================================================================

#[derive(Serialize)]
struct ThresholdsResponse {
    symbol: String,
    window: usize,
    thresholds: DynamicThresholds,
}

async fn thresholds(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = normalize(&symbol);
    Json(ThresholdsResponse {
        window: state.orderbook_store.calibration_window_len(&symbol),
        thresholds: state.get_dynamic_thresholds(&symbol),
        symbol,
    })
}

async fn volatility(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = normalize(&symbol);
    Json(state.volatility.report(&symbol))
}

async fn params(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json((*state.strategy_params()).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;
    use crate::types::PriceLevel;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(RuntimeConfig {
            symbols: vec!["SOLUSDT".into()],
            ..RuntimeConfig::default()
        }))
    }

    #[tokio::test]
    async fn view_is_not_found_until_ready() {
        let resp = view(State(state()), Path("solusdt".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn thresholds_endpoint_responds() {
        let state = state();
        state.apply_order_book_update(
            "SOLUSDT",
            vec![PriceLevel::new(99.9, 10.0)],
            vec![PriceLevel::new(100.1, 10.0)],
        );
        let resp = thresholds(State(state), Path("SOLUSDT".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let resp = health(State(state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
