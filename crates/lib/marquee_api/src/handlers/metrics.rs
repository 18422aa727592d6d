//! Runtime metrics endpoint.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::{Value, json};

use crate::AppState;

/// `GET /debug/vars`: request counters plus gatekeeper state.
pub async fn snapshot(State(state): State<AppState>) -> Json<Value> {
    let metrics = state.metrics.snapshot();
    Json(json!({
        "version": state.config.version,
        "timestamp": Utc::now().timestamp(),
        "total_requests_received": metrics.requests_received,
        "total_responses_sent": metrics.responses_sent,
        "total_processing_time_us": metrics.processing_time_us,
        "total_responses_sent_by_status": metrics.responses_by_status,
        "background_tasks_outstanding": state.tasks.outstanding(),
        "rate_limit_clients": state.limiter.client_count(),
    }))
}
