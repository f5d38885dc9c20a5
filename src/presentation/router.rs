// Route table
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    fetch_status, health_check, image, latest_readings, monthly, password_reset,
    record_activity, report, report_csv, session_status, sign_in, sign_out, substance_latest,
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/session", get(session_status))
        .route("/session/sign-in", post(sign_in))
        .route("/session/sign-out", post(sign_out))
        .route("/session/activity", post(record_activity))
        .route("/session/password-reset", post(password_reset))
        .route("/readings/latest", get(latest_readings))
        .route("/substances/:id/latest", get(substance_latest))
        .route("/series/monthly", get(monthly))
        .route("/report", get(report))
        .route("/report.csv", get(report_csv))
        .route("/images/:id", get(image))
        .route("/status", get(fetch_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
