use axum::{routing::get, Router};

use crate::server::AppState;

use super::logs::get_distribution_log;
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/distribution-logs/{id}", get(get_distribution_log))
}
