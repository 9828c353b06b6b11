//! Distribution log lookup.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::distribution_log::DistributionLogEntry;
use crate::error::{AppError, Result};
use crate::server::AppState;

/// GET /distribution-logs/{id}
pub async fn get_distribution_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DistributionLogEntry>> {
    let log = state
        .distribution_log
        .as_ref()
        .ok_or_else(|| AppError::NotFound("distribution log is disabled".to_string()))?;

    log.get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("distribution log '{}'", id)))
}
