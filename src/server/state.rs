use std::sync::Arc;

use crate::config::Settings;
use crate::distribution_log::DistributionLogBackend;

/// Shared handles for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub distribution_log: Option<Arc<dyn DistributionLogBackend>>,
}
