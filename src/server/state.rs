//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::lifecycle::ModelManager;

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub manager: Arc<ModelManager>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, manager: Arc<ModelManager>) -> Self {
        Self {
            config,
            manager,
            started_at: Utc::now(),
        }
    }
}
