// Gemstream Engine — Generation Service Registry
// Callers hold `Arc<dyn GenerationService>` and never name the backend.

pub mod google;

pub use google::GoogleProvider;

use crate::atoms::traits::GenerationService;
use crate::engine::config::AppConfig;
use std::sync::Arc;

/// Build the configured generation service.
pub fn from_config(config: &AppConfig) -> Arc<dyn GenerationService> {
    Arc::new(GoogleProvider::new(config))
}
