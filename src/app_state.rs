use std::sync::Arc;

use crate::services::generation::GenerationService;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub generation: Arc<GenerationService>,
}

impl AppState {
    pub fn new(generation: GenerationService) -> Self {
        Self {
            generation: Arc::new(generation),
        }
    }
}
