use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::engine::GradingEngine;

/// What the background sweeps share.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    engine: GradingEngine,
}

impl AppState {
    pub fn new(settings: Settings, engine: GradingEngine) -> Self {
        Self { inner: Arc::new(InnerState { settings, engine }) }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn engine(&self) -> &GradingEngine {
        &self.inner.engine
    }
}
