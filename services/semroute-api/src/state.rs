//! Shared state handed to every request handler.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use semroute_core::{RouterError, RouterResult};

use crate::classifier::RouteClassifier;
use crate::lifecycle::HealthState;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthState>,
    /// Set once, after route synchronization succeeds
    classifier: Arc<OnceCell<Arc<RouteClassifier>>>,
}

impl AppState {
    pub fn new(health: Arc<HealthState>) -> Self {
        Self {
            health,
            classifier: Arc::new(OnceCell::new()),
        }
    }

    pub fn classifier(&self) -> Option<Arc<RouteClassifier>> {
        self.classifier.get().cloned()
    }

    pub fn publish_classifier(&self, classifier: Arc<RouteClassifier>) -> RouterResult<()> {
        self.classifier
            .set(classifier)
            .map_err(|_| RouterError::invalid_state("classifier already published"))
    }
}
