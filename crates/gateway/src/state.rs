use std::sync::Arc;

use sk_domain::config::Config;

use crate::presence::{PresenceRegistry, Readiness};

/// Shared application state passed to the WS handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub presence: Arc<PresenceRegistry>,
    pub readiness: Arc<Readiness>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            presence: Arc::new(PresenceRegistry::new()),
            readiness: Arc::new(Readiness::new()),
        }
    }
}
