use std::sync::Arc;
use tokio::sync::watch;

use crate::infrastructure::{AppConfig, Services};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<AppConfig>,
    /// Flips to `true` when the server shuts down; batches in flight stop.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(services: Services, config: AppConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            services,
            config: Arc::new(config),
            shutdown,
        }
    }
}
