use crate::observer::ObserverClient;
use std::sync::Arc;

/// Shared application state for HTTP handlers
///
/// Handlers keep no recording state. Everything is asked of the
/// controller through the observer client.
#[derive(Clone)]
pub struct AppState {
    pub observer: Arc<ObserverClient>,
    pub service_name: String,
}

impl AppState {
    pub fn new(observer: Arc<ObserverClient>, service_name: impl Into<String>) -> Self {
        Self {
            observer,
            service_name: service_name.into(),
        }
    }
}
