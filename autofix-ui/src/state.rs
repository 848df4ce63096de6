//! Shared application state for the UI server.

use std::sync::Arc;

use autofix::io::oracle::Oracle;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Oracle used for corrections. Calls block, so handlers run them on the
    /// blocking pool.
    pub oracle: Arc<dyn Oracle>,
}

impl AppState {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}
