use std::sync::Arc;

use crate::config::Config;
use crate::services::{Services, WaitlistNotifier};
use crate::store::Store;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone; everything lives behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Arc<Services>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, notifier: Arc<dyn WaitlistNotifier>) -> Self {
        let services = Services::new(store, notifier, &config);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
