use std::sync::Arc;

use docket_broker::Broker;
use docket_core::GatewayConfig;

/// Shared gateway state handed to every handler.
pub struct AppState {
    pub config: GatewayConfig,
    /// Public broker the `path` announcements go to.
    pub broker: Arc<dyn Broker>,
}

impl AppState {
    pub fn new(config: GatewayConfig, broker: Arc<dyn Broker>) -> Self {
        Self { config, broker }
    }
}
