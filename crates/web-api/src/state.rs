use std::sync::Arc;

use application::{BroadcastHub, ConnectionRegistry, SubmissionRateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub rate_limiter: Arc<SubmissionRateLimiter>,
}

impl AppState {
    pub fn new(hub: Arc<BroadcastHub>, rate_limiter: Arc<SubmissionRateLimiter>) -> Self {
        Self { hub, rate_limiter }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.hub.registry()
    }
}
