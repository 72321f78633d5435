use std::sync::Arc;

use crate::config::Config;
use crate::handlers::HandlerRegistry;
use crate::observability::Metrics;
use crate::request_id::RequestIdGenerator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<HandlerRegistry>,
    pub request_ids: Arc<RequestIdGenerator>,
    /// Used to proxy remote job results
    pub http: reqwest::Client,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, registry: HandlerRegistry, http: reqwest::Client) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            request_ids: Arc::new(RequestIdGenerator::new()),
            http,
            metrics: Arc::new(Metrics::new()),
        }
    }
}
