use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::traits::{JobError, JobHandler};
use super::types::{JobBody, JobOutput, JobRequest};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("init job handler for cmd '{name}' error, {source}")]
    Configure {
        name: String,
        #[source]
        source: JobError,
    },
    #[error("job handler for cmd '{0}' is already registered")]
    Duplicate(String),
}

#[derive(Clone)]
struct Registration {
    prefix: String,
    handler: Arc<dyn JobHandler>,
}

/// Lookup table from operation name to handler.
///
/// Built once at startup, then shared read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `handler` from `config_path` and store it as `prefix + name`.
    ///
    /// A configuration failure rejects only this handler.
    pub fn register<H>(
        &mut self,
        prefix: &str,
        config_path: &Path,
        mut handler: H,
    ) -> Result<(), RegistryError>
    where
        H: JobHandler + 'static,
    {
        let name = handler.name().to_string();
        let op = format!("{prefix}{name}");
        if self.handlers.contains_key(&op) {
            return Err(RegistryError::Duplicate(op));
        }

        handler
            .configure(config_path)
            .map_err(|source| RegistryError::Configure {
                name: name.clone(),
                source,
            })?;

        info!(op = %op, config = %config_path.display(), "Registered job handler");
        self.handlers.insert(
            op,
            Registration {
                prefix: prefix.to_string(),
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    pub fn ops(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Hand `request` to the handler named by its first command segment.
    ///
    /// The body is drained afterwards whatever the outcome.
    pub async fn route(
        &self,
        request: &JobRequest,
        body: &mut JobBody,
    ) -> Result<JobOutput, JobError> {
        let op = request
            .command
            .split_once('/')
            .map_or(request.command.as_str(), |(op, _)| op);

        let result = match self.handlers.get(op) {
            Some(registration) => {
                let command = request
                    .command
                    .strip_prefix(registration.prefix.as_str())
                    .unwrap_or(&request.command);
                let request = request.with_command(command);
                debug!(request_id = %request.request_id, op, "Dispatching job");
                registration.handler.execute(&request, body).await
            }
            None => Err(JobError::NoHandler),
        };

        let drained = body.drain().await;
        if drained > 0 {
            debug!(request_id = %request.request_id, drained, "Drained unread request body");
        }

        result
    }
}
