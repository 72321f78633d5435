//! File operations and their dispatch
//!
//! ## Key Components
//!
//! - [`JobHandler`] - Trait every file operation implements
//! - [`HandlerRegistry`] - Maps the first command segment to a handler
//! - [`JobRequest`] / [`JobBody`] - What a handler receives
//! - [`JobOutput`] - What a handler answers with
//! - [`archive::ArchiveJob`] - Unpacks a remote zip archive into a bucket
//!
//! ## Example
//!
//! ```rust,ignore
//! use fopbox::handlers::{HandlerRegistry, JobBody, JobRequest};
//! use fopbox::handlers::archive::ArchiveJob;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("", Path::new("archive.conf"), ArchiveJob::new(backend, http))?;
//!
//! let request = JobRequest::new("archive/bucket/bXktYnVja2V0", url, request_id);
//! let output = registry.route(&request, &mut JobBody::empty()).await?;
//! ```

pub mod archive;
mod registry;
mod traits;
mod types;

pub use registry::{HandlerRegistry, RegistryError};
pub use traits::{JobError, JobHandler};
pub use types::{
    CONTENT_TYPE_JSON, CONTENT_TYPE_OCTET, JobBody, JobOutput, JobRequest, JsonPayload,
};
