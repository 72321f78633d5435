mod error;
pub mod models;
mod response;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;

pub use error::ApiError;
pub use server::{build_backend, build_registry, router, run};
