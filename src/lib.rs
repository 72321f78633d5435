pub mod api;
pub mod config;
pub mod handlers;
pub mod http;
pub mod humanize;
pub mod observability;
pub mod request_id;
pub mod storage;
