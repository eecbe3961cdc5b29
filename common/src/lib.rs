//! Shared building blocks for the weather workspace: the caller-facing error
//! type, the weather result model, the upstream HTTP client and tracing setup.

pub mod errors;
pub mod http_client;
pub mod models;
pub mod tracing;
