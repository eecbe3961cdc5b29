//! Weather resolution pipeline.
//!
//! Answers "current weather for a city" from an ordered chain of upstream
//! providers, behind a cache that coalesces concurrent lookups of the same
//! city into a single upstream call.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod openapi;
pub mod provider;
pub mod service;

pub use cache::{CacheError, CacheSettings, CacheStore};
pub use config::Config;
pub use context::RequestContext;
pub use error::WeatherError;
pub use provider::{ProviderChain, ProviderKind, WeatherProvider};
pub use service::WeatherService;
