//! HTTP plumbing, configuration and shared async primitives.

pub mod api_client;
pub mod api_error;
pub mod config;
pub mod single_flight;

pub use api_client::{ApiClient, ApiRequest, Download};
pub use api_error::ApiError;
pub use config::{ClientConfig, ConfigError, ReconnectPolicy};
pub use single_flight::SingleFlight;
