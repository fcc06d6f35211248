//! mapleads client library
//!
//! Runtime half of the mapleads front end: the session service and its
//! durable store, the API client with transparent token refresh, the
//! real-time job feed and the job tracker built on it. The `mapleads`
//! binary in `src/main.rs` is a thin command line shell over these.
//!
//! Notes
//! - Runtime-independent logic (codec, reducer, formatting rules) lives in
//!   `mapleads-core`; this crate only wires it to tokio, reqwest and
//!   tokio-tungstenite.

pub mod domains;
pub mod infra;

pub use domains::auth::{SessionEvent, SessionService};
pub use domains::jobs::{JobBoard, JobFeed, JobTracker};
pub use infra::{ApiClient, ApiError, ClientConfig};
