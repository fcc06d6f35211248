//! Protocol and presentation logic shared by mapleads front ends.
//!
//! Nothing in this crate performs I/O. It holds the backend route table,
//! the Socket.IO text codec used by the real-time job channel, the reducer
//! that turns channel messages into progress-overlay state and refetch
//! effects, and the small formatting rules (server error messages,
//! download filenames, advisory request validation) every front end must
//! agree on.

pub mod api;
pub mod download;
pub mod feed;
pub mod server_error;
pub mod validation;

pub use download::{download_filename, job_download_filename};
pub use feed::{FeedEffect, FeedMessage, FeedState};
pub use server_error::{GENERIC_ERROR_MESSAGE, describe_server_error};
pub use validation::{PlanLimits, ValidationErrors, validate_extraction};
