//! Result file naming.

pub mod filename;
pub mod regions;

pub use filename::{download_filename, job_download_filename};
