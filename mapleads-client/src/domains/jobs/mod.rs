//! Job table: the real-time feed and the tracker consuming it.

pub mod backend;
pub mod feed;
pub mod tracker;

pub use backend::JobsBackend;
pub use feed::{FeedError, JobFeed};
pub use tracker::{JobBoard, JobTracker};
