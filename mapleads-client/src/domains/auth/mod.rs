//! Session ownership and persistence.

pub mod errors;
pub mod session;
pub mod storage;

pub use errors::SessionError;
pub use session::{SessionEvent, SessionService};
pub use storage::{FileSessionStore, MemorySessionStore, SessionStore};
