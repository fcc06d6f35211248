//! Route definitions for the extraction backend.
//!
//! Paths are relative to the configured API base URL. Templates use `{id}`
//! placeholders; substitute them with [`fill`].

pub mod users {
    pub const LOGIN: &str = "/users/login";
    pub const SIGNUP: &str = "/users/signup";
    pub const GOOGLE_TOKEN: &str = "/users/auth/google/token";
    pub const CURRENT: &str = "/users/me";
}

pub mod token {
    pub const REFRESH: &str = "/token/refresh/";
}

pub mod jobs {
    pub const COLLECTION: &str = "/jobs";
    pub const DELETE: &str = "/delete/{id}";
    pub const DOWNLOAD: &str = "/{id}/download";
}

/// Socket.IO endpoint for the real-time job channel, relative to the
/// socket host.
pub const SOCKET_IO: &str = "/socket.io/";

/// Substitute `{id}` in a route template with a percent-encoded id.
pub fn fill(template: &str, id: &str) -> String {
    template.replace("{id}", &urlencoding::encode(id))
}
