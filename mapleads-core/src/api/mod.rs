//! Backend REST surface.

pub mod routes;

pub use routes::fill;
