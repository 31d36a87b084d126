//! HTTP/SSE presentation adapter
//!
//! Thin layer over `PlaybackEngine`: every handler validates its input,
//! calls one engine operation, and maps the result to a status code.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
