//! # GMP Audio Player Library (gmp-ap)
//!
//! Multi-tenant playback orchestrator.
//!
//! **Purpose:** Keep one playback session per tenant: a FIFO request queue, a
//! single active playback slot, a retrying multi-strategy resolver that turns
//! track references into streams, and an HTTP/SSE control interface.
//!
//! **Architecture:** one actor per session, routed through a shared
//! registry; transport and search are pluggable collaborators.

pub mod api;
pub mod config;
pub mod error;
pub mod playback;
pub mod search;
pub mod transport;
pub mod ytdlp;

pub use error::{Error, Result};
pub use playback::PlaybackEngine;
