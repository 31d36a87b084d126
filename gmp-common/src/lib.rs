//! # GMP Common Library
//!
//! Shared code for the GMP crates:
//! - Event types (GmpEvent enum) and the EventBus
//! - Track references and YouTube id handling
//! - Configuration loading
//! - Human-readable formatting
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod sse;
pub mod track;

pub use error::{Error, Result};
pub use events::{EventBus, GmpEvent, PlaybackState};
pub use track::{TenantId, TrackReference};
