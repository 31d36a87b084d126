//! Per-tenant playback orchestration
//!
//! Leaf-first:
//! - `queue`: FIFO of waiting tracks
//! - `resolver`: strategy chain turning a track into a stream
//! - `session`: the per-tenant state machine (actor)
//! - `registry`: tenant → session map
//! - `engine`: the operations exposed to callers

pub mod engine;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod session;

pub use engine::{PlaybackEngine, TrackRequest};
pub use publisher::EventPublisher;
pub use queue::TrackQueue;
pub use registry::SessionRegistry;
pub use resolver::{AudioSourceResolver, ResolverStrategy, StreamHandle, StreamSource};
pub use session::{SessionDeps, SessionSnapshot};
