//! Track queue
//!
//! Per-session FIFO of waiting tracks. Insertion order is play order; the
//! only operation that removes entries out of order is `clear`.
//!
//! The currently playing track is *not* part of the queue: it lives in the
//! session as `current_track` once dequeued.

use gmp_common::TrackReference;
use std::collections::VecDeque;

/// FIFO of tracks waiting to be played
#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    entries: VecDeque<TrackReference>,
}

impl TrackQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append to the tail, returning the new length
    pub fn enqueue(&mut self, track: TrackReference) -> usize {
        self.entries.push_back(track);
        self.entries.len()
    }

    /// Remove and return the head, or `None` if the queue is empty
    pub fn dequeue(&mut self) -> Option<TrackReference> {
        self.entries.pop_front()
    }

    /// Ordered copy for status/UI use
    pub fn snapshot(&self) -> Vec<TrackReference> {
        self.entries.iter().cloned().collect()
    }

    /// Remove all entries (idempotent)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Peek at the head without removing it
    pub fn front(&self) -> Option<&TrackReference> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
