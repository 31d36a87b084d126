//! Track search
//!
//! A `SearchProvider` turns a free-text query into ordered candidates.
//! `enqueue` with a query plays the first result.

pub mod ytdlp;

pub use ytdlp::YtDlpSearch;

use crate::error::Result;
use async_trait::async_trait;
use gmp_common::human_time::{format_track_duration, format_view_count};
use gmp_common::TrackReference;
use serde::Serialize;

/// One search candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub track: TrackReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    /// `M:SS`, or `N/A`
    pub duration_text: String,
    /// `1.2M` style, or `N/A`
    pub views_text: String,
}

impl SearchResult {
    pub fn new(track: TrackReference, channel_name: Option<String>, view_count: Option<u64>) -> Self {
        let duration_text = format_track_duration(track.duration_secs);
        let views_text = format_view_count(view_count);
        Self {
            track,
            channel_name,
            view_count,
            duration_text,
            views_text,
        }
    }
}

/// Source of search results
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Results for `query`, page numbers start at 1
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchResult>>;
}
