//! Track references and tenant identity
//!
//! A `TrackReference` identifies a requested piece of audio. It is never a
//! playable source by itself: resolution turns it into a short-lived stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Isolation unit for a playback session (one community/group context)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifying metadata for a requested track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReference {
    /// Display title
    pub title: String,

    /// Opaque source id (canonical video id, or a watch URL)
    pub source_id: String,

    /// Duration in seconds, when the search provider knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,

    /// Thumbnail URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    /// Who asked for this track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,

    /// Start playback this many seconds into the track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seek_offset_secs: Option<u64>,

    /// When the track was requested
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl TrackReference {
    /// Create a reference with only the mandatory fields set
    pub fn new(title: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_id: source_id.into(),
            duration_secs: None,
            thumbnail: None,
            requested_by: None,
            seek_offset_secs: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requested_by = Some(requester.into());
        self
    }

    /// Canonical video id for this reference, if `source_id` is recognisable
    pub fn video_id(&self) -> Option<String> {
        extract_video_id(&self.source_id)
    }

    /// Canonical watch URL, falling back to the raw source id
    pub fn watch_url(&self) -> String {
        match self.video_id() {
            Some(id) => watch_url(&id),
            None => self.source_id.clone(),
        }
    }
}

/// Extract a YouTube video id from a bare id or a watch/short/share URL.
///
/// Extra query parameters (`&list=...`, `?si=...`) are dropped.
///
/// # Examples
///
/// ```
/// use gmp_common::track::extract_video_id;
///
/// assert_eq!(extract_video_id("dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
/// assert_eq!(
///     extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").as_deref(),
///     Some("dQw4w9WgXcQ")
/// );
/// assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(), Some("dQw4w9WgXcQ"));
/// assert_eq!(extract_video_id("not an id"), None);
/// ```
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if is_video_id(input) {
        return Some(input.to_string());
    }

    let url = Url::parse(input)
        .or_else(|_| Url::parse(&format!("https://{}", input)))
        .ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let id = match host.trim_start_matches("www.") {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" => {
            match url.query_pairs().find(|(key, _)| *key == "v") {
                Some((_, v)) => Some(v.into_owned()),
                None => match segments.next() {
                    Some("shorts" | "embed" | "live") => segments.next().map(str::to_string),
                    _ => None,
                },
            }
        }
        _ => None,
    }?;

    is_video_id(&id).then_some(id)
}

fn is_video_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Canonical watch URL for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
