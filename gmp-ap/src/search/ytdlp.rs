//! yt-dlp search provider
//!
//! Uses `ytsearchN:` with `--flat-playlist --dump-json`, one JSON object per
//! line. yt-dlp has no paging, so page `p` over-fetches `p * per_page`
//! results and skips the earlier pages.

use super::{SearchProvider, SearchResult};
use crate::error::{Error, Result};
use crate::ytdlp::YtDlp;
use async_trait::async_trait;
use gmp_common::config::YtDlpConfig;
use gmp_common::TrackReference;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Deepest result index a search may ask yt-dlp for
pub const MAX_SEARCH_RESULTS: u32 = 500;

pub struct YtDlpSearch {
    ytdlp: YtDlp,
    per_page: u32,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl YtDlpSearch {
    pub fn new(config: &YtDlpConfig) -> Self {
        Self {
            ytdlp: YtDlp::from_config(config),
            per_page: config.search_results_per_page.clamp(1, MAX_SEARCH_RESULTS),
            max_retries: config.search_max_retries.max(1),
            retry_base_delay: Duration::from_millis(config.search_retry_base_delay_ms),
        }
    }

    async fn run_once(&self, query: &str, wanted: u32) -> Result<Vec<SearchResult>> {
        let target = format!("ytsearch{}:{}", wanted, query);
        let stdout = self
            .ytdlp
            .output(["--flat-playlist", "--dump-json", "--no-warnings", target.as_str()])
            .await?;

        let skip = (wanted - self.per_page) as usize;
        Ok(stdout
            .lines()
            .filter_map(parse_entry)
            .skip(skip)
            .take(self.per_page as usize)
            .collect())
    }
}

#[async_trait]
impl SearchProvider for YtDlpSearch {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::UserInput("search query is empty".to_string()));
        }
        let page = page.max(1);
        let wanted = page
            .checked_mul(self.per_page)
            .filter(|n| *n <= MAX_SEARCH_RESULTS)
            .ok_or_else(|| Error::UserInput(format!("page {} is beyond the last search page", page)))?;

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            match self.run_once(query, wanted).await {
                Ok(results) => {
                    debug!(query, page, count = results.len(), "Search complete");
                    return Ok(results);
                }
                Err(e) => {
                    warn!(query, attempt = attempt + 1, max_retries = self.max_retries, "Search failed: {}", e);
                    last_error = e.to_string();
                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(self.retry_base_delay * (attempt + 1)).await;
                    }
                }
            }
        }

        Err(Error::Search(last_error))
    }
}

/// Parse one `--dump-json` line; entries without an id are skipped
fn parse_entry(line: &str) -> Option<SearchResult> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            debug!("Skipping unparseable search line: {}", e);
            return None;
        }
    };

    let id = value.get("id")?.as_str()?;
    let title = value
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Unknown title");

    let mut track = TrackReference::new(title, id);
    track.duration_secs = value
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|d| *d > 0.0)
        .map(|d| d.round() as u64);
    track.thumbnail = value
        .get("thumbnails")
        .and_then(Value::as_array)
        .and_then(|thumbs| thumbs.last())
        .and_then(|t| t.get("url"))
        .or_else(|| value.get("thumbnail"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let channel_name = value
        .get("channel")
        .or_else(|| value.get("uploader"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let view_count = value.get("view_count").and_then(Value::as_u64);

    Some(SearchResult::new(track, channel_name, view_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_entry() {
        let line = r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","duration":212.0,"channel":"Rick Astley","view_count":1500000000,"thumbnails":[{"url":"https://i.ytimg.com/small.jpg"},{"url":"https://i.ytimg.com/large.jpg"}]}"#;
        let result = parse_entry(line).unwrap();

        assert_eq!(result.track.source_id, "dQw4w9WgXcQ");
        assert_eq!(result.track.title, "Never Gonna Give You Up");
        assert_eq!(result.track.duration_secs, Some(212));
        assert_eq!(result.track.thumbnail.as_deref(), Some("https://i.ytimg.com/large.jpg"));
        assert_eq!(result.channel_name.as_deref(), Some("Rick Astley"));
        assert_eq!(result.views_text, "1500.0M");
    }

    #[test]
    fn test_parse_sparse_entry() {
        let result = parse_entry(r#"{"id":"abc","uploader":"Someone"}"#).unwrap();
        assert_eq!(result.track.title, "Unknown title");
        assert_eq!(result.track.duration_secs, None);
        assert_eq!(result.channel_name.as_deref(), Some("Someone"));
        assert_eq!(result.duration_text, "N/A");
    }

    #[test]
    fn test_parse_rejects_noise() {
        assert!(parse_entry("").is_none());
        assert!(parse_entry("not json").is_none());
        assert!(parse_entry(r#"{"title":"no id"}"#).is_none());
    }

    #[tokio::test]
    async fn test_empty_query_is_user_input() {
        let search = YtDlpSearch::new(&YtDlpConfig::default());
        let err = search.search("   ", 1).await.unwrap_err();
        assert!(matches!(err, Error::UserInput(_)));
    }

    #[tokio::test]
    async fn test_page_beyond_limit_is_user_input() {
        let config = YtDlpConfig {
            binary: "gmp-test-no-such-binary".to_string(),
            search_max_retries: 1,
            ..YtDlpConfig::default()
        };
        let search = YtDlpSearch::new(&config);

        let err = search.search("song", 500_000_000).await.unwrap_err();
        assert!(matches!(err, Error::UserInput(_)));

        let err = search.search("song", u32::MAX).await.unwrap_err();
        assert!(matches!(err, Error::UserInput(_)));

        // Last allowed page still reaches the binary
        let err = search.search("song", MAX_SEARCH_RESULTS / 10).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }

    #[tokio::test]
    async fn test_failing_binary_exhausts_retries() {
        let config = YtDlpConfig {
            binary: "gmp-test-no-such-binary".to_string(),
            search_max_retries: 2,
            search_retry_base_delay_ms: 1,
            ..YtDlpConfig::default()
        };
        let err = YtDlpSearch::new(&config).search("song", 1).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }
}
