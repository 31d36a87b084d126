//! Human-readable formatting for track metadata
//!
//! Provides consistent display formatting for durations and view counts
//! returned by search results and shown in status payloads.

/// Format a track duration as `M:SS`.
///
/// Minutes are not wrapped into hours; a 75 minute mix renders as `75:00`.
///
/// # Examples
///
/// ```
/// use gmp_common::human_time::format_track_duration;
///
/// assert_eq!(format_track_duration(Some(0)), "N/A");
/// assert_eq!(format_track_duration(Some(65)), "1:05");
/// assert_eq!(format_track_duration(Some(600)), "10:00");
/// assert_eq!(format_track_duration(None), "N/A");
/// ```
pub fn format_track_duration(seconds: Option<u64>) -> String {
    match seconds {
        Some(secs) if secs > 0 => format!("{}:{:02}", secs / 60, secs % 60),
        _ => "N/A".to_string(),
    }
}

/// Format a view count with a compact suffix.
///
/// # Examples
///
/// ```
/// use gmp_common::human_time::format_view_count;
///
/// assert_eq!(format_view_count(Some(999)), "999");
/// assert_eq!(format_view_count(Some(1_500)), "1.5K");
/// assert_eq!(format_view_count(Some(2_340_000)), "2.3M");
/// assert_eq!(format_view_count(None), "N/A");
/// ```
pub fn format_view_count(views: Option<u64>) -> String {
    match views {
        Some(n) if n >= 1_000_000 => format!("{:.1}M", n as f64 / 1_000_000.0),
        Some(n) if n >= 1_000 => format!("{:.1}K", n as f64 / 1_000.0),
        Some(n) if n > 0 => n.to_string(),
        _ => "N/A".to_string(),
    }
}
