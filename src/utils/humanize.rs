use humansize::{BINARY, format_size};
use std::time::Duration;

/// Format a duration as `HH:MM:SS`, or `MM:SS` under an hour
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

pub fn format_file_size(bytes: u64) -> String {
    format_size(bytes, BINARY)
}

/// Bytes per second as e.g. `1.5 MiB/s`
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_size(bytes_per_sec.max(0.0) as u64, BINARY))
}
