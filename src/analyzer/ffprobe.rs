use crate::error::AppError;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Frame size used when the source has no video stream
pub const DEFAULT_FRAME_SIZE: &str = "1280x720";

/// The parts of `ffprobe -show_streams -show_format` output encodes use
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeData {
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
    #[serde(default)]
    pub format: Option<FormatInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub duration: Option<String>,
}

impl ProbeData {
    /// First stream ffprobe classifies as video
    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    }

    /// `WxH` of the first video stream, or [`DEFAULT_FRAME_SIZE`]
    pub fn frame_size(&self) -> String {
        self.video_stream()
            .and_then(|s| Some(format!("{}x{}", s.width?, s.height?)))
            .unwrap_or_else(|| DEFAULT_FRAME_SIZE.to_string())
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
    }
}

/// Probe a media file with the ffprobe at `ffprobe`
pub async fn probe(ffprobe: &Path, input: &Path) -> Result<ProbeData, AppError> {
    debug!("Probing {}", input.display());

    let output = Command::new(ffprobe)
        .args(["-v", "error", "-of", "json", "-show_streams", "-show_format"])
        .arg(input)
        .output()
        .await
        .map_err(|e| AppError::Probe(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Probe(format!("ffprobe failed: {}", stderr.trim())));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

pub fn parse_probe_output(json: &str) -> Result<ProbeData, AppError> {
    serde_json::from_str(json)
        .map_err(|e| AppError::Probe(format!("Failed to parse ffprobe output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac"},
            {"index": 1, "codec_type": "video", "codec_name": "h264",
             "width": 1920, "height": 1080, "r_frame_rate": "60/1"}
        ],
        "format": {"format_name": "flv", "duration": "3600.042000", "bit_rate": "6000000"}
    }"#;

    #[test]
    fn test_frame_size_from_video_stream() {
        let data = parse_probe_output(SAMPLE).unwrap();
        assert_eq!(data.video_stream().and_then(|s| s.index), Some(1));
        assert_eq!(data.frame_size(), "1920x1080");
        assert_eq!(data.duration_secs(), Some(3600.042));
    }

    #[test]
    fn test_frame_size_defaults_without_video() {
        let data = parse_probe_output(r#"{"streams": [{"codec_type": "audio"}]}"#).unwrap();
        assert_eq!(data.frame_size(), DEFAULT_FRAME_SIZE);
        assert_eq!(data.duration_secs(), None);
    }

    #[test]
    fn test_garbage_is_a_probe_error() {
        let err = parse_probe_output("not json").unwrap_err();
        assert!(matches!(err, AppError::Probe(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_failure_reports_stderr() {
        let err = probe(Path::new("/bin/false"), Path::new("/nonexistent.flv"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Probe(msg) if msg.starts_with("ffprobe failed")));
    }
}
