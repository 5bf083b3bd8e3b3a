use crate::config::{DownloadOptions, EncodeOptions};
use crate::data::Video;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Extension livestreamer output gets appended
pub const DOWNLOAD_EXTENSION: &str = "flv";

/// A video to fetch with livestreamer
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: Uuid,
    pub video: Arc<Video>,
    /// Output path without extension; sidecar files share this stem
    pub output: PathBuf,
    pub options: DownloadOptions,
}

impl DownloadJob {
    pub fn new(video: Arc<Video>, output: PathBuf, options: DownloadOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            video,
            output,
            options,
        }
    }

    /// File the stream is written to
    pub fn target(&self) -> PathBuf {
        with_suffix(&self.output, &format!(".{}", DOWNLOAD_EXTENSION))
    }
}

/// A downloaded file to transcode with ffmpeg
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub id: Uuid,
    pub video: Arc<Video>,
    pub source: PathBuf,
    /// Output base name; a context plugin picks one when absent
    pub name: Option<String>,
    pub options: EncodeOptions,
}

impl EncodeJob {
    pub fn new(video: Arc<Video>, source: PathBuf, options: EncodeOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            video,
            source,
            name: None,
            options,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Encode of what `download` produced, keeping its base name
    pub fn from_download(download: &DownloadJob, options: EncodeOptions) -> Self {
        let mut job = Self::new(download.video.clone(), download.target(), options);
        job.name = download
            .output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        job
    }
}

/// Append `suffix` to the last path component. `out.part` + `.json`
/// gives `out.part.json`, unlike `Path::with_extension`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::sample_video;

    #[test]
    fn test_download_target_keeps_dots() {
        let job = DownloadJob::new(
            Arc::new(sample_video()),
            PathBuf::from("/tmp/run.v2"),
            DownloadOptions::default(),
        );
        assert_eq!(job.target(), PathBuf::from("/tmp/run.v2.flv"));
    }

    #[test]
    fn test_encode_follows_download() {
        let download = DownloadJob::new(
            Arc::new(sample_video()),
            PathBuf::from("/videos/run"),
            DownloadOptions::default(),
        );
        let encode = EncodeJob::from_download(&download, EncodeOptions::default());

        assert_eq!(encode.source, PathBuf::from("/videos/run.flv"));
        assert_eq!(encode.name.as_deref(), Some("run"));
        assert_ne!(encode.id, download.id);
        assert!(Arc::ptr_eq(&encode.video, &download.video));
        assert_eq!(encode.with_name("final").name.as_deref(), Some("final"));
    }
}
