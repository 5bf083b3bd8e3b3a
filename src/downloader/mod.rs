//! Download launcher
//!
//! Builds the livestreamer command line for a [`DownloadJob`] and starts
//! the metadata and thumbnail side tasks next to it.

pub mod sidecar;

use crate::config::{PathResolver, StreamConfig};
use crate::error::AppResult;
use crate::queue::DownloadJob;
use crate::task::{Launcher, PreparedCommand, ProgressPattern};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound for one thumbnail fetch
const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DownloadLauncher {
    config: StreamConfig,
    resolver: Arc<dyn PathResolver>,
    http: reqwest::Client,
}

impl DownloadLauncher {
    pub fn new(config: StreamConfig, resolver: Arc<dyn PathResolver>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(THUMBNAIL_TIMEOUT)
            .build()?;

        Ok(Self {
            config,
            resolver,
            http,
        })
    }

    fn start_side_tasks(&self, job: &DownloadJob, settings: &StreamConfig) {
        if settings.metadata {
            let video = job.video.clone();
            let output = job.output.clone();
            tokio::spawn(async move {
                if let Err(e) = sidecar::save_metadata(&video, &output).await {
                    warn!("Error saving metadata for {}: {}", video.label(), e);
                }
            });
        }

        if settings.thumbnails {
            let video = job.video.clone();
            let output = job.output.clone();
            let http = self.http.clone();
            tokio::spawn(async move {
                sidecar::save_thumbnails(&http, &video, &output).await;
            });
        }
    }
}

#[async_trait]
impl Launcher for DownloadLauncher {
    type Job = DownloadJob;

    async fn prepare(&self, job: &DownloadJob) -> AppResult<PreparedCommand> {
        let settings = job.options.merged_over(&self.config);
        let livestreamer = self.resolver.resolve("livestreamer")?;

        self.start_side_tasks(job, &settings);

        info!(
            "Downloading {} ({}) -> {}",
            job.video.label(),
            settings.quality,
            job.target().display()
        );

        Ok(PreparedCommand {
            program: livestreamer,
            args: build_livestreamer_args(&job.video.url, &settings.quality, &job.output),
            pattern: ProgressPattern::Livestreamer,
            output: Some(job.target()),
            duration: None,
        })
    }
}

/// `<url> <quality> -o <output>.flv -f`
pub fn build_livestreamer_args(url: &str, quality: &str, output: &Path) -> Vec<String> {
    let target = crate::queue::job::with_suffix(output, ".flv");
    vec![
        url.to_string(),
        quality.to_string(),
        "-o".to_string(),
        target.to_string_lossy().into_owned(),
        "-f".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPathResolver, DownloadOptions};
    use crate::data::tests::sample_video;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn launcher(overrides: &[(&str, &str)]) -> DownloadLauncher {
        let overrides: BTreeMap<_, _> = overrides
            .iter()
            .map(|(tool, path)| (tool.to_string(), path.to_string()))
            .collect();
        DownloadLauncher::new(
            StreamConfig::default(),
            Arc::new(ConfigPathResolver::new(overrides)),
        )
        .unwrap()
    }

    fn quiet() -> DownloadOptions {
        DownloadOptions {
            metadata: Some(false),
            thumbnails: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn test_livestreamer_args() {
        let args = build_livestreamer_args("https://twitch.tv/v/1", "best", Path::new("/v/run"));
        assert_eq!(args, ["https://twitch.tv/v/1", "best", "-o", "/v/run.flv", "-f"]);
    }

    #[tokio::test]
    async fn test_prepare_uses_job_quality() {
        let launcher = launcher(&[("livestreamer", "/opt/livestreamer")]);
        let options = DownloadOptions {
            quality: Some("720p".to_string()),
            ..quiet()
        };
        let job = DownloadJob::new(Arc::new(sample_video()), PathBuf::from("/v/run"), options);

        let prepared = launcher.prepare(&job).await.unwrap();
        assert_eq!(prepared.program, PathBuf::from("/opt/livestreamer"));
        assert_eq!(prepared.args[1], "720p");
        assert_eq!(prepared.pattern, ProgressPattern::Livestreamer);
        assert_eq!(prepared.output, Some(PathBuf::from("/v/run.flv")));
        assert_eq!(prepared.duration, None);
    }

    #[tokio::test]
    async fn test_prepare_writes_metadata_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher(&[("livestreamer", "/opt/livestreamer")]);
        let options = DownloadOptions {
            metadata: Some(true),
            ..quiet()
        };
        let job = DownloadJob::new(Arc::new(sample_video()), dir.path().join("run"), options);

        launcher.prepare(&job).await.unwrap();

        let sidecar = dir.path().join("run.json");
        tokio::time::timeout(Duration::from_secs(5), async {
            while !sidecar.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("metadata sidecar was not written");
    }

    #[tokio::test]
    async fn test_blank_override_uses_path_lookup() {
        let launcher = launcher(&[("livestreamer", "")]);
        let job = DownloadJob::new(Arc::new(sample_video()), PathBuf::from("/v/run"), quiet());

        match launcher.prepare(&job).await {
            Ok(prepared) => assert!(prepared.program.ends_with("livestreamer")),
            Err(err) => assert!(matches!(
                err,
                AppError::ExecutableNotFound { tool } if tool == "livestreamer"
            )),
        }
    }
}
