//! Application Module
//!
//! Wires configuration, tool resolution, plugins and the download and
//! encode queues together.

use crate::config::{AppConfig, ConfigPathResolver, DownloadOptions, EncodeOptions, PathResolver};
use crate::data::Video;
use crate::downloader::DownloadLauncher;
use crate::encoder::EncodeLauncher;
use crate::error::AppResult;
use crate::plugin::{PluginRegistry, Suggestion};
use crate::queue::{DownloadJob, EncodeJob, EventFor, QueueEvent, TaskQueue};
use crate::task::{ProcessActivator, ProcessTask};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub type DownloadActivator = ProcessActivator<DownloadLauncher>;
pub type EncodeActivator = ProcessActivator<EncodeLauncher>;

pub type DownloadQueue = TaskQueue<DownloadActivator>;
pub type EncodeQueue = TaskQueue<EncodeActivator>;

pub type DownloadTask = ProcessTask<DownloadJob>;
pub type EncodeTask = ProcessTask<EncodeJob>;

pub type DownloadEvent = EventFor<DownloadActivator>;
pub type EncodeEvent = EventFor<EncodeActivator>;

/// Main application state
pub struct App {
    pub config: AppConfig,
    pub plugins: Arc<PluginRegistry>,
    pub downloads: DownloadQueue,
    pub encodes: EncodeQueue,
}

impl App {
    /// Build the queues. Must be called inside a tokio runtime.
    pub fn new(
        config: AppConfig,
        resolver: Arc<dyn PathResolver>,
        plugins: PluginRegistry,
    ) -> AppResult<Self> {
        config.validate()?;
        let plugins = Arc::new(plugins);

        let downloads = TaskQueue::new(
            "downloads",
            config.queue.max_downloads,
            ProcessActivator::new(DownloadLauncher::new(
                config.stream.clone(),
                resolver.clone(),
            )?),
        );
        let encodes = TaskQueue::new(
            "encodes",
            config.queue.max_encodes,
            ProcessActivator::new(EncodeLauncher::new(
                config.encode.clone(),
                resolver,
                plugins.clone(),
            )),
        );

        for (name, slots) in [
            (downloads.name(), downloads.max_concurrent()),
            (encodes.name(), encodes.max_concurrent()),
        ] {
            info!("Queue {} ready with {} slot(s)", name, slots);
        }

        Ok(Self {
            config,
            plugins,
            downloads,
            encodes,
        })
    }

    /// Config-backed path resolution and the built-in plugins
    pub fn with_defaults(config: AppConfig) -> AppResult<Self> {
        let resolver = Arc::new(ConfigPathResolver::new(config.paths.clone()));
        Self::new(config, resolver, PluginRegistry::builtin()?)
    }

    /// Queue a download of `video` to `output` (no extension)
    pub fn download(
        &self,
        video: Arc<Video>,
        output: PathBuf,
        options: DownloadOptions,
    ) -> DownloadJob {
        let job = DownloadJob::new(video, output, options);
        self.downloads.start(job.clone());
        job
    }

    pub fn encode(&self, job: EncodeJob) {
        self.encodes.start(job);
    }

    pub async fn suggest_filename(&self, video: &Video) -> Option<Suggestion> {
        self.plugins.suggest_filename(video).await
    }

    /// Queue an encode for every download that finishes from now on.
    ///
    /// The returned task ends once the download queue is gone.
    pub fn chain_encodes(&self, options: EncodeOptions) -> JoinHandle<()> {
        let mut events = self.downloads.subscribe();
        let encodes = self.encodes.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let QueueEvent::Finished(task) = event {
                    let job = EncodeJob::from_download(task.job(), options.clone());
                    info!("Queueing encode of {}", job.source.display());
                    encodes.start(job);
                }
            }
        })
    }

    /// Kill running tasks and drop waiting jobs in both queues
    pub fn shutdown(&self) {
        self.downloads.shutdown();
        self.encodes.shutdown();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::data::tests::sample_video;
    use crate::error::AppError;
    use std::time::Duration;
    use tokio::time::timeout;

    fn config(tools: &[(&str, &str)]) -> AppConfig {
        let mut config = AppConfig::default();
        config.stream.metadata = false;
        config.stream.thumbnails = false;
        for (tool, path) in tools {
            config.paths.insert(tool.to_string(), path.to_string());
        }
        config
    }

    #[tokio::test]
    async fn test_download_chains_into_encode() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::with_defaults(config(&[
            ("livestreamer", "/bin/true"),
            ("ffmpeg", "/bin/true"),
            ("ffprobe", "/bin/true"),
        ]))
        .unwrap();

        let mut downloads = app.downloads.subscribe();
        let mut encodes = app.encodes.subscribe();
        let _chain = app.chain_encodes(EncodeOptions::default());

        let job = app.download(
            Arc::new(sample_video()),
            dir.path().join("run"),
            DownloadOptions::default(),
        );

        let finished = timeout(Duration::from_secs(10), async {
            loop {
                match downloads.recv().await {
                    Some(QueueEvent::Finished(task)) => break task,
                    Some(_) => continue,
                    None => panic!("download queue closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(finished.job().id, job.id);

        // Empty ffprobe output cannot be parsed, so the encode fails cleanly
        let failure = timeout(Duration::from_secs(10), async {
            loop {
                match encodes.recv().await {
                    Some(QueueEvent::Failed { task, error }) => break (task, error),
                    Some(_) => continue,
                    None => panic!("encode queue closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(failure.0.job().source, job.target());
        assert!(matches!(*failure.1, AppError::Probe(_)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = config(&[]);
        config.queue.max_downloads = 0;
        assert!(matches!(App::with_defaults(config), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_shutdown_drops_waiting_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&[("livestreamer", "/bin/sleep")]);
        config.queue.max_downloads = 1;
        let app = App::with_defaults(config).unwrap();

        for n in 0..3 {
            app.download(
                Arc::new(sample_video()),
                dir.path().join(format!("run{}", n)),
                DownloadOptions::default(),
            );
        }
        assert_eq!(app.downloads.pending().len(), 2);

        app.shutdown();
        assert!(app.downloads.pending().is_empty());
        assert!(app.suggest_filename(&sample_video()).await.is_some());
    }
}
