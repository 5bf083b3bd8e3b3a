//! Encode launcher
//!
//! Turns an [`EncodeJob`] into an ffmpeg command line: probe the source,
//! let the configured encode plugin pick codecs, append extra parameters.

pub mod command_builder;

pub use command_builder::FfmpegCommand;

use crate::analyzer::{self, ProbeData};
use crate::config::{EncodeConfig, PathResolver};
use crate::error::{AppError, AppResult};
use crate::plugin::{EncodePlugin, PluginRegistry};
use crate::queue::EncodeJob;
use crate::task::{Launcher, PreparedCommand, ProgressPattern};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct EncodeLauncher {
    config: EncodeConfig,
    resolver: Arc<dyn PathResolver>,
    plugins: Arc<PluginRegistry>,
}

impl EncodeLauncher {
    pub fn new(
        config: EncodeConfig,
        resolver: Arc<dyn PathResolver>,
        plugins: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            config,
            resolver,
            plugins,
        }
    }

    /// `<dir of source>/<name>.<extension>`, where the name comes from the
    /// job, then the context plugins, then the source file stem
    pub async fn output_path(&self, job: &EncodeJob, extension: &str) -> PathBuf {
        let name = match &job.name {
            Some(name) => name.clone(),
            None => match self.plugins.suggest_filename(&job.video).await {
                Some(suggestion) => {
                    debug!(
                        "Output name '{}' suggested by {}",
                        suggestion.filename, suggestion.plugin
                    );
                    suggestion.filename
                }
                None => job
                    .source
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "encode".to_string()),
            },
        };

        let dir = job.source.parent().unwrap_or_else(|| Path::new(""));
        dir.join(format!("{}.{}", name, extension))
    }
}

#[async_trait]
impl Launcher for EncodeLauncher {
    type Job = EncodeJob;

    async fn prepare(&self, job: &EncodeJob) -> AppResult<PreparedCommand> {
        let settings = job.options.merged_over(&self.config);

        // Step 1: Locate the tools
        let ffmpeg = self.resolver.resolve("ffmpeg")?;
        let ffprobe = self.resolver.resolve("ffprobe")?;

        // Step 2: Pick the encode plugin
        let plugin = self.plugins.encode_plugin(&settings.plugin)?;

        // Step 3: Decide where the result goes
        let output = self.output_path(job, plugin.extension()).await;
        if output == job.source {
            return Err(AppError::Config(format!(
                "encode output would overwrite its source {}",
                job.source.display()
            )));
        }

        // Step 4: Probe the source and build the command
        let probe = analyzer::probe(&ffprobe, &job.source).await?;
        let cmd = build_command(plugin.as_ref(), job, &output, &probe, &settings.params);

        info!(
            "Encoding {} with {} -> {}",
            job.source.display(),
            plugin.name(),
            output.display()
        );

        Ok(PreparedCommand {
            program: ffmpeg,
            args: cmd.build_args(),
            pattern: ProgressPattern::Ffmpeg,
            output: Some(output),
            duration: probe.duration_secs(),
        })
    }
}

/// Plugin settings first, then configured parameters as `-key value`
pub fn build_command(
    plugin: &dyn EncodePlugin,
    job: &EncodeJob,
    output: &Path,
    probe: &ProbeData,
    params: &BTreeMap<String, String>,
) -> FfmpegCommand {
    let mut cmd = plugin.apply(FfmpegCommand::new(&job.source, output), probe, &job.video);

    for (key, value) in params {
        let flag = if key.starts_with('-') {
            key.clone()
        } else {
            format!("-{}", key)
        };
        cmd = cmd.output_arg(flag);
        if !value.is_empty() {
            cmd = cmd.output_arg(value.as_str());
        }
    }

    cmd
}
