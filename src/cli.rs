use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use twitch_dl::app::{App, DownloadEvent, EncodeEvent};
use twitch_dl::config::{AppConfig, ConfigPathResolver, DownloadOptions, EncodeOptions};
use twitch_dl::data::Video;
use twitch_dl::plugin::{PluginRegistry, Selector};
use twitch_dl::queue::{EncodeJob, QueueEvent};
use twitch_dl::task::{ProcessTask, ProgressSample};
use twitch_dl::utils::{DependencyStatus, format_duration, format_file_size, format_rate};

/// Download Twitch videos with livestreamer and re-encode them with ffmpeg
#[derive(Debug, Parser)]
#[command(name = "twitch-dl", version)]
#[command(about = "Queue Twitch video downloads and encodes", long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more videos described by JSON files
    Download {
        /// Video descriptor files
        #[arg(required = true)]
        videos: Vec<PathBuf>,

        /// Directory the downloads go to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Base filename (single video only); suggested by plugins otherwise
        #[arg(long)]
        name: Option<String>,

        /// Stream quality passed to livestreamer
        #[arg(short, long)]
        quality: Option<String>,

        /// Skip the `<name>.json` metadata file
        #[arg(long)]
        no_metadata: bool,

        /// Skip the thumbnail images
        #[arg(long)]
        no_thumbnails: bool,

        /// Encode every finished download
        #[arg(long)]
        encode: bool,

        #[command(flatten)]
        encode_args: EncodeArgs,
    },

    /// Encode an already downloaded file
    Encode {
        /// Downloaded media file
        source: PathBuf,

        /// Video descriptor the file was downloaded from
        #[arg(long)]
        video: Option<PathBuf>,

        /// Output base name; suggested by plugins otherwise
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        encode_args: EncodeArgs,
    },

    /// List loaded plugins
    Plugins {
        /// `all`, a type such as `encode`, `type:<t>` or `capability:<c>`
        #[arg(long, default_value = "all")]
        select: Selector,
    },

    /// Print the filename plugins suggest for a video
    Suggest {
        video: PathBuf,
    },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check that the external tools can be found
    Doctor,
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Encode plugin to use
    #[arg(long)]
    pub plugin: Option<String>,

    /// Extra ffmpeg output parameter, repeatable
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

impl EncodeArgs {
    fn options(&self) -> EncodeOptions {
        EncodeOptions {
            plugin: self.plugin.clone(),
            params: self.params.iter().cloned().collect::<BTreeMap<_, _>>(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print where the config file lives
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        None if !s.trim().is_empty() => Ok((s.trim().to_string(), String::new())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_path = self.config.clone().unwrap_or_else(AppConfig::config_path);
        let config = match &self.config {
            Some(path) => AppConfig::load_from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => AppConfig::load(),
        };
        tracing::debug!("loaded config: {:?}", config);

        match self.command {
            CliCommand::Download {
                videos,
                output_dir,
                name,
                quality,
                no_metadata,
                no_thumbnails,
                encode,
                encode_args,
            } => {
                if name.is_some() && videos.len() > 1 {
                    bail!("--name can only be used with a single video");
                }
                let options = DownloadOptions {
                    quality,
                    metadata: no_metadata.then_some(false),
                    thumbnails: no_thumbnails.then_some(false),
                };
                let chain = encode.then(|| encode_args.options());
                download(config, &videos, &output_dir, name, options, chain).await
            }
            CliCommand::Encode {
                source,
                video,
                name,
                encode_args,
            } => {
                let video = match video {
                    Some(path) => load_video(&path)?,
                    None => Video {
                        title: source
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        ..Default::default()
                    },
                };
                let mut job = EncodeJob::new(Arc::new(video), source, encode_args.options());
                job.name = name;
                encode(config, job).await
            }
            CliCommand::Plugins { select } => {
                let registry = PluginRegistry::builtin()?;
                for strategy in registry.all(&select) {
                    println!(
                        "{:<8} {:<14} priority {}",
                        strategy.kind(),
                        strategy.name(),
                        strategy.priority()
                    );
                }
                Ok(())
            }
            CliCommand::Suggest { video } => {
                let video = load_video(&video)?;
                let registry = PluginRegistry::builtin()?;
                match registry.suggest_filename(&video).await {
                    Some(suggestion) => {
                        println!("{} (from {})", suggestion.filename, suggestion.plugin)
                    }
                    None => println!("no plugin suggested a filename"),
                }
                Ok(())
            }
            CliCommand::Config { action } => match action {
                ConfigAction::Show => {
                    print!("{}", toml::to_string_pretty(&config)?);
                    Ok(())
                }
                ConfigAction::Path => {
                    println!("{}", config_path.display());
                    Ok(())
                }
                ConfigAction::Init { force } => {
                    if config_path.exists() && !force {
                        bail!(
                            "{} already exists (use --force to overwrite)",
                            config_path.display()
                        );
                    }
                    AppConfig::default().save_to(&config_path)?;
                    println!("wrote {}", config_path.display());
                    Ok(())
                }
            },
            CliCommand::Doctor => {
                let resolver = ConfigPathResolver::new(config.paths.clone());
                let statuses = DependencyStatus::check(&resolver);
                for status in &statuses {
                    match &status.path {
                        Some(path) => println!("{:<13} {}", status.tool, path.display()),
                        None => println!("{:<13} NOT FOUND", status.tool),
                    }
                }
                if !DependencyStatus::all_available(&statuses) {
                    bail!("some external tools are missing; set them under [paths] in the config");
                }
                Ok(())
            }
        }
    }
}

fn load_video(path: &Path) -> Result<Video> {
    Video::from_file(path).with_context(|| format!("reading video descriptor {}", path.display()))
}

/// Every descriptor, or the first one that cannot be read. Nothing is
/// queued until all of them load.
fn load_videos(paths: &[PathBuf]) -> Result<Vec<Arc<Video>>> {
    paths
        .iter()
        .map(|path| load_video(path).map(Arc::new))
        .collect()
}

async fn download(
    config: AppConfig,
    videos: &[PathBuf],
    output_dir: &Path,
    name: Option<String>,
    options: DownloadOptions,
    chain: Option<EncodeOptions>,
) -> Result<()> {
    let videos = load_videos(videos)?;

    let app = App::with_defaults(config)?;
    let mut downloads = app.downloads.subscribe();
    let mut encodes = app.encodes.subscribe();
    if let Some(encode_options) = chain.clone() {
        app.chain_encodes(encode_options);
    }

    for video in videos.iter().cloned() {
        let base = match &name {
            Some(name) => name.clone(),
            None => app
                .suggest_filename(&video)
                .await
                .map(|s| s.filename)
                .unwrap_or_else(|| video.id.clone()),
        };
        app.download(video, output_dir.join(base), options.clone());
    }

    let mut tally = Tally {
        downloads_expected: videos.len(),
        ..Default::default()
    };
    let mut cancelled = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while !tally.done() {
        tokio::select! {
            Some(event) = downloads.recv() => {
                if report_download(&event, &mut tally) && chain.is_some() {
                    tally.encodes_expected += 1;
                }
            }
            Some(event) = encodes.recv() => report_encode(&event, &mut tally),
            _ = &mut ctrl_c, if !cancelled => {
                warn!("Interrupted, stopping all tasks");
                cancelled = true;
                app.shutdown();
            }
            else => break,
        }

        if cancelled && app.downloads.active().is_empty() && app.encodes.active().is_empty() {
            break;
        }
    }

    tally.finish(cancelled)
}

async fn encode(config: AppConfig, job: EncodeJob) -> Result<()> {
    let app = App::with_defaults(config)?;
    let mut encodes = app.encodes.subscribe();
    app.encode(job);

    let mut tally = Tally {
        encodes_expected: 1,
        ..Default::default()
    };
    let mut cancelled = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while !tally.done() {
        tokio::select! {
            Some(event) = encodes.recv() => report_encode(&event, &mut tally),
            _ = &mut ctrl_c, if !cancelled => {
                warn!("Interrupted, stopping the encode");
                cancelled = true;
                app.shutdown();
            }
            else => break,
        }
    }

    tally.finish(cancelled)
}

/// Terminal outcomes seen so far
#[derive(Debug, Default)]
struct Tally {
    downloads_expected: usize,
    encodes_expected: usize,
    finished: usize,
    failed: usize,
    downloads_done: usize,
    encodes_done: usize,
}

impl Tally {
    fn done(&self) -> bool {
        self.downloads_done >= self.downloads_expected && self.encodes_done >= self.encodes_expected
    }

    fn finish(&self, cancelled: bool) -> Result<()> {
        info!("{} task(s) finished, {} failed", self.finished, self.failed);
        if cancelled {
            bail!("interrupted");
        }
        if self.failed > 0 {
            bail!("{} task(s) failed", self.failed);
        }
        Ok(())
    }
}

/// Print one download event; true when a download finished
fn report_download(event: &DownloadEvent, tally: &mut Tally) -> bool {
    match event {
        QueueEvent::Started(task) => {
            println!("[download] started  {}", task.job().video.label());
        }
        QueueEvent::Progress { task, progress } => {
            println!("[download] {} {}", task.job().video.label(), describe(progress));
        }
        QueueEvent::Finished(task) => {
            tally.finished += 1;
            tally.downloads_done += 1;
            println!("[download] finished {}{}", task.job().video.label(), summary(task));
            return true;
        }
        QueueEvent::Failed { task, error } => {
            tally.failed += 1;
            tally.downloads_done += 1;
            println!("[download] FAILED   {}: {}", task.job().video.label(), error);
        }
        QueueEvent::Queued(job) => println!("[download] queued   {}", job.video.label()),
        QueueEvent::Dequeued(job) => println!("[download] dequeued {}", job.video.label()),
    }
    false
}

fn report_encode(event: &EncodeEvent, tally: &mut Tally) {
    match event {
        QueueEvent::Started(task) => {
            println!("[encode]   started  {}", task.job().source.display());
        }
        QueueEvent::Progress { task, progress } => {
            let done = task
                .percent_done()
                .map(|p| format!(" {:.1}%", p))
                .unwrap_or_default();
            println!(
                "[encode]   {} {}{}",
                task.job().source.display(),
                describe(progress),
                done
            );
        }
        QueueEvent::Finished(task) => {
            tally.finished += 1;
            tally.encodes_done += 1;
            println!("[encode]   finished {}{}", task.job().source.display(), summary(task));
        }
        QueueEvent::Failed { task, error } => {
            tally.failed += 1;
            tally.encodes_done += 1;
            println!("[encode]   FAILED   {}: {}", task.job().source.display(), error);
        }
        QueueEvent::Queued(job) => println!("[encode]   queued   {}", job.source.display()),
        QueueEvent::Dequeued(job) => println!("[encode]   dequeued {}", job.source.display()),
    }
}

fn describe(sample: &ProgressSample) -> String {
    format!("{} ({} @ {})", sample.progress, sample.elapsed, sample.speed)
}

/// ` -> out.flv, 1.2 GiB at 3 MiB/s avg` from the task's recent history
fn summary<J>(task: &ProcessTask<J>) -> String {
    let mut text = match task.output() {
        Some(path) => format!(" -> {}", path.display()),
        None => String::new(),
    };

    let history = task.history();
    if let Some(bytes) = history.last().and_then(ProgressSample::bytes_written) {
        text.push_str(&format!(", {}", format_file_size(bytes)));
    }
    let rates: Vec<f64> = history
        .iter()
        .filter_map(ProgressSample::rate_bytes_per_sec)
        .collect();
    if !rates.is_empty() {
        let average = rates.iter().sum::<f64>() / rates.len() as f64;
        text.push_str(&format!(" at {} avg", format_rate(average)));
    }
    if let Some(secs) = history.last().and_then(ProgressSample::elapsed_secs) {
        text.push_str(&format!(" in {}", format_duration(Duration::from_secs_f64(secs))));
    }

    text
}
