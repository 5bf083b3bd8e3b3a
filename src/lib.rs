//! Queue Twitch video downloads (livestreamer) and encodes (ffmpeg) under
//! per-queue concurrency limits, with plugin-chosen filenames and codecs.

pub mod analyzer;
pub mod app;
pub mod config;
pub mod data;
pub mod downloader;
pub mod encoder;
pub mod error;
pub mod plugin;
pub mod queue;
pub mod task;
pub mod utils;

pub use error::{AppError, AppResult};
