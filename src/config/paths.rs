use crate::error::{AppError, AppResult};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Finds the executable for a named external tool.
///
/// Implementations must not have side effects; calling `resolve` twice with
/// the same name yields the same answer.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, tool: &str) -> AppResult<PathBuf>;
}

/// Resolver backed by the `[paths]` config table with a PATH fallback
#[derive(Debug, Clone, Default)]
pub struct ConfigPathResolver {
    overrides: BTreeMap<String, String>,
}

impl ConfigPathResolver {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides }
    }
}

impl PathResolver for ConfigPathResolver {
    fn resolve(&self, tool: &str) -> AppResult<PathBuf> {
        // Configured paths are trusted as-is
        if let Some(path) = self.overrides.get(tool).filter(|p| !p.trim().is_empty()) {
            debug!("Using configured path for {}: {}", tool, path);
            return Ok(PathBuf::from(path));
        }

        which::which(tool).map_err(|_| AppError::ExecutableNotFound {
            tool: tool.to_string(),
        })
    }
}
