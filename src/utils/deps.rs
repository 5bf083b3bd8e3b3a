use crate::config::PathResolver;
use std::path::PathBuf;

/// External programs the downloader and encoder run
pub const TOOLS: [&str; 3] = ["livestreamer", "ffmpeg", "ffprobe"];

/// Where one external tool was found, if anywhere
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyStatus {
    pub tool: &'static str,
    pub path: Option<PathBuf>,
}

impl DependencyStatus {
    /// Resolve every tool through `resolver`
    pub fn check(resolver: &dyn PathResolver) -> Vec<DependencyStatus> {
        TOOLS
            .iter()
            .map(|&tool| DependencyStatus {
                tool,
                path: resolver.resolve(tool).ok(),
            })
            .collect()
    }

    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }

    /// True when every tool resolved
    pub fn all_available(statuses: &[DependencyStatus]) -> bool {
        statuses.iter().all(DependencyStatus::is_available)
    }
}
