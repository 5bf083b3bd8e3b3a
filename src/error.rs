use thiserror::Error;

/// Result type used across the crate
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// No configured path and nothing on PATH
    #[error("executable '{tool}' not found (configure [paths].{tool} or install it)")]
    ExecutableNotFound { tool: String },

    #[error("process exited with {}", describe_exit(*.0))]
    ProcessExitNonZero(Option<i32>),

    #[error("invalid plugin selector: {0}")]
    InvalidSelector(String),

    #[error("no encode plugin named '{0}'")]
    UnknownEncodePlugin(String),

    #[error("could not read media metadata: {0}")]
    Probe(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task cancelled before the process started")]
    Cancelled,

    /// Reporter dropped without a terminal signal
    #[error("task ended without reporting a result")]
    TaskAbandoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse config: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    /// Exit code carried by a process failure, if any
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            AppError::ProcessExitNonZero(code) => *code,
            _ => None,
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_display() {
        let err = AppError::ProcessExitNonZero(Some(2));
        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(err.to_string(), "process exited with code 2");

        let killed = AppError::ProcessExitNonZero(None);
        assert_eq!(killed.exit_code(), None);
        assert!(killed.to_string().contains("signal"));
    }

    #[test]
    fn test_not_found_names_tool() {
        let err = AppError::ExecutableNotFound {
            tool: "livestreamer".to_string(),
        };
        assert!(err.to_string().contains("livestreamer"));
        assert_eq!(err.exit_code(), None);
    }
}
