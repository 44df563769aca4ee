use thiserror::Error;

#[derive(Error, Debug)]
pub enum WayfarerError {
    #[error("Browser not found. Please install Chrome, Brave, or Edge.")]
    BrowserNotFound,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("CDP connection failed: {0}")]
    CdpConnectionFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Oracle error: {0}")]
    OracleError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// Clean stop requested through the cancellation token. Callers treat
    /// this as a normal end of the run, not a failure.
    #[error("Exploration cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, WayfarerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_cancellation_render_distinct_messages() {
        assert_eq!(
            WayfarerError::Timeout("CDP".to_string()).to_string(),
            "Timeout: CDP"
        );
        assert_eq!(
            WayfarerError::Cancelled.to_string(),
            "Exploration cancelled"
        );
    }
}
