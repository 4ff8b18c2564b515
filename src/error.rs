use crate::health::HealthError;
use crate::stream::StreamError;
use thiserror::Error;

/// Crate-level error types
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    /// Broker session errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Health reporter errors
    #[error("Health error: {0}")]
    Health(#[from] HealthError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry setup errors
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl Error {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            Error::Configuration(_) => "CONFIGURATION_ERROR",
            Error::Stream(_) => "STREAM_ERROR",
            Error::Health(_) => "HEALTH_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Telemetry(_) => "TELEMETRY_ERROR",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let err: Error = StreamError::Unreachable("down".to_string()).into();
        assert_eq!(err.error_code(), "STREAM_ERROR");

        let err: Error = HealthError::AlreadyStopped.into();
        assert_eq!(err.error_code(), "HEALTH_ERROR");
        assert_eq!(err.to_string(), "Health error: reporter already stopped");
    }
}
