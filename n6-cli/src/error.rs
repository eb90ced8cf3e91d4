//! CLI-specific error types and exit code mapping

use n6_collectors::StateError;
use n6_config::{ConfigError, ConfigSpecEggError, ConfigSpecError};
use n6_core::N6Error;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Spec parsing, spec combination or config validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// State file could not be read, decoded or written.
    #[error("state error: {0}")]
    State(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from n6-core.
    #[error("{0}")]
    Core(#[from] N6Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                 |
    /// |------|-------------------------|
    /// | 0    | Success                 |
    /// | 1    | General / command error |
    /// | 2    | Configuration error     |
    /// | 3    | State file error        |
    /// | 10   | IO error                |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::State(_) => 3,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<ConfigSpecError> for CliError {
    fn from(e: ConfigSpecError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<ConfigSpecEggError> for CliError {
    fn from(e: ConfigSpecEggError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<StateError> for CliError {
    fn from(e: StateError) -> Self {
        Self::State(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_state_error() {
        let err: CliError = StateError::InvalidFileName("x y".to_owned()).into();
        assert_eq!(err.exit_code(), 3, "state error should return exit code 3");
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(err.exit_code(), 1, "command error should return exit code 1");
    }

    #[test]
    fn test_from_config_error_keeps_message() {
        let err: CliError = ConfigError::NoSection {
            section: "feed".to_owned(),
        }
        .into();
        let display = err.to_string();
        assert!(display.starts_with("configuration error"), "{display}");
        assert!(display.contains("feed"), "{display}");
    }

    #[test]
    fn test_from_core_error() {
        let core_err = N6Error::Collector("boom".to_owned());
        let cli_err: CliError = core_err.into();
        assert!(matches!(cli_err, CliError::Core(_)));
        assert_eq!(cli_err.exit_code(), 1);
    }
}
