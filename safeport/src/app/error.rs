//! Application error types.

use std::fmt;

use crate::config::ConfigError;
use crate::options::OptionsError;

/// Errors that can occur while starting the placement core.
#[derive(Debug)]
pub enum AppError {
    /// The settings object failed validation.
    Config(ConfigError),

    /// The default search options could not be built.
    DefaultOptions(OptionsError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => {
                write!(f, "Configuration error: {}", e)
            }
            AppError::DefaultOptions(e) => {
                write!(f, "Invalid default search options: {}", e)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::DefaultOptions(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<OptionsError> for AppError {
    fn from(e: OptionsError) -> Self {
        AppError::DefaultOptions(e)
    }
}
