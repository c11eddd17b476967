use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tickbox_core::Error),

    #[error("cannot read config {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no item {index} (list has {len})")]
    NoSuchItem { index: usize, len: usize },

    #[error("{message}")]
    Rejected { message: String },
}

impl From<tickbox_core::ConfigError> for CliError {
    fn from(err: tickbox_core::ConfigError) -> Self {
        Self::Core(err.into())
    }
}

impl CliError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        1
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_exit_code() {
        let err = CliError::NoSuchItem { index: 4, len: 2 };
        assert_eq!(err.to_string(), "no item 4 (list has 2)");
        assert_eq!(err.exit_code(), 1);

        let err: CliError = tickbox_core::ConfigError::MissingAttachPoint.into();
        assert_eq!(err.to_string(), "attachPoint must be defined");
        assert_eq!(CliError::rejected("nope").to_string(), "nope");
    }
}
