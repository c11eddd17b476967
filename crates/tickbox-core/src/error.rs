#![forbid(unsafe_code)]

use thiserror::Error;
use tickbox_reactive::ReactiveError;

use crate::config::ConfigError;
use crate::persist::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stored snapshot under `{key}` is not valid: {source}")]
    Snapshot {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Reactive(#[from] ReactiveError),
}

impl Error {
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
