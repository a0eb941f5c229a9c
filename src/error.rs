use std::path::PathBuf;

use thiserror::Error;

/// Every way a single VM work dispatch can end in failure.
///
/// The first four variants are raised by the dispatcher itself before any
/// handler runs; the last two carry faults raised while a handler runs.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The job's work-type discriminator is not in the registration table.
    #[error("VM work class {0} is not found")]
    Resolution(String),

    /// The payload could not be decoded into a work item.
    #[error("Unable to deserialize VM work")]
    Deserialization { cmd: String, reason: String },

    /// No handler was registered at all.
    #[error("Invalid startup configuration. no job handler is found")]
    Configuration,

    /// The work item names a handler that is not registered.
    #[error("Unable to find work job handler: {0}")]
    Routing(String),

    /// A handler rejected one of its inputs.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Anything else, including handler panics.
    #[error("Unexpected fault: {0:#}")]
    Unexpected(anyhow::Error),
}

/// Error returned by a [`WorkHandler`](crate::dispatch::WorkHandler).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Caller-supplied data was invalid. Reported without a cause chain.
    #[error("{0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        HandlerError::InvalidParameter(message.into())
    }
}

impl From<HandlerError> for DispatchError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::InvalidParameter(msg) => DispatchError::InvalidParameter(msg),
            HandlerError::Other(err) => DispatchError::Unexpected(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
