use thiserror::Error;

/// Failures publishing a [`ResourceStateEvent`](super::ResourceStateEvent).
#[derive(Debug, Error)]
pub enum PublishError {
    /// The distributor needs a tokio runtime and none is running.
    #[error("no async runtime available to deliver the event")]
    NoRuntime,

    #[error("event delivery failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("event endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
}
