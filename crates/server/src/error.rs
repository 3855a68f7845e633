#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("session coordinator is not running")]
    SessionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}
