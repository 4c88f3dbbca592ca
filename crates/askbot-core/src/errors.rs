/// Core error type for the usage tracker.
///
/// Quota denial and empty history are normal outcomes and never surface here;
/// this enum covers configuration problems and storage failures only, so
/// callers can tell a transient disk error apart from a rejected request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
