use thiserror::Error;

pub type Result<T> = std::result::Result<T, ViewerError>;

/// Failures surfaced by the viewer engine.
///
/// `Transport` and `Backend` are whole-operation failures and end up in the store's error
/// status. `Protocol` and `Invariant` are local to a single message or delta: they are logged
/// and the offending input is dropped.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("link {source_id} -[{kind}]-> {target_id} references a missing node")]
    Invariant {
        source_id: String,
        target_id: String,
        kind: String,
    },

    #[error("export failed: {0}")]
    Export(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ViewerError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ViewerError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(error.to_string())
    }
}
