use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Domain errors. HTTP status mapping lives next to the router in
/// `server.rs`; the worker handles `Provider` per task and treats
/// `Transport` as fatal for the current message (requeue).
#[derive(Debug, Error)]
pub enum Error {
    /// Language pair failed validation (unknown code, inactive, or
    /// source == target).
    #[error("{0}")]
    InvalidLanguage(String),

    /// Source language has no translatable records; nothing was created.
    #[error("no translations found for the source language")]
    NoWorkAvailable,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Operation not allowed in the record's current lifecycle state.
    #[error("{0}")]
    InvalidState(String),

    /// The external translation provider rejected or failed a call.
    /// Per-task: the worker counts these and keeps going.
    #[error("translation provider error: {0}")]
    Provider(String),

    /// Request payload failed validation.
    #[error("{0}")]
    Validation(String),

    /// Store or queue is unavailable or misbehaving.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
