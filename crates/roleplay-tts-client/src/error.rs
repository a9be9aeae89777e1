use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("playback rejected: {0}")]
    Playback(String),

    #[error("no voice mapping: {0}")]
    Configuration(String),
}
