use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("expected the last two octets of the camera address, e.g. 0.212 (got {0:?})")]
    InvalidOctets(String),
    #[error("camera source is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}
