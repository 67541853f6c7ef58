use thiserror::Error;

#[derive(Error, Debug)]
pub enum BittorrentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Connection failed: {0}")]
    ConnectError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tracker failure: {0}")]
    TrackerFailure(String),

    #[error("Piece verification failed: {0}")]
    PieceHashMismatch(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<url::ParseError> for BittorrentError {
    fn from(err: url::ParseError) -> Self {
        BittorrentError::InvalidArgument(format!("invalid URL: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for BittorrentError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        BittorrentError::IoError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "operation timed out",
        ))
    }
}

pub type Result<T> = std::result::Result<T, BittorrentError>;
