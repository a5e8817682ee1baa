use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum ButlerError {
    #[error("configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ButlerError>;

/// How reading a single request off a connection can fail. `NoData` is the
/// normal end of a kept-alive connection, not a fault.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no data received")]
    NoData,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}
