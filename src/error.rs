use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("model protocol: {0}")]
    ModelProtocol(String),
    #[error("model transport: {0}")]
    Transport(String),
    #[error("safety check rejected: {0}")]
    SafetyCheckRejected(String),
    #[error("blocked url: {0}")]
    BlockedUrl(String),
    #[error("computer error: {0}")]
    Computer(String),
    #[error("history rewrite: {0}")]
    History(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
