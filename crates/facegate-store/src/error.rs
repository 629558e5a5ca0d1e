use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("unknown storage mode {0:?} (expected \"database\" or \"file\")")]
    UnknownMode(String),
}

impl StoreError {
    /// Whether the failure was a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Http(e) if e.is_timeout())
    }
}
