use feedloom_common::Platform;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("No credential configured for {0}")]
    MissingCredential(Platform),

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Credential is not a valid header value")]
    InvalidCredential(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
