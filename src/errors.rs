use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: session expired or invalid")]
    Unauthorized,

    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest_middleware::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("platform error: {0}")]
    Platform(String),
}

impl AppError {
    /// Network-level failures and 5xx/429 responses. Callers may retry these
    /// later; anything else needs user or operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Http(reqwest_middleware::Error::Reqwest(e)) | AppError::Request(e) => {
                e.is_timeout() || e.is_connect() || e.is_request()
            }
            AppError::Http(reqwest_middleware::Error::Middleware(_)) => true,
            AppError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Unauthorized => Some(401),
            AppError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
