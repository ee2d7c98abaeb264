use http::StatusCode;
use thiserror::Error;

/// Errors that are fatal at startup or tear down the server loop
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("bind failed: {0}")]
    Bind(std::io::Error),

    #[error("listing template error: {0}")]
    Template(#[from] tera::Error),
}

pub type Result<T> = std::result::Result<T, ServeError>;

/// Per-request failures. Each is terminal for its connection and never
/// escapes the worker that produced it.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("malformed request line")]
    Protocol,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("resource not found")]
    NotFound,

    #[error("failed to read resource: {0}")]
    Access(#[source] std::io::Error),

    #[error("failed to render listing: {0}")]
    Render(#[source] tera::Error),

    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),
}

impl RequestError {
    /// Response status for this failure; `None` means the connection is
    /// closed without sending anything.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Protocol => Some(StatusCode::BAD_REQUEST),
            RequestError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS),
            RequestError::NotFound => Some(StatusCode::NOT_FOUND),
            RequestError::Access(_) | RequestError::Render(_) => {
                Some(StatusCode::INTERNAL_SERVER_ERROR)
            }
            RequestError::Transport(_) => None,
        }
    }
}
