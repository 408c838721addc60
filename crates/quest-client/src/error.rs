use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered 401. The local session has been cleared.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{status} {error}: {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },

    #[error("not signed in")]
    NoSession,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
