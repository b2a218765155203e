/// Unified error type for the VLIW470 scheduler pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("schedule error: {message}")]
    Schedule { message: String },

    #[error("register renaming error: {message}")]
    Rename { message: String },

    #[error("internal invariant violation: {message}")]
    Internal { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse { message: message.into() }
    }

    pub fn schedule(message: impl Into<String>) -> Self {
        Error::Schedule { message: message.into() }
    }

    pub fn rename(message: impl Into<String>) -> Self {
        Error::Rename { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
