use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

impl TsError {
    /// True for errors the caller can fix by retrying with different input.
    pub fn is_config(&self) -> bool {
        matches!(self, TsError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, TsError>;
