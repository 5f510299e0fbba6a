use thiserror::Error;

pub type PostboxResult<T> = Result<T, PostboxError>;

#[derive(Error, Debug)]
pub enum PostboxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<config::ConfigError> for PostboxError {
    fn from(err: config::ConfigError) -> Self {
        PostboxError::Config(err.to_string())
    }
}
