use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("no tokio runtime available to schedule background cache work")]
    NoRuntime,
}
