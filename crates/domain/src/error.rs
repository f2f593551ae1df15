use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("malformed state key {key:?}: {reason}")]
    MalformedKey { key: String, reason: String },
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    pub fn malformed_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
