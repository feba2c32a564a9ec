use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArmatureError>;

#[derive(Debug, Error)]
pub enum ArmatureError {
    #[error("Dependency not found: {type_name}")]
    DependencyNotFound { type_name: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArmatureError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ArmatureError {
    fn from(err: serde_json::Error) -> Self {
        ArmatureError::invalid_config(err.to_string())
    }
}
