use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::ScanStatus;

/// Stable failure codes surfaced to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanErrorCode {
    NoFoodDetected,
    ApiError,
    PermissionDenied,
    ImageTooLarge,
    NetworkError,
}

impl ScanErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanErrorCode::NoFoodDetected => "NO_FOOD_DETECTED",
            ScanErrorCode::ApiError => "API_ERROR",
            ScanErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ScanErrorCode::ImageTooLarge => "IMAGE_TOO_LARGE",
            ScanErrorCode::NetworkError => "NETWORK_ERROR",
        }
    }
}

/// Errors that can end a scan or a model call
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanError {
    /// The model saw no edible content in the image(s)
    #[error("No food detected: {message}")]
    NoFoodDetected { message: String },

    /// Provider failure, rejected model output or failed validation
    #[error("API error: {message}")]
    ApiError { message: String, recoverable: bool },

    /// Camera or photo library permission was refused
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Prepared image still exceeds the upload ceiling
    #[error("Image too large: {size_bytes} bytes exceeds the {max_bytes} byte limit")]
    ImageTooLarge { size_bytes: u64, max_bytes: u64 },

    /// Connection failure or deadline exceeded
    #[error("Network error: {message}")]
    NetworkError { message: String },
}

impl ScanError {
    /// A recoverable API error, i.e. worth regenerating
    pub fn api(message: impl Into<String>) -> Self {
        ScanError::ApiError {
            message: message.into(),
            recoverable: true,
        }
    }

    /// A structurally broken payload that should not be retried verbatim
    pub fn malformed(message: impl Into<String>) -> Self {
        ScanError::ApiError {
            message: message.into(),
            recoverable: false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        ScanError::NetworkError {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ScanErrorCode {
        match self {
            ScanError::NoFoodDetected { .. } => ScanErrorCode::NoFoodDetected,
            ScanError::ApiError { .. } => ScanErrorCode::ApiError,
            ScanError::PermissionDenied { .. } => ScanErrorCode::PermissionDenied,
            ScanError::ImageTooLarge { .. } => ScanErrorCode::ImageTooLarge,
            ScanError::NetworkError { .. } => ScanErrorCode::NetworkError,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            ScanError::ApiError { recoverable, .. } => *recoverable,
            _ => true,
        }
    }

    /// Actionable guidance to show next to the retry affordance
    pub fn user_message(&self) -> &'static str {
        match self.code() {
            ScanErrorCode::NoFoodDetected => "We couldn't identify any food ingredients in this image. Please try:\n• Better lighting\n• Clearer focus\n• Closer to the ingredients",
            ScanErrorCode::ApiError => "Unable to connect to our recipe generation service. Please check your internet connection and try again.",
            ScanErrorCode::PermissionDenied => "Camera permission is required to capture ingredient photos. Please enable it in your device settings.",
            ScanErrorCode::ImageTooLarge => "The image file is too large. Please try a different photo or reduce the image quality.",
            ScanErrorCode::NetworkError => "Network connection lost. Please check your internet and try again.",
        }
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ScanError::network(err.to_string())
        } else {
            ScanError::api(err.to_string())
        }
    }
}

/// Errors raised by the key-value store and the repositories on top of it
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize collection: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("No record with id '{0}'")]
    NotFound(String),
}

/// Top-level error for the service API
#[derive(Error, Debug)]
pub enum ChefError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Provider could not be constructed from configuration
    #[error("Provider error: {0}")]
    Provider(String),

    /// Builder configuration error
    #[error("Builder error: {0}")]
    Builder(String),

    /// No session was started before a session operation
    #[error("No active scan session")]
    NoActiveSession,

    /// The session already left `capturing`: it is being generated or has
    /// finished
    #[error("Scan session {id} is {status:?}, not awaiting confirmation")]
    SessionNotReady { id: String, status: ScanStatus },

    /// The session was reset or replaced while this call was in flight;
    /// its result was discarded
    #[error("Scan session {0} was replaced before it finished")]
    SessionReplaced(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_as_screaming_snake_case() {
        let err = ScanError::NoFoodDetected {
            message: "none".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NO_FOOD_DETECTED");
        assert_eq!(err.code().as_str(), "NO_FOOD_DETECTED");
    }

    #[test]
    fn test_recoverability() {
        assert!(ScanError::api("boom").is_recoverable());
        assert!(!ScanError::malformed("bad json").is_recoverable());
        assert!(ScanError::network("down").is_recoverable());
        assert!(ScanError::ImageTooLarge {
            size_bytes: 10,
            max_bytes: 5
        }
        .is_recoverable());
    }

    #[test]
    fn test_user_message_is_actionable() {
        let err = ScanError::PermissionDenied {
            message: "camera".to_string(),
        };
        assert!(err.user_message().contains("settings"));
    }
}
