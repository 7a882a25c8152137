use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServoMaskError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Storage error on '{key}': {message}")]
    StorageError { key: String, message: String },

    #[error("Storage namespace '{namespace}' is open read-only")]
    ReadOnlySessionError { namespace: String },

    #[error("Actuator error on channel {channel}: {message}")]
    ActuatorError { channel: usize, message: String },

    #[error("{kind} index {index} out of range (0..{limit})")]
    IndexOutOfRangeError {
        kind: &'static str,
        index: i64,
        limit: usize,
    },

    #[error("Channel error: {message}")]
    ChannelError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Actuator,
    Protocol,
    Transport,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ServoMaskError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::StorageError { .. } | Self::ReadOnlySessionError { .. } => ErrorCategory::Storage,
            Self::ActuatorError { .. } => ErrorCategory::Actuator,
            Self::IndexOutOfRangeError { .. } => ErrorCategory::Protocol,
            Self::ChannelError { .. } => ErrorCategory::Transport,
            Self::IoError(_) | Self::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Protocol => ErrorSeverity::Low,
            ErrorCategory::Storage | ErrorCategory::Actuator => ErrorSeverity::Medium,
            ErrorCategory::Transport | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the settings file and command line arguments",
            ErrorCategory::Storage => {
                "The in-memory configuration is kept; the next change will be saved again"
            }
            ErrorCategory::Actuator => "Check servo wiring and power supply",
            ErrorCategory::Protocol => "Send GET_CONFIG to inspect the current configuration",
            ErrorCategory::Transport => "Reconnect to the device",
            ErrorCategory::System => "Check file permissions and available disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            Self::StorageError { .. } | Self::ReadOnlySessionError { .. } => {
                "Could not save the servo configuration".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServoMaskError>;
