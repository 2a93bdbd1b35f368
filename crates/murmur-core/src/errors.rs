//! Unified error type for murmur operations
//!
//! Every failure a caller or a transport can observe maps onto one variant of
//! [`MurmurError`]. Remote input only ever produces `Decode`; local misuse
//! produces `Validation`, `NotFound`, `AlreadyEnded`, `Superseded` or
//! `NotRegistered`.

use crate::silence::SilenceId;
use chrono::{DateTime, Utc};

/// Stable, machine-readable error codes for logging and metrics labels.
pub trait ErrorCode {
    /// Short snake_case identifier for the error kind.
    fn code(&self) -> &'static str;
}

/// Unified error type for all murmur operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MurmurError {
    /// A gossip payload could not be decoded
    #[error("Decode error: {message}")]
    Decode {
        /// Description of what was malformed
        message: String,
    },

    /// Local state could not be serialized for the wire
    #[error("Encode error: {message}")]
    Encode {
        /// Description of the serialization failure
        message: String,
    },

    /// No silence with the requested id is stored
    #[error("Silence not found: {id}")]
    NotFound {
        /// The id that was looked up
        id: SilenceId,
    },

    /// The silence has already ended and cannot be deleted again
    #[error("Silence {id} already ended at {ends_at}")]
    AlreadyEnded {
        /// The silence that was targeted
        id: SilenceId,
        /// When it ended
        ends_at: DateTime<Utc>,
    },

    /// A local write lost to a newer version already stored
    #[error("Silence {id} was superseded by a newer version")]
    Superseded {
        /// The silence that was written
        id: SilenceId,
    },

    /// A silence record failed validation
    #[error("Invalid silence: {message}")]
    Validation {
        /// What was wrong with the record
        message: String,
    },

    /// A write was attempted before a transport was registered
    #[error("No transport registered for channel {channel}")]
    NotRegistered {
        /// The gossip channel missing its transport
        channel: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },
}

impl MurmurError {
    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(id: SilenceId) -> Self {
        Self::NotFound { id }
    }

    /// Create an already ended error
    pub fn already_ended(id: SilenceId, ends_at: DateTime<Utc>) -> Self {
        Self::AlreadyEnded { id, ends_at }
    }

    /// Create a superseded error
    pub fn superseded(id: SilenceId) -> Self {
        Self::Superseded { id }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not registered error
    pub fn not_registered(channel: impl Into<String>) -> Self {
        Self::NotRegistered {
            channel: channel.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error was caused by input received from a peer.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

impl ErrorCode for MurmurError {
    fn code(&self) -> &'static str {
        match self {
            MurmurError::Decode { .. } => "decode",
            MurmurError::Encode { .. } => "encode",
            MurmurError::NotFound { .. } => "not_found",
            MurmurError::AlreadyEnded { .. } => "already_ended",
            MurmurError::Superseded { .. } => "superseded",
            MurmurError::Validation { .. } => "validation",
            MurmurError::NotRegistered { .. } => "not_registered",
            MurmurError::Config { .. } => "config",
        }
    }
}

/// Standard Result type for murmur operations
pub type Result<T> = std::result::Result<T, MurmurError>;
