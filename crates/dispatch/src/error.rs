//! Error types for dispatch operations.
//!
//! Connector errors are categorized so the worker can decide whether an
//! attempt is worth repeating. Validation errors reject a run before any
//! device is contacted. Engine faults are the only failures that escape a run
//! once it has started.

use thiserror::Error;

/// Categories of connector errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorErrorKind {
    /// Connection refused, reset, unreachable, DNS failure (transient)
    Network,
    /// Device or management API temporarily overloaded (transient)
    Busy,
    /// Credentials rejected
    Authentication,
    /// Device refused the payload
    Rejected,
    /// Unexpected response shape
    Protocol,
    /// The connector stopped because the run was cancelled
    Cancelled,
    /// Other/unknown errors
    Other,
}

impl ConnectorErrorKind {
    /// Whether this category is typically transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Busy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Busy => "busy",
            Self::Authentication => "authentication",
            Self::Rejected => "rejected",
            Self::Protocol => "protocol",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Device unreachable",
            Self::Busy => "Device busy",
            Self::Authentication => "Authentication failed",
            Self::Rejected => "Payload rejected by device",
            Self::Protocol => "Unexpected device response",
            Self::Cancelled => "Cancelled",
            Self::Other => "Unexpected error",
        }
    }
}

impl std::fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a [`Connector`](crate::Connector) for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct ConnectorError {
    /// Error category
    pub kind: ConnectorErrorKind,
    /// Detail from the transport
    pub message: String,
}

impl ConnectorError {
    pub fn new(kind: ConnectorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Network, message)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Busy, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Authentication, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Rejected, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Protocol, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Cancelled, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Other, message)
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Categories of request validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    EmptyDeviceList,
    DuplicateDevice,
    BlankDeviceId,
    InvalidConfig,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyDeviceList => "empty_device_list",
            Self::DuplicateDevice => "duplicate_device",
            Self::BlankDeviceId => "blank_device_id",
            Self::InvalidConfig => "invalid_config",
        }
    }
}

/// A run request that cannot be dispatched. No device has been contacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The device list is empty
    #[error("device list is empty")]
    EmptyDeviceList,

    /// Two devices share an identifier
    #[error("duplicate device id: {id}")]
    DuplicateDevice {
        /// The repeated identifier
        id: String,
    },

    /// A device has an empty or whitespace-only identifier
    #[error("device at position {index} has a blank id")]
    BlankDeviceId {
        /// Position in the request (0-indexed)
        index: usize,
    },

    /// A run option is out of range
    #[error("invalid config: {field} {message}")]
    InvalidConfig {
        /// Name of the offending option
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

impl ValidationError {
    /// Get the error category.
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::EmptyDeviceList => ValidationErrorKind::EmptyDeviceList,
            Self::DuplicateDevice { .. } => ValidationErrorKind::DuplicateDevice,
            Self::BlankDeviceId { .. } => ValidationErrorKind::BlankDeviceId,
            Self::InvalidConfig { .. } => ValidationErrorKind::InvalidConfig,
        }
    }

    pub(crate) fn config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}

/// Errors that prevent a run from producing a report.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was rejected before dispatch
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An internal failure unrelated to any single device
    #[error("engine fault: {0}")]
    Fault(String),
}

impl EngineError {
    /// Whether this is an internal fault rather than a bad request.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
