//! Error types for bus vocabulary parsing

use thiserror::Error;

/// Errors that can occur while parsing names typed by a user or read from settings
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Unknown bus protocol name
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// Unknown ECU kind
    #[error("unknown node kind: {0}")]
    UnknownNodeKind(String),

    /// Unknown message priority
    #[error("unknown priority: {0}")]
    UnknownPriority(String),

    /// Unknown node status
    #[error("unknown node status: {0}")]
    UnknownStatus(String),

    /// Unknown fault type
    #[error("unknown fault type: {0}")]
    UnknownFaultType(String),

    /// Unknown fault severity
    #[error("unknown severity: {0}")]
    UnknownSeverity(String),

    /// Arbitration id that is not a hexadecimal number
    #[error("invalid arbitration id: {0}")]
    InvalidArbitrationId(String),
}
