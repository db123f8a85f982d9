// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the memcached UDP client.
//!
//! Every call that awaits a reply surfaces its failure through its own
//! [`Response`](crate::Response) handle; one call's error never touches
//! another pending call. Quiet calls have no handle, so their failures are
//! only logged.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Operation` | No | Server answered with a non-zero status |
//! | `Timeout` | Yes | No reply within the configured window |
//! | `UnsupportedResponse` | No | Reply for an opcode the client cannot decode |
//! | `MalformedResponse` | Yes | Truncated or inconsistent datagram |
//! | `Bind` | No | Local UDP socket could not be bound (build time) |
//! | `Config` | No | Topology or builder input invalid (build time) |
//! | `InvalidKey` | No | Key empty or longer than the server accepts |
//! | `PacketTooLarge` | No | Request does not fit one datagram |
//! | `TooManyPending` | Yes | Every correlation id is in flight |
//! | `Shutdown` | No | Client reactor has stopped |

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server replied with a non-zero status.
    #[error("operation failed: {0}")]
    Operation(#[from] OperationError),

    /// No reply arrived within the call timeout.
    #[error("timed out after {after:?} waiting for opcode {opcode:#04x}")]
    Timeout { opcode: u8, after: Duration },

    /// A reply arrived for an opcode the client does not know how to interpret.
    #[error("unsupported operation in response: {opcode:#04x}")]
    UnsupportedResponse { opcode: u8 },

    /// The reply datagram was truncated or its lengths are inconsistent.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The local UDP socket could not be bound. Fatal at build time.
    #[error("failed to bind UDP socket on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Builder or topology input is invalid. Fatal at build time.
    #[error("configuration error: {0}")]
    Config(String),

    /// Key is empty or exceeds the server's key length limit.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Encoded request does not fit a single UDP datagram.
    #[error("packet too large: {size} bytes, max {max} bytes")]
    PacketTooLarge { size: usize, max: usize },

    /// Every correlation id is currently pending.
    #[error("too many pending requests, no free correlation id")]
    TooManyPending,

    /// The client has been shut down.
    #[error("client is shut down")]
    Shutdown,
}

impl ClientError {
    /// Check if the same call could succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true, // datagram lost or mirror slow
            Self::MalformedResponse(_) => true,
            Self::TooManyPending => true,
            Self::Operation(_) => false, // the server gave a definite answer
            Self::UnsupportedResponse { .. } => false,
            Self::Bind { .. } => false,
            Self::Config(_) => false,
            Self::InvalidKey(_) => false,
            Self::PacketTooLarge { .. } => false,
            Self::Shutdown => false,
        }
    }

    /// Status category if this is a server-side error.
    pub fn status_category(&self) -> Option<StatusCategory> {
        match self {
            Self::Operation(e) => Some(e.category()),
            _ => None,
        }
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Operation(_) => "operation",
            Self::Timeout { .. } => "timeout",
            Self::UnsupportedResponse { .. } => "unsupported_response",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Bind { .. } => "bind",
            Self::Config(_) => "config",
            Self::InvalidKey(_) => "invalid_key",
            Self::PacketTooLarge { .. } => "packet_too_large",
            Self::TooManyPending => "too_many_pending",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Category derived from a response status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    KeyNotFound,
    KeyExists,
    ValueTooLarge,
    InvalidArguments,
    NotStored,
    NonNumericValue,
    UnknownCommand,
    OutOfMemory,
    /// Any status the protocol does not define.
    Unknown(u16),
}

impl StatusCategory {
    /// Map a wire status to its category.
    pub fn from_status(status: u16) -> Self {
        match status {
            0x01 => Self::KeyNotFound,
            0x02 => Self::KeyExists,
            0x03 => Self::ValueTooLarge,
            0x04 => Self::InvalidArguments,
            0x05 => Self::NotStored,
            0x06 => Self::NonNumericValue,
            0x81 => Self::UnknownCommand,
            0x82 => Self::OutOfMemory,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound => write!(f, "Key not found"),
            Self::KeyExists => write!(f, "Key exists"),
            Self::ValueTooLarge => write!(f, "Value too large"),
            Self::InvalidArguments => write!(f, "Invalid arguments"),
            Self::NotStored => write!(f, "Item not stored"),
            Self::NonNumericValue => write!(f, "Incr/Decr on non-numeric value"),
            Self::UnknownCommand => write!(f, "Unknown command"),
            Self::OutOfMemory => write!(f, "Out of memory"),
            Self::Unknown(status) => write!(f, "Unknown status {}", status),
        }
    }
}

/// A non-zero status returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationError {
    status: u16,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {:#04x})", self.category(), self.status)
    }
}

impl std::error::Error for OperationError {}

impl OperationError {
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    /// Raw wire status.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn category(&self) -> StatusCategory {
        StatusCategory::from_status(self.status)
    }
}
