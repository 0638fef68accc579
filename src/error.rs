use crate::domain::models::PeripheralError;
use thiserror::Error;

/// Failure to turn payload bytes into a typed value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("{what}: empty payload")]
    Empty { what: &'static str },

    #[error("{what}: expected at least {expected} bytes, got {actual}")]
    TooShort {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: unknown value {value:#04x}")]
    UnknownValue { what: &'static str, value: u8 },

    #[error("{what}: payload is not valid UTF-8")]
    InvalidText { what: &'static str },

    #[error("option {name}: unsupported value {value}")]
    InvalidOptionValue { name: &'static str, value: String },
}

/// Broad classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CallerMisuse,
    Transport,
    Protocol,
    Peripheral,
}

/// Error type shared by the scanner, sessions, codecs and command objects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThetaBleError {
    #[error("not connected: {operation} requires a connected session")]
    NotConnected { operation: &'static str },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("transport error during {operation}: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("peripheral reported error: {0}")]
    Peripheral(PeripheralError),
}

impl ThetaBleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConnected { .. }
            | Self::InvalidState(_)
            | Self::InvalidArgument(_)
            | Self::Unsupported(_) => ErrorKind::CallerMisuse,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Peripheral(_) => ErrorKind::Peripheral,
        }
    }

    /// Wrap an adapter failure, keeping the whole `anyhow` context chain.
    pub fn transport(operation: &'static str, err: anyhow::Error) -> Self {
        Self::Transport {
            operation,
            message: format!("{err:#}"),
        }
    }
}

pub type Result<T, E = ThetaBleError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThetaBleError::NotConnected { operation: "read" };
        assert_eq!(
            err.to_string(),
            "not connected: read requires a connected session"
        );

        let err = ThetaBleError::Protocol(ProtocolError::TooShort {
            what: "plugin orders",
            expected: 3,
            actual: 2,
        });
        assert_eq!(
            err.to_string(),
            "protocol error: plugin orders: expected at least 3 bytes, got 2"
        );

        let err = ProtocolError::UnknownValue {
            what: "camera power",
            value: 0x7f,
        };
        assert_eq!(err.to_string(), "camera power: unknown value 0x7f");
    }

    #[test]
    fn test_transport_keeps_context_chain() {
        let cause = anyhow::anyhow!("gatt status 0x85").context("write failed");
        let err = ThetaBleError::transport("write", cause);
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(
            err.to_string(),
            "transport error during write: write failed: gatt status 0x85"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            ThetaBleError::InvalidState("x".into()).kind(),
            ErrorKind::CallerMisuse
        );
        assert_eq!(
            ThetaBleError::from(ProtocolError::Empty { what: "x" }).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            ThetaBleError::Peripheral(PeripheralError::new("busy", "camera busy")).kind(),
            ErrorKind::Peripheral
        );
    }
}
