//! RPC status codes used to signal injected faults.
//!
//! A denied operation surfaces as [`Code::Unavailable`] with an empty
//! message, which is exactly what a caller would see from a genuine
//! service outage. This layer never wraps or retries a status.

use std::fmt;

/// The subset of RPC status codes this layer raises or forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Cancelled,
    Unknown,
    DeadlineExceeded,
    Internal,
    Unavailable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::Cancelled => "cancelled",
            Code::Unknown => "unknown",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// An RPC status, carried as the error side of every call operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rpc status {code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The status an injected fault raises. Injected denials use an
    /// empty message so they are indistinguishable from a real outage.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_has_empty_message() {
        let status = Status::unavailable("");
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "");
    }

    #[test]
    fn test_display() {
        let status = Status::deadline_exceeded("too slow");
        assert_eq!(status.to_string(), "rpc status deadline_exceeded: too slow");
    }
}
