// Store failure taxonomy
//
// Every remote-store failure is classified exactly once, at the point where
// it reaches the sync layer. Classification depends on the HTTP-like status,
// the message, and which operation failed.

use thiserror::Error;

/// Which store operation a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    ListTopics,
    ReadHeader,
    ReadEvents,
    AppendRow,
    DeleteRow,
    CreateTopic,
}

impl StoreOp {
    /// Header and event reads are the only operations where an
    /// out-of-bounds range is expected for a fresh topic.
    fn is_range_read(self) -> bool {
        matches!(self, StoreOp::ReadHeader | StoreOp::ReadEvents)
    }
}

/// A failed remote call, carrying whatever the transport could recover.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    /// HTTP-like status code, None for transport-level failures.
    pub status: Option<u16>,
    /// Message extracted from the store's error body, or the raw transport
    /// error text.
    pub message: String,
}

impl StoreError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Transport failure with no HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

/// Failure classes, in classification priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// 401/403: the session is no longer valid; forces sign-out.
    AuthExpired,
    /// 404 on the topic list: bad store identifier; session untouched.
    StoreNotFound,
    /// Empty/new sheet read as an out-of-bounds range; treated as "no data
    /// yet" and never surfaced.
    EmptyRangeBenign,
    /// Everything else; message surfaced verbatim, session untouched.
    Other(String),
}

/// Classify a failed store call.
pub fn classify(err: &StoreError, op: StoreOp) -> ErrorClass {
    match err.status {
        Some(401) | Some(403) => ErrorClass::AuthExpired,
        Some(404) if op == StoreOp::ListTopics => ErrorClass::StoreNotFound,
        Some(400)
            if op.is_range_read()
                && (err.message.contains("Unable to parse range")
                    || err.message.contains("exceeds grid limits")) =>
        {
            ErrorClass::EmptyRangeBenign
        }
        _ => ErrorClass::Other(err.message.clone()),
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
