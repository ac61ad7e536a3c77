//! Error types for queue operations

use core::fmt;

/// A rejected `push`. The payload comes back to the caller so the work can
/// be refused cleanly (for a connection descriptor: close the socket).
pub enum PushError<T> {
    /// The queue was closed before the push.
    Closed(T),

    /// The queue's storage could not grow to hold the item. Queue state is
    /// untouched; nothing was enqueued and no consumer was signaled.
    AllocFailed(T),
}

impl<T> PushError<T> {
    /// Recover the item that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Closed(item) => item,
            PushError::AllocFailed(item) => item,
        }
    }
}

// Manual impls keep `T: Debug` off the API; the payload itself is not
// interesting for error reporting.
impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Closed(_) => write!(f, "Closed(..)"),
            PushError::AllocFailed(_) => write!(f, "AllocFailed(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Closed(_) => write!(f, "queue closed"),
            PushError::AllocFailed(_) => write!(f, "queue allocation failed"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Returned by `pop` once the queue is closed and drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue closed")
    }
}

impl std::error::Error for QueueClosed {}

/// Returned by `try_pop` when no item is immediately available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryPopError {
    /// The queue is empty (but still open).
    Empty,

    /// The queue is closed and drained.
    Closed,
}

impl fmt::Display for TryPopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPopError::Empty => write!(f, "queue empty"),
            TryPopError::Closed => write!(f, "queue closed"),
        }
    }
}

impl std::error::Error for TryPopError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_error_returns_payload() {
        let err: PushError<i32> = PushError::Closed(5);
        assert_eq!(err.into_inner(), 5);

        let err: PushError<i32> = PushError::AllocFailed(7);
        assert_eq!(err.into_inner(), 7);
    }

    #[test]
    fn test_display() {
        assert_eq!(QueueClosed.to_string(), "queue closed");
        assert_eq!(TryPopError::Empty.to_string(), "queue empty");
        assert_eq!(PushError::Closed(0u8).to_string(), "queue closed");
    }
}
