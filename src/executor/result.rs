//! Outcome of a timed lock invocation.

/// Result of `with_lock_timeout`: either the lock was acquired and the
/// operation's value is present, or the wait timed out and nothing ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedOperationResult<T> {
    pub timed_out: bool,
    pub result: Option<T>,
}

impl<T> DistributedOperationResult<T> {
    pub fn completed(value: T) -> Self {
        Self {
            timed_out: false,
            result: Some(value),
        }
    }

    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            result: None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// The operation's value, or `None` if the wait timed out.
    pub fn into_result(self) -> Option<T> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_carries_value() {
        let outcome = DistributedOperationResult::completed("success");
        assert!(!outcome.is_timed_out());
        assert_eq!(outcome.into_result(), Some("success"));
    }

    #[test]
    fn timeout_carries_nothing() {
        let outcome: DistributedOperationResult<u32> = DistributedOperationResult::timeout();
        assert!(outcome.is_timed_out());
        assert_eq!(outcome.into_result(), None);
    }
}
