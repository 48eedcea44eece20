//! The unit of work guarded by the executor.

/// A caller-supplied operation run while the lock is held.
///
/// The executor runs it exactly once, does not inspect its output and never
/// retries it. Any `FnOnce() -> Result<T, E>` closure is an operation.
pub trait DistributedOperation {
    type Output;
    type Error;

    fn execute(self) -> Result<Self::Output, Self::Error>;
}

impl<F, T, E> DistributedOperation for F
where
    F: FnOnce() -> Result<T, E>,
{
    type Output = T;
    type Error = E;

    fn execute(self) -> Result<T, E> {
        self()
    }
}
