use std::future::Future;

use crate::error::RepResult;

/// A trait for types that can be started as workers.
///
/// The generic parameter `H` represents the handle type that will be returned when the worker starts,
/// and `S` represents the state type that can be accessed through the handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type.
    type Error;

    /// Starts the worker and returns a future that resolves to its handle.
    ///
    /// The worker runs in the background once started, the handle can be used to observe it and
    /// to wait for its completion.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// A handle to a running worker that provides access to its state and completion status.
///
/// The generic parameter `S` represents the type of state that can be accessed through this handle.
pub trait WorkerHandle<S> {
    /// Returns the current state of the worker.
    ///
    /// The state outlives the worker, reading it after the worker exited returns the last state
    /// the worker reached.
    fn state(&self) -> S;

    /// Returns a future that resolves when the worker completes.
    ///
    /// The future resolves to the error returned by the worker, or to a
    /// [`crate::error::ErrorKind::WorkerPanic`] error if the worker panicked.
    fn wait(self) -> impl Future<Output = RepResult<()>> + Send;
}
