//! One-shot completion signal for asynchronous pool phases

use crate::errors::{PoolError, PoolResult};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Fires once when pool population or teardown has finished
///
/// Returned by [`Pool::init`](crate::Pool::init) and
/// [`Pool::close`](crate::Pool::close). Every wait method consumes the
/// signal, so it is observed exactly once.
#[must_use = "a completion signal does nothing unless waited on"]
#[derive(Debug)]
pub struct Completion {
    done: Receiver<()>,
}

/// Sending half, held by whoever finishes the phase
#[derive(Debug)]
pub(crate) struct Completer {
    done: Sender<()>,
}

impl Completion {
    pub(crate) fn pair() -> (Completer, Completion) {
        let (tx, rx) = channel::bounded(1);
        (Completer { done: tx }, Completion { done: rx })
    }

    /// A signal that has already fired
    pub(crate) fn ready() -> Self {
        let (completer, completion) = Self::pair();
        completer.complete();
        completion
    }

    /// A signal for a phase that will never finish
    pub(crate) fn cancelled() -> Self {
        let (_, completion) = Self::pair();
        completion
    }

    /// Block until the phase finishes
    ///
    /// Returns [`PoolError::Cancelled`] when the phase was abandoned, for
    /// example because the pool was closed during population.
    pub fn wait(self) -> PoolResult<()> {
        self.done.recv().map_err(|_| PoolError::Cancelled)
    }

    /// Block for at most `timeout`
    pub fn wait_timeout(self, timeout: Duration) -> PoolResult<()> {
        match self.done.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(PoolError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::Cancelled),
        }
    }

    /// Wait from async code without stalling the runtime
    pub async fn wait_async(self) -> PoolResult<()> {
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .map_err(|_| PoolError::Cancelled)?
    }
}

impl Completer {
    pub(crate) fn complete(self) {
        // The waiter may have dropped its half already
        let _ = self.done.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ready_fires_immediately() {
        assert!(Completion::ready().wait().is_ok());
    }

    #[test]
    fn test_dropped_completer_cancels() {
        let (completer, completion) = Completion::pair();
        drop(completer);
        assert!(matches!(completion.wait(), Err(PoolError::Cancelled)));
    }

    #[test]
    fn test_cancelled_never_fires() {
        let err = Completion::cancelled()
            .wait_timeout(Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, PoolError::Cancelled));
    }

    #[test]
    fn test_wait_timeout() {
        let (_completer, completion) = Completion::pair();
        let err = completion.wait_timeout(Duration::from_millis(5)).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_completes_from_other_thread() {
        let (completer, completion) = Completion::pair();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            completer.complete();
        });
        assert!(completion.wait_timeout(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_wait_async() {
        let (completer, completion) = Completion::pair();
        completer.complete();
        assert!(completion.wait_async().await.is_ok());
    }
}
