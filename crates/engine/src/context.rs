//! Cancellation and deadline shared by every remote call of a sync pass.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::EngineError;

/// A cancellation signal plus an optional deadline.
///
/// Cloning a `Context` shares the same signal: cancelling any clone cancels
/// all of them.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a context that expires `timeout` from now, sharing the
    /// cancellation signal of `self`. An earlier existing deadline is kept.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(match self.deadline {
                Some(current) if current < deadline => current,
                _ => deadline,
            }),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the context is cancelled or its deadline passed.
    pub async fn done(&self) -> EngineError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => EngineError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => EngineError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                EngineError::Cancelled
            }
        }
    }

    /// Runs `fut` until it completes, the context is cancelled or the
    /// deadline passes, whichever comes first.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<EngineError>,
    {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res.map_err(Into::into),
        }
    }
}
