// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Run-wide cancellation signal.
//!
//! Fired by an operator interrupt or a whole-run deadline. Every poll loop
//! checks it at its boundary and waits on it while sleeping, so a cancelled
//! iteration still reaches the teardown path.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{EvalError, EvalResult};

/// Sending half: fires cancellation for every clone of the paired signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with no live receivers.
        self.tx.send_replace(true);
    }
}

/// Receiving half observed by the orchestrator and its components.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a connected handle/signal pair.
    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> CancelSignal {
        let (_, signal) = Self::channel();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means every handle was dropped without firing.
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Fail with `Cancelled` if the signal has fired.
    pub fn check(&self, stage: &'static str) -> EvalResult<()> {
        if self.is_cancelled() {
            return Err(EvalError::Cancelled { stage });
        }
        Ok(())
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration, stage: &'static str) -> EvalResult<()> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(EvalError::Cancelled { stage }),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Drive `future` to completion unless cancelled first.
    pub async fn run<F, T>(&self, stage: &'static str, future: F) -> EvalResult<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(EvalError::Cancelled { stage }),
            out = future => Ok(out),
        }
    }
}
