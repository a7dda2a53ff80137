//! Call Context
//!
//! Per-call caller data: tier, cancellation and deadline. The gateway races
//! every network call against both signals so an abandoned call stops promptly.

use crate::config::Tier;
use crate::error::GatewayError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Sender side of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every call holding a token from this handle
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A linked handle/token pair
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is dropped first
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Why a call stopped without a provider outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    Cancelled,
    DeadlineExceeded,
}

impl From<Abort> for GatewayError {
    fn from(abort: Abort) -> Self {
        match abort {
            Abort::Cancelled => GatewayError::Cancelled,
            Abort::DeadlineExceeded => GatewayError::DeadlineExceeded,
        }
    }
}

/// Caller-supplied parameters of one gateway call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub tier: Tier,
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            cancel: None,
            deadline: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now; a timeout past the clock's range sets none
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Check both signals without waiting
    pub fn check(&self) -> Result<(), Abort> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Abort::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Abort::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` unless cancellation or the deadline fires first
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Abort> {
        self.check()?;

        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => {
                    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            output = fut => Ok(output),
            _ = cancelled => Err(Abort::Cancelled),
            _ = expired => Err(Abort::DeadlineExceeded),
        }
    }
}
