use super::driver::StoreSession;
use crate::core::{MapperError, Result};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Cooperative cancellation flag shared between a caller and in-flight operations.
///
/// Cancelling never aborts a store call that was already issued; the operation
/// stops at its next check, before the next store call.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<SignalState>,
}

#[derive(Debug, Default)]
struct SignalState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MapperError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-adapter call context: session, cancellation and scope.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    pub(crate) session: Option<StoreSession>,
    pub(crate) cancellation: Option<CancellationSignal>,
    pub(crate) scope: Option<JsonValue>,
}

impl OperationContext {
    pub fn session(&self) -> Option<&StoreSession> {
        self.session.as_ref()
    }

    pub fn cancellation(&self) -> Option<&CancellationSignal> {
        self.cancellation.as_ref()
    }

    pub fn scope(&self) -> Option<&JsonValue> {
        self.scope.as_ref()
    }

    /// Called before every store call.
    pub fn checkpoint(&self) -> Result<()> {
        match &self.cancellation {
            Some(signal) => signal.check(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let signal = CancellationSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        assert!(signal.check().is_ok());
        signal.cancel();
        waiter.await.unwrap();
        assert!(matches!(signal.check(), Err(MapperError::Cancelled)));
    }

    #[test]
    fn test_checkpoint_without_signal() {
        let context = OperationContext::default();
        assert!(context.checkpoint().is_ok());

        let signal = CancellationSignal::new();
        let context = OperationContext {
            cancellation: Some(signal.clone()),
            ..Default::default()
        };
        signal.cancel();
        assert!(context.checkpoint().is_err());
    }
}
