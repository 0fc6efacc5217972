//! Cancellation composition and per-session stop handles.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use flowpilot_protocols::error::ExecutionError;

/// Which signal ended an operation early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    TimedOut,
    Cancelled,
}

impl Interrupt {
    /// Convert into an [`ExecutionError`] describing `operation`.
    pub fn into_error(self, operation: &str) -> ExecutionError {
        match self {
            Self::TimedOut => ExecutionError::Timeout(format!("{} timed out", operation)),
            Self::Cancelled => ExecutionError::Cancelled(format!("{} was cancelled", operation)),
        }
    }
}

impl From<Interrupt> for ExecutionError {
    fn from(interrupt: Interrupt) -> Self {
        interrupt.into_error("Operation")
    }
}

impl std::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimedOut => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A caller's cancellation signal combined with a timeout scoped to one
/// operation.
///
/// The composed token is a child of the caller's token, so cancelling the
/// caller cancels it too; the deadline cancels only the composed token. The
/// composed token is cancelled when the scope is dropped.
pub struct CancellationScope {
    token: CancellationToken,
    deadline: Option<Instant>,
    timed_out: AtomicBool,
}

impl CancellationScope {
    /// A timeout too large to represent as a deadline is treated as none.
    pub fn new(parent: &CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token: parent.child_token(),
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
            timed_out: AtomicBool::new(false),
        }
    }

    /// The composed signal to hand to the operation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` until it completes or either signal fires.
    ///
    /// The deadline is checked before the caller's signal, so an expired
    /// timeout is reported as [`Interrupt::TimedOut`] even if the caller
    /// cancelled in the same instant.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = deadline => {
                self.timed_out.store(true, Ordering::Release);
                self.token.cancel();
                Err(Interrupt::TimedOut)
            }
            _ = self.token.cancelled() => Err(self.interrupt().unwrap_or(Interrupt::Cancelled)),
            output = fut => Ok(output),
        }
    }

    /// The signal that fired, if any.
    pub fn interrupt(&self) -> Option<Interrupt> {
        if self.timed_out.load(Ordering::Acquire) {
            Some(Interrupt::TimedOut)
        } else if self.token.is_cancelled() {
            Some(Interrupt::Cancelled)
        } else {
            None
        }
    }
}

impl Drop for CancellationScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Registration returned by [`SessionCancellations::register`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub key: String,
    pub token: CancellationToken,
    generation: u64,
}

/// One cancellation handle per session key.
///
/// Registering under an existing key overwrites the entry without cancelling
/// the previous handle; `stop` reaches only the most recent registration.
#[derive(Default)]
pub struct SessionCancellations {
    handles: DashMap<String, (u64, CancellationToken)>,
    generation: AtomicU64,
}

impl SessionCancellations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh handle for `key`, replacing any existing entry.
    pub fn register(&self, key: impl Into<String>) -> SessionHandle {
        let key = key.into();
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        if self
            .handles
            .insert(key.clone(), (generation, token.clone()))
            .is_some()
        {
            debug!(session = %key, "Session handle replaced");
        }
        SessionHandle {
            key,
            token,
            generation,
        }
    }

    /// Cancel the currently registered handle for `key`.
    pub fn stop(&self, key: &str) -> bool {
        match self.handles.get(key) {
            Some(entry) => {
                entry.value().1.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the entry for a finished request, if it is still the current
    /// registration.
    pub fn release(&self, handle: &SessionHandle) -> bool {
        self.handles
            .remove_if(&handle.key, |_, (generation, _)| *generation == handle.generation)
            .is_some()
    }

    /// Cancel and remove the entry for `key`.
    pub fn disconnect(&self, key: &str) -> bool {
        match self.handles.remove(key) {
            Some((_, (_, token))) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scope_reports_timeout() {
        let caller = CancellationToken::new();
        let scope = CancellationScope::new(&caller, Some(Duration::from_secs(1)));
        let result = scope
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert_eq!(result, Err(Interrupt::TimedOut));
        assert_eq!(scope.interrupt(), Some(Interrupt::TimedOut));
        assert!(scope.token().is_cancelled());
        assert!(!caller.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_reports_caller_cancellation() {
        let caller = CancellationToken::new();
        let scope = CancellationScope::new(&caller, Some(Duration::from_secs(60)));
        let trigger = caller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let result = scope
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert_eq!(result, Err(Interrupt::Cancelled));
        assert_eq!(scope.interrupt(), Some(Interrupt::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_completes() {
        let caller = CancellationToken::new();
        let scope = CancellationScope::new(&caller, Some(Duration::from_secs(5)));
        let result = scope.run(async { 7 }).await;
        assert_eq!(result, Ok(7));
        assert!(scope.interrupt().is_none());
    }

    #[tokio::test]
    async fn test_scope_without_timeout() {
        let caller = CancellationToken::new();
        let scope = CancellationScope::new(&caller, None);
        assert!(scope.deadline().is_none());
        assert_eq!(scope.run(async { "done" }).await, Ok("done"));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_means_no_deadline() {
        let caller = CancellationToken::new();
        let scope = CancellationScope::new(&caller, Some(Duration::MAX));
        assert!(scope.deadline().is_none());
        assert_eq!(scope.run(async { 1 }).await, Ok(1));

        let scope = CancellationScope::new(&caller, Some(Duration::from_secs(u64::MAX)));
        assert!(scope.deadline().is_none());
    }

    #[test]
    fn test_drop_releases_composed_token() {
        let caller = CancellationToken::new();
        let token = {
            let scope = CancellationScope::new(&caller, None);
            scope.token()
        };
        assert!(token.is_cancelled());
        assert!(!caller.is_cancelled());
    }

    #[test]
    fn test_interrupt_into_error() {
        let err: ExecutionError = Interrupt::TimedOut.into_error("Adapter execution");
        assert_eq!(err.message(), "Adapter execution timed out");
        let err: ExecutionError = Interrupt::Cancelled.into();
        assert!(matches!(err, ExecutionError::Cancelled(_)));
    }

    #[test]
    fn test_overwrite_only_stops_latest() {
        let sessions = SessionCancellations::new();
        let first = sessions.register("conn-1");
        let second = sessions.register("conn-1");
        assert_eq!(sessions.len(), 1);

        assert!(sessions.stop("conn-1"));
        assert!(second.token.is_cancelled());
        assert!(!first.token.is_cancelled());
    }

    #[test]
    fn test_release_ignores_superseded_handle() {
        let sessions = SessionCancellations::new();
        let first = sessions.register("conn-1");
        let second = sessions.register("conn-1");

        assert!(!sessions.release(&first));
        assert!(sessions.contains("conn-1"));
        assert!(sessions.release(&second));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_disconnect_cancels_and_removes() {
        let sessions = SessionCancellations::new();
        let handle = sessions.register("conn-1");
        assert!(sessions.disconnect("conn-1"));
        assert!(handle.token.is_cancelled());
        assert!(!sessions.contains("conn-1"));
        assert!(!sessions.disconnect("conn-1"));
        assert!(!sessions.stop("conn-1"));
    }
}
