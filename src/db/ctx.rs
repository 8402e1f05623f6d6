use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::DbError;

/// Per-call deadline and cancellation signal.
///
/// Every data-access call receives one of these; the call resolves with
/// [`DbError::DeadlineExceeded`] or [`DbError::Cancelled`] as soon as either
/// fires instead of waiting on the store.
#[derive(Debug, Clone, Default)]
pub struct CallCtx {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallCtx {
    /// No deadline, never cancelled unless the token is fired.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::default().deadline_at(Instant::now() + timeout)
    }

    pub fn deadline_at(mut self, at: Instant) -> Self {
        self.deadline = Some(at);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Drive `fut` unless the token or the deadline fires first.
    ///
    /// Both signals are checked up front, so an already-fired token or an
    /// elapsed deadline never reaches the driver. The select covers signals
    /// that fire while the call is in flight.
    pub(crate) async fn guard<T, F>(&self, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        if self.cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            return Err(DbError::DeadlineExceeded);
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DbError::Cancelled),
            _ = deadline => Err(DbError::DeadlineExceeded),
            res = fut => res.map_err(DbError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn passes_result_through() {
        let ctx = CallCtx::with_timeout(Duration::from_secs(5));
        let out = ctx.guard(async { Ok::<_, sqlx::Error>(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn fired_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CallCtx::background().with_cancel(token);
        let err = ctx.guard(async { Ok::<_, sqlx::Error>(()) }).await.unwrap_err();
        assert!(matches!(err, DbError::Cancelled));
    }

    #[tokio::test]
    async fn expired_deadline_wins() {
        let ctx = CallCtx::background().deadline_at(Instant::now());
        let err = ctx.guard(async { Ok::<_, sqlx::Error>(()) }).await.unwrap_err();
        assert!(matches!(err, DbError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn elapsed_deadline_never_polls_the_call() {
        let polled = AtomicBool::new(false);
        let ctx = CallCtx::background().deadline_at(Instant::now());
        let err = ctx
            .guard(async {
                polled.store(true, Ordering::SeqCst);
                Ok::<_, sqlx::Error>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DeadlineExceeded));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn hanging_call_aborts_at_deadline() {
        let ctx = CallCtx::with_timeout(Duration::from_millis(50));
        let err = ctx
            .guard(std::future::pending::<Result<(), sqlx::Error>>())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn cancel_while_pending() {
        let token = CancellationToken::new();
        let ctx = CallCtx::background().with_cancel(token.clone());
        let handle = tokio::spawn(async move {
            ctx.guard(std::future::pending::<Result<(), sqlx::Error>>()).await
        });
        token.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, DbError::Cancelled));
    }
}
