//! Abortable in-flight request tracking.
//!
//! Lookups that depend on a changeable selection (a product, a merge
//! behavior, a revision) must never apply a stale answer. Each new run
//! cancels the previous one, and a result that arrives after a newer run
//! started is discarded.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct InflightTracker {
    generation: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` as the current request, superseding any earlier one.
    ///
    /// Returns `Ok(None)` when this run was cancelled or overtaken by a newer
    /// run; its outcome, error included, is dropped.
    pub async fn run<F, T, E>(&self, fut: F) -> Result<Option<T>, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let (generation, token) = self.begin();

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = fut => Some(result),
        };

        let current = self.generation.load(Ordering::SeqCst);
        match outcome {
            Some(result) if current == generation => result.map(Some),
            _ => {
                debug!(generation, current, "Discarding superseded request");
                Ok(None)
            }
        }
    }

    /// Cancel whatever is in flight without starting anything new.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.lock().take() {
            token.cancel();
        }
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut current = self.lock();
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, token)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
