//! Single-flight execution of a shared async operation
//!
//! Concurrent callers of [`SingleFlight::run`] join one in-flight operation
//! and all observe its outcome. The operation runs in its own task, so
//! dropping any caller never aborts it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use authgear_domain::{AuthgearError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T>>>;

struct Flight<T: Clone> {
    generation: u64,
    outcome: SharedOutcome<T>,
}

/// At most one in-flight operation at a time
pub struct SingleFlight<T: Clone> {
    slot: Arc<Mutex<Option<Flight<T>>>>,
    generation: AtomicU64,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self { slot: Arc::new(Mutex::new(None)), generation: AtomicU64::new(0) }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight operation, or start `start()` if there is none.
    ///
    /// `start` is only called when a new flight begins.
    pub async fn run<F, Fut>(&self, start: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let outcome = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(flight) => flight.outcome.clone(),
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let outcome = self.launch(generation, start());
                    *slot = Some(Flight { generation, outcome: outcome.clone() });
                    outcome
                }
            }
        };
        outcome.await
    }

    fn launch<Fut>(&self, generation: u64, operation: Fut) -> SharedOutcome<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        let task = tokio::spawn(async move {
            let result = operation.await;
            let mut slot = slot.lock();
            if slot.as_ref().is_some_and(|flight| flight.generation == generation) {
                *slot = None;
            }
            result
        });
        async move {
            task.await.unwrap_or_else(|e| {
                Err(AuthgearError::Internal(format!("single-flight task failed: {e}")))
            })
        }
        .boxed()
        .shared()
    }
}
