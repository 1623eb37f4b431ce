// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Deduplication of concurrent identical fetches

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::FetchError;

/// A pending fetch that any number of callers can await
pub type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

struct Registration<T> {
    id: u64,
    future: SharedFetch<T>,
}

type PendingMap<T> = Arc<Mutex<HashMap<String, Registration<T>>>>;

/// Removes a registration when its task settles, including on panic or
/// runtime shutdown
struct CleanupGuard<T> {
    pending: PendingMap<T>,
    key: String,
    id: u64,
}

impl<T> Drop for CleanupGuard<T> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if pending
            .get(&self.key)
            .is_some_and(|registration| registration.id == self.id)
        {
            pending.remove(&self.key);
        }
    }
}

/// Registry of pending fetches keyed by request
///
/// Work is spawned on the Tokio runtime, so a caller dropping its handle does
/// not cancel the fetch. Every caller joined to a key observes the same result
/// or the same error.
pub struct InFlightRequestRegistry<T> {
    pending: PendingMap<T>,
    next_id: AtomicU64,
}

impl<T> InFlightRequestRegistry<T> {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<T> InFlightRequestRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{

    /// Join the pending fetch for `key`, or start `work` and register it
    ///
    /// Must be called from within a Tokio runtime. `work` runs with the
    /// registry locked and must not call back into it synchronously.
    pub fn dedupe<F, Fut>(&self, key: impl Into<String>, work: F) -> SharedFetch<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let key = key.into();
        let mut pending = self.pending.lock();

        if let Some(registration) = pending.get(&key) {
            log::debug!("Joining in-flight request {}", key);
            return registration.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = CleanupGuard {
            pending: Arc::clone(&self.pending),
            key: key.clone(),
            id,
        };

        let fetch = work();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            fetch.await
        });

        let task_key = key.clone();
        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    log::warn!("In-flight request {} aborted: {}", task_key, err);
                    Err(FetchError::TaskAborted(err.to_string()))
                }
            }
        }
        .boxed()
        .shared();

        log::debug!("Registered in-flight request {}", key);
        pending.insert(
            key,
            Registration {
                id,
                future: future.clone(),
            },
        );
        future
    }
}

impl<T> Default for InFlightRequestRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;
    use tokio::sync::Notify;

    async fn wait_until_idle(registry: &InFlightRequestRegistry<u32>) {
        for _ in 0..200 {
            if registry.pending_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry still has pending requests");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_callers_share_one_execution() {
        let registry = InFlightRequestRegistry::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let start = |calls: Arc<AtomicUsize>, release: Arc<Notify>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                Ok(42)
            }
        };

        let first = registry.dedupe("k", start(calls.clone(), release.clone()));
        let second = registry.dedupe("k", start(calls.clone(), release.clone()));
        assert!(registry.is_pending("k"));

        release.notify_one();
        let (a, b) = tokio::join!(first, second);

        assert_eq!(a, Ok(42));
        assert_eq!(b, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        wait_until_idle(&registry).await;
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_does_not_block_retry() {
        let registry = InFlightRequestRegistry::<u32>::new();
        let release = Arc::new(Notify::new());

        let gate = release.clone();
        let first = registry.dedupe("k", move || async move {
            gate.notified().await;
            Err(FetchError::from(RemoteError::with_status(503, "unavailable")))
        });
        let second = registry.dedupe("k", || async { Ok(1) });

        release.notify_one();
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a, b);
        assert_eq!(a.unwrap_err().remote().and_then(|e| e.status), Some(503));

        wait_until_idle(&registry).await;
        let retry = registry.dedupe("k", || async { Ok(7) }).await;
        assert_eq!(retry, Ok(7));
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let registry = InFlightRequestRegistry::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = |value: u32| {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
        };

        let (a, b) = tokio::join!(registry.dedupe("a", counted(1)), registry.dedupe("b", counted(2)));
        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_work() {
        let registry = InFlightRequestRegistry::<u32>::new();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let handle = registry.dedupe("k", move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(3)
        });
        drop(handle);

        wait_until_idle(&registry).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_work_is_reported_and_unregistered() {
        let registry = InFlightRequestRegistry::<u32>::new();

        let result = registry
            .dedupe("k", || async {
                if true {
                    panic!("data source exploded");
                }
                Ok(0)
            })
            .await;

        assert!(matches!(result, Err(FetchError::TaskAborted(_))));
        wait_until_idle(&registry).await;
        assert!(!registry.is_pending("k"));
    }
}
