//! FIFO mutual exclusion scoped to a string key.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

/// Mutual exclusion over arbitrary string keys.
///
/// [`KeyedMutex::lock`] resolves once it is the caller's turn for that
/// key; dropping the returned guard hands the key to the next waiter.
///
/// # Invariants
///
/// - At most one guard per key exists at any instant
/// - Waiters on the same key are served strictly in arrival order
/// - Distinct keys never block one another
/// - A key's bookkeeping is removed as soon as its queue empties
///
/// A key is present in the map while it is held; its queue holds the
/// wake-up senders of the tasks waiting behind the holder.
#[derive(Debug, Default)]
pub struct KeyedMutex {
    queues: Mutex<HashMap<String, VecDeque<oneshot::Sender<()>>>>,
}

impl KeyedMutex {
    /// Creates a new keyed mutex with no held keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    ///
    /// Cancellation-safe: a waiter dropped before its turn is skipped, and
    /// one dropped after being handed the key passes it on.
    pub async fn lock(&self, key: &str) -> KeyedMutexGuard<'_> {
        let turn = {
            let mut queues = self.queues.lock();
            match queues.get_mut(key) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push_back(tx);
                    Some(rx)
                }
                None => {
                    queues.insert(key.to_string(), VecDeque::new());
                    None
                }
            }
        };

        if let Some(rx) = turn {
            let mut pending = PendingTurn {
                mutex: self,
                key,
                rx: Some(rx),
            };
            pending.wait().await;
        }

        KeyedMutexGuard {
            mutex: self,
            key: key.to_string(),
        }
    }

    /// Returns true if some caller currently holds `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        self.queues.lock().contains_key(key)
    }

    /// Returns the number of keys currently held.
    pub fn active_keys(&self) -> usize {
        self.queues.lock().len()
    }

    /// Hands `key` to the next live waiter, or retires it.
    fn unlock(&self, key: &str) {
        let mut queues = self.queues.lock();
        let Some(waiters) = queues.get_mut(key) else {
            return;
        };

        while let Some(next) = waiters.pop_front() {
            if next.send(()).is_ok() {
                return;
            }
            // Waiter gave up before its turn; try the one behind it.
        }

        queues.remove(key);
    }
}

/// A waiter queued behind the current holder.
struct PendingTurn<'a> {
    mutex: &'a KeyedMutex,
    key: &'a str,
    rx: Option<oneshot::Receiver<()>>,
}

impl PendingTurn<'_> {
    async fn wait(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            // The sender is only dropped after a send, so an error cannot
            // leave the key unowned.
            let _ = rx.await;
        }
        self.rx = None;
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            // Closing first makes any later send fail, so a turn is either
            // received here or handed to the next waiter by `unlock`.
            rx.close();
            if rx.try_recv().is_ok() {
                self.mutex.unlock(self.key);
            }
        }
    }
}

/// Exclusive access to one key of a [`KeyedMutex`].
///
/// The key is released when the guard is dropped, on every exit path.
#[derive(Debug)]
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyedMutexGuard<'a> {
    mutex: &'a KeyedMutex,
    key: String,
}

impl KeyedMutexGuard<'_> {
    /// Returns the held key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the key explicitly.
    pub fn unlock(self) {
        drop(self);
    }
}

impl Drop for KeyedMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn uncontended_lock_is_immediate() {
        let mutex = KeyedMutex::new();
        let guard = mutex.lock("a").await;
        assert!(mutex.is_locked("a"));
        assert_eq!(guard.key(), "a");
        guard.unlock();
        assert!(!mutex.is_locked("a"));
        assert_eq!(mutex.active_keys(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let mutex = KeyedMutex::new();
        let _a = mutex.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), mutex.lock("b")).await;
        assert!(b.is_ok());
        assert_eq!(mutex.active_keys(), 2);
    }

    #[tokio::test]
    async fn waiters_are_served_in_fifo_order() {
        let mutex = Arc::new(KeyedMutex::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = mutex.lock("k").await;

        let mut handles = Vec::new();
        for i in 0..5 {
            let mutex = Arc::clone(&mutex);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _guard = mutex.lock("k").await;
                order.lock().push(i);
                tokio::task::yield_now().await;
            }));
            // Let task `i` enqueue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(mutex.active_keys(), 0);
    }

    #[tokio::test]
    async fn at_most_one_holder_per_key() {
        let mutex = Arc::new(KeyedMutex::new());
        let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let inside = Arc::clone(&inside);
                tokio::spawn(async move {
                    let _guard = mutex.lock("shared").await;
                    let now = inside.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    assert_eq!(now, 0);
                    tokio::task::yield_now().await;
                    inside.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert!(!mutex.is_locked("shared"));
    }

    #[tokio::test]
    async fn cancelled_waiter_is_skipped() {
        let mutex = Arc::new(KeyedMutex::new());
        let holder = mutex.lock("k").await;

        // Queue a waiter and abandon it.
        let abandoned = tokio::time::timeout(Duration::from_millis(20), mutex.lock("k")).await;
        assert!(abandoned.is_err());

        let next = {
            let mutex = Arc::clone(&mutex);
            tokio::spawn(async move {
                let _guard = mutex.lock("k").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(holder);
        tokio::time::timeout(Duration::from_secs(1), next)
            .await
            .expect("live waiter should get the key")
            .unwrap();
        assert_eq!(mutex.active_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiters_cancelled_during_release_never_strand_the_key() {
        let mutex = Arc::new(KeyedMutex::new());
        for round in 0..500u64 {
            let holder = mutex.lock("k").await;
            let waiter = {
                let mutex = Arc::clone(&mutex);
                tokio::spawn(async move {
                    let wait = Duration::from_micros(50 + round % 50);
                    let _ = tokio::time::timeout(wait, mutex.lock("k")).await;
                })
            };
            tokio::time::sleep(Duration::from_micros(round % 100)).await;
            drop(holder);
            waiter.await.unwrap();

            let next = tokio::time::timeout(Duration::from_secs(1), mutex.lock("k"))
                .await
                .unwrap_or_else(|_| panic!("key stranded in round {round}"));
            drop(next);
            assert_eq!(mutex.active_keys(), 0, "round {round}");
        }
    }

    #[tokio::test]
    async fn guard_released_on_error_path() {
        async fn failing(mutex: &KeyedMutex) -> Result<(), &'static str> {
            let _guard = mutex.lock("k").await;
            Err("boom")
        }

        let mutex = KeyedMutex::new();
        assert!(failing(&mutex).await.is_err());
        assert!(!mutex.is_locked("k"));
    }
}
