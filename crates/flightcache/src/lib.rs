//! TTL + single-flight cache.
//!
//! Per-key state machine: `Vacant -> Resolving -> Ready`. The first caller
//! for a key becomes the leader and runs the resolution; callers arriving
//! while the key is `Resolving` subscribe to a broadcast of the leader's
//! result instead of starting a second resolution. `Ready` entries are
//! served until their TTL elapses; stale entries re-enter `Resolving` on
//! the next lookup. Failed resolutions are never cached.
//!
//! A lookup observes either a complete prior entry or triggers a complete
//! new resolution; there is no partially written state. If a leader task is
//! dropped mid-resolution (caller cancelled, handler timed out), the slot
//! is released and one of the waiters retries as the new leader.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

enum Slot<V, E> {
    Ready { value: V, resolved_at: Instant },
    Resolving(broadcast::Sender<Result<V, E>>),
}

pub struct FlightCache<K, V, E> {
    ttl: Duration,
    // Lock discipline: never held across an await point. Leaders resolve
    // outside the lock; waiters hold only a broadcast receiver.
    entries: Mutex<HashMap<K, Slot<V, E>>>,
}

impl<K, V, E> FlightCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value for `key` if one exists and is younger than
    /// the TTL; otherwise resolves it through `resolve`, sharing one
    /// in-flight resolution among all concurrent callers for the key.
    pub async fn get_or_resolve<F, Fut>(&self, key: K, resolve: F) -> Result<V, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        loop {
            let role = {
                let mut entries = self.entries.lock().expect("flightcache lock poisoned");
                match entries.get(&key) {
                    Some(Slot::Ready { value, resolved_at })
                        if resolved_at.elapsed() < self.ttl =>
                    {
                        return Ok(value.clone());
                    }
                    Some(Slot::Resolving(tx)) => Role::Waiter(tx.subscribe()),
                    _ => {
                        let (tx, _rx) = broadcast::channel(1);
                        entries.insert(key.clone(), Slot::Resolving(tx.clone()));
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Waiter(mut rx) => match rx.recv().await {
                    Ok(result) => return result,
                    // Leader dropped without completing; loop and take over.
                    Err(_) => continue,
                },
                Role::Leader(tx) => {
                    let guard = LeaderGuard {
                        entries: &self.entries,
                        key: Some(key.clone()),
                    };
                    let result = resolve().await;
                    {
                        let mut entries = self.entries.lock().expect("flightcache lock poisoned");
                        match &result {
                            Ok(value) => {
                                entries.insert(
                                    key.clone(),
                                    Slot::Ready {
                                        value: value.clone(),
                                        resolved_at: Instant::now(),
                                    },
                                );
                            }
                            Err(_) => {
                                entries.remove(&key);
                            }
                        }
                    }
                    guard.defuse();
                    // No receivers is fine: the leader may have been alone.
                    let _ = tx.send(result.clone());
                    return result;
                }
            }
        }
    }

    /// Returns the cached value without resolving, if fresh.
    pub fn peek(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().expect("flightcache lock poisoned");
        match entries.get(key) {
            Some(Slot::Ready { value, resolved_at }) if resolved_at.elapsed() < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Drops the `Ready` entry for `key`. An in-flight resolution is not
    /// interrupted; when it completes, its result is stored and delivered
    /// to its waiters as usual (the latest resolution wins).
    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().expect("flightcache lock poisoned");
        if matches!(entries.get(key), Some(Slot::Ready { .. })) {
            entries.remove(key);
        }
    }

    /// Drops every `Ready` entry. In-flight resolutions are left alone.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("flightcache lock poisoned");
        entries.retain(|_, slot| matches!(slot, Slot::Resolving(_)));
    }
}

enum Role<V, E> {
    Leader(broadcast::Sender<Result<V, E>>),
    Waiter(broadcast::Receiver<Result<V, E>>),
}

/// Releases a `Resolving` slot if the leader future is dropped before
/// completing, so waiters are not wedged behind a dead sender.
struct LeaderGuard<'a, K, V, E>
where
    K: Eq + Hash,
{
    entries: &'a Mutex<HashMap<K, Slot<V, E>>>,
    key: Option<K>,
}

impl<K, V, E> LeaderGuard<'_, K, V, E>
where
    K: Eq + Hash,
{
    fn defuse(mut self) {
        self.key = None;
    }
}

impl<K, V, E> Drop for LeaderGuard<'_, K, V, E>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut entries) = self.entries.lock() {
                if matches!(entries.get(&key), Some(Slot::Resolving(_))) {
                    entries.remove(&key);
                }
            }
        }
    }
}
