//! Keyed single-flight coalescing.
//!
//! Concurrent callers for the same key share one in-flight future and all
//! observe its result. The slot is released by the shared future itself
//! when it resolves, before any caller sees the output, so a caller that
//! arrives after the result is known starts a new flight.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;
type Slots<K, T, E> = Arc<Mutex<HashMap<K, (u64, Flight<T, E>)>>>;

pub struct SingleFlight<K, T, E> {
    slots: Slots<K, T, E>,
    next_generation: AtomicU64,
    // Diagnostics
    leaders: AtomicU64,
    waiters: AtomicU64,
}

impl<K, T, E> fmt::Debug for SingleFlight<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.slots.lock().len())
            .field("leaders", &self.leaders.load(Ordering::Relaxed))
            .field("waiters", &self.waiters.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, T, E> Default for SingleFlight<K, T, E> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            leaders: AtomicU64::new(0),
            waiters: AtomicU64::new(0),
        }
    }
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, or start one from `make` when none is
    /// running. `make` is only called by the leader.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = {
            let mut slots = self.slots.lock();
            if let Some((_, flight)) = slots.get(&key) {
                self.waiters.fetch_add(1, Ordering::Relaxed);
                log::debug!("[SingleFlight] waiter joined {:?}", key);
                flight.clone()
            } else {
                self.leaders.fetch_add(1, Ordering::Relaxed);
                log::debug!("[SingleFlight] leader started {:?}", key);
                let generation =
                    self.next_generation.fetch_add(1, Ordering::Relaxed);
                let flight = Self::launch(
                    Arc::clone(&self.slots),
                    key.clone(),
                    generation,
                    make(),
                );
                slots.insert(key, (generation, flight.clone()));
                flight
            }
        };
        flight.await
    }

    fn launch<Fut>(
        slots: Slots<K, T, E>,
        key: K,
        generation: u64,
        work: Fut,
    ) -> Flight<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        async move {
            let output = work.await;
            let mut slots = slots.lock();
            if slots.get(&key).is_some_and(|(g, _)| *g == generation) {
                slots.remove(&key);
            }
            output
        }
        .boxed()
        .shared()
    }

    /// Wait for the flight on `key` to settle, if one is running. Never
    /// starts a flight.
    pub async fn wait_idle(&self, key: &K) {
        let flight = self.slots.lock().get(key).map(|(_, f)| f.clone());
        if let Some(flight) = flight {
            log::trace!("[SingleFlight] waiting for {:?} to settle", key);
            let _ = flight.await;
        }
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.slots.lock().contains_key(key)
    }

    /// Number of flights started so far.
    pub fn leader_count(&self) -> u64 {
        self.leaders.load(Ordering::Relaxed)
    }

    /// Number of callers that joined an existing flight.
    pub fn waiter_count(&self) -> u64 {
        self.waiters.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn concurrent_callers_share_one_flight() {
        let flights: Arc<SingleFlight<&'static str, u32, String>> =
            Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            let release_rx = Arc::clone(&release_rx);
            handles.push(tokio::spawn(async move {
                flights
                    .run("refresh", move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let rx = release_rx.lock().take();
                        async move {
                            if let Some(rx) = rx {
                                let _ = rx.await;
                            }
                            Ok(42)
                        }
                    })
                    .await
            }));
        }

        while flights.waiter_count() < 7 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        release_tx.send(()).unwrap();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.leader_count(), 1);
        assert!(!flights.is_in_flight(&"refresh"));
    }

    #[tokio::test]
    async fn errors_are_shared_and_slot_is_released_first() {
        let flights: Arc<SingleFlight<&'static str, u32, String>> =
            Arc::new(SingleFlight::new());
        let observer = Arc::clone(&flights);

        let result = flights
            .run("refresh", || async { Err::<u32, _>("denied".to_string()) })
            .await;
        assert_eq!(result, Err("denied".to_string()));
        assert!(!observer.is_in_flight(&"refresh"));

        // A later caller starts a fresh flight.
        let result = flights.run("refresh", || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(flights.leader_count(), 2);
    }

    #[tokio::test]
    async fn wait_idle_blocks_until_settled_and_never_starts() {
        let flights: Arc<SingleFlight<&'static str, u32, String>> =
            Arc::new(SingleFlight::new());

        flights.wait_idle(&"refresh").await;
        assert_eq!(flights.leader_count(), 0);

        let (tx, rx) = oneshot::channel::<()>();
        let leader = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run("refresh", || async move {
                        let _ = rx.await;
                        Ok(1)
                    })
                    .await
            })
        };
        while !flights.is_in_flight(&"refresh") {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move { flights.wait_idle(&"refresh").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        tx.send(()).unwrap();
        waiter.await.unwrap();
        assert_eq!(leader.await.unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let flights: SingleFlight<u8, u8, ()> = SingleFlight::new();
        let (a, b) = tokio::join!(
            flights.run(1, || async { Ok(1) }),
            flights.run(2, || async { Ok(2) }),
        );
        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(flights.leader_count(), 2);
    }
}
