//! Concurrent callers for the same key share one running computation.

use crate::error::Error;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

pub type SharedFlight<V> = Shared<BoxFuture<'static, Result<V, Error>>>;

type FlightMap<K, V> = Arc<Mutex<HashMap<K, SharedFlight<V>>>>;

pub struct SingleFlight<K, V> {
    inflight: FlightMap<K, V>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

struct Release<K: Eq + Hash, V> {
    inflight: FlightMap<K, V>,
    key: K,
}

impl<K: Eq + Hash, V> Drop for Release<K, V> {
    fn drop(&mut self) {
        self.inflight.lock().remove(&self.key);
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the flight running for `key`, or starts `work` as a new one.
    ///
    /// The returned flag is true when this call started the flight.
    pub fn join_or_start<F, Fut>(&self, key: K, work: F) -> (SharedFlight<V>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        // Held across the spawn so the task's release can't run before the
        // flight is registered.
        let mut inflight = self.inflight.lock();
        if let Some(flight) = inflight.get(&key) {
            return (flight.clone(), false);
        }

        let release = Release {
            inflight: Arc::clone(&self.inflight),
            key: key.clone(),
        };
        let fut = work();
        let task = tokio::spawn(async move {
            let _release = release;
            fut.await
        });

        let flight = async move {
            task.await
                .unwrap_or_else(|e| Err(Error::PassAborted(e.to_string())))
        }
        .boxed()
        .shared();

        inflight.insert(key, flight.clone());
        (flight, true)
    }

    pub fn is_running(&self, key: &K) -> bool {
        self.inflight.lock().contains_key(key)
    }
}
