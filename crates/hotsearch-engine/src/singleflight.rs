use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

type Flight<T> = Shared<BoxFuture<'static, T>>;

/// At most one in-flight computation per key.
///
/// Callers that arrive while a flight for the same key is running await
/// that flight's result instead of starting their own. Entries are tagged
/// with a generation so a finished flight never evicts a newer one.
pub struct SingleFlight<T> {
    flights: DashMap<String, (u64, Flight<T>)>,
    next_generation: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: DashMap::new(),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Run the future built by `make` for `key`, or join the one already
    /// running. Returns the value and whether this caller joined.
    ///
    /// `make` is only called by the caller that starts the flight. If every
    /// waiter is dropped mid-flight, the next caller picks it up and drives
    /// it to completion.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (generation, flight, joined) = match self.flights.entry(key.to_string()) {
            Entry::Occupied(e) => {
                let (generation, flight) = e.get();
                (*generation, flight.clone(), true)
            }
            Entry::Vacant(e) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let flight = make().boxed().shared();
                e.insert((generation, flight.clone()));
                (generation, flight, false)
            }
        };

        let value = flight.await;
        self.flights.remove_if(key, |_, (g, _)| *g == generation);
        (value, joined)
    }

    /// Keys with a flight currently registered
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
