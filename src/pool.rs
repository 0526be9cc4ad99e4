//! Fixed-capacity connection pool

use crate::completion::{Completer, Completion};
use crate::config::Configuration;
use crate::connection::{Connection, PooledConnection};
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;
use crate::metrics::{MetricsTracker, PoolMetrics};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A connection together with the id it keeps while pooled
pub(crate) struct Slot<C> {
    pub id: u64,
    pub conn: C,
}

/// State shared by the pool, its handles and its background workers
pub(crate) struct Shared<C: Connection> {
    config: Configuration<C>,
    slots_tx: Sender<Slot<C>>,
    slots_rx: Receiver<Slot<C>>,
    // Borrowed handle ids, flagged true for on-demand connections
    borrowed: DashMap<u64, bool>,
    closed: RwLock<bool>,
    // Dropped on close, which wakes every sleeping retry loop
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    population: Mutex<Option<Arc<Population>>>,
    pending: AtomicUsize,
    next_id: AtomicU64,
    metrics: MetricsTracker,
}

impl<C: Connection> Shared<C> {
    fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    fn is_started(&self) -> bool {
        self.population.lock().is_some()
    }

    /// Call the factory until it succeeds or the pool closes
    fn establish(&self) -> Option<Slot<C>> {
        let mut attempt: u64 = 0;
        loop {
            if self.is_closed() {
                debug!(pool = %self.config.name, attempt, "pool closed, abandoning connection attempt");
                return None;
            }

            attempt += 1;
            match self.config.connect() {
                Ok(conn) => {
                    MetricsTracker::incr(&self.metrics.connections_created);
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    debug!(pool = %self.config.name, id, attempt, "connection established");
                    return Some(Slot { id, conn });
                }
                Err(err) => {
                    MetricsTracker::incr(&self.metrics.connect_failures);
                    warn!(
                        pool = %self.config.name,
                        address = %self.config.address,
                        attempt,
                        error = %err,
                        retry_in = ?self.config.retry_duration,
                        "failed to establish connection"
                    );
                    if !self.wait_retry() {
                        debug!(pool = %self.config.name, attempt, "pool closed while waiting to retry");
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep for the retry duration; false when woken by shutdown
    fn wait_retry(&self) -> bool {
        matches!(
            self.shutdown_rx.recv_timeout(self.config.retry_duration),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Put a connection into the slots, closing it if the pool cannot take it
    fn insert(&self, slot: Slot<C>) -> bool {
        let rejected = {
            let closed = self.closed.read();
            if *closed {
                Some((slot, "pool is closed"))
            } else {
                match self.slots_tx.try_send(slot) {
                    Ok(()) => None,
                    Err(TrySendError::Full(slot)) => Some((slot, "pool is full")),
                    Err(TrySendError::Disconnected(slot)) => Some((slot, "pool is closed")),
                }
            }
        };

        match rejected {
            None => true,
            Some((slot, reason)) => {
                warn!(pool = %self.config.name, id = slot.id, reason, "connection not pooled, closing it");
                self.close_connection(slot);
                false
            }
        }
    }

    fn close_connection(&self, mut slot: Slot<C>) {
        if let Err(err) = slot.conn.close() {
            warn!(pool = %self.config.name, id = slot.id, error = %err, "failed to close connection");
        }
        MetricsTracker::incr(&self.metrics.connections_closed);
    }

    /// Mark the pool closed, wake retry loops and take every idle slot
    ///
    /// Returns `None` when the pool was already closed.
    fn shut_down(&self) -> Option<Vec<Slot<C>>> {
        let mut closed = self.closed.write();
        if *closed {
            return None;
        }
        *closed = true;
        drop(self.shutdown_tx.lock().take());
        Some(self.slots_rx.try_iter().collect())
    }

    fn close_all(&self, idle: Vec<Slot<C>>) {
        for slot in idle {
            self.close_connection(slot);
        }
    }

    /// Take back a handle from a caller
    pub(crate) fn give_back(self: &Arc<Self>, slot: Slot<C>, bad: bool, overflow: bool) {
        self.borrowed.remove(&slot.id);
        MetricsTracker::incr(&self.metrics.total_returned);

        if overflow {
            debug!(pool = %self.config.name, id = slot.id, "closing on-demand connection");
            self.close_connection(slot);
        } else if bad {
            debug!(pool = %self.config.name, id = slot.id, "replacing bad connection");
            self.close_connection(slot);
            MetricsTracker::incr(&self.metrics.replacements);
            self.spawn_replacement();
        } else {
            debug!(pool = %self.config.name, id = slot.id, "connection returned");
            self.insert(slot);
        }
    }

    fn spawn_replacement(self: &Arc<Self>) {
        if self.is_closed() {
            debug!(pool = %self.config.name, "pool closed, not replacing connection");
            return;
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(self);
        let spawned = self.spawn_worker("replace", move || {
            if let Some(slot) = shared.establish() {
                shared.insert(slot);
            }
            shared.pending.fetch_sub(1, Ordering::SeqCst);
        });
        if spawned.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn spawn_worker<F>(&self, role: &str, job: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = format!("{}-{}", self.config.name.replace('\0', ""), role);
        thread::Builder::new()
            .name(name)
            .spawn(job)
            .map(|_| ())
            .inspect_err(|err| {
                error!(pool = %self.config.name, role, error = %err, "failed to spawn worker thread");
            })
    }
}

/// Progress of the initial population, shared by every `init` caller
struct Population {
    state: Mutex<PopulationState>,
}

struct PopulationState {
    unfilled: usize,
    running: usize,
    waiters: Vec<Completer>,
    // Some(true) once every slot is filled, Some(false) once abandoned
    outcome: Option<bool>,
}

impl Population {
    fn new(size: usize) -> Self {
        Self {
            state: Mutex::new(PopulationState {
                unfilled: size,
                running: size,
                waiters: Vec::new(),
                outcome: (size == 0).then_some(true),
            }),
        }
    }

    /// A completion tied to this population
    fn subscribe(&self) -> Completion {
        let mut state = self.state.lock();
        match state.outcome {
            Some(true) => Completion::ready(),
            Some(false) => Completion::cancelled(),
            None => {
                let (completer, completion) = Completion::pair();
                state.waiters.push(completer);
                completion
            }
        }
    }

    /// Record a finished slot worker
    fn worker_done(&self, filled: bool) {
        let mut state = self.state.lock();
        state.running -= 1;
        if filled {
            state.unfilled -= 1;
        }

        if state.unfilled == 0 {
            state.outcome = Some(true);
            for completer in state.waiters.drain(..) {
                completer.complete();
            }
        } else if state.running == 0 {
            // Dropping the completers reports the population as cancelled
            state.outcome = Some(false);
            state.waiters.clear();
        }
    }
}

/// Owner of a pool's shared state, held by every `Pool` clone and handle
///
/// Background workers hold only the shared state, so when the last pool
/// clone and borrowed handle are gone the pool shuts itself down.
pub(crate) struct PoolInner<C: Connection> {
    pub(crate) shared: Arc<Shared<C>>,
}

impl<C: Connection> Drop for PoolInner<C> {
    fn drop(&mut self) {
        if let Some(idle) = self.shared.shut_down() {
            debug!(pool = %self.shared.config.name, idle = idle.len(), "pool dropped without close");
            self.shared.close_all(idle);
        }
    }
}

/// Fixed-capacity pool of network connections
///
/// The pool keeps `size` connections open. Callers borrow one with
/// [`get`](Pool::get) and hand it back with [`release`](Pool::release) or by
/// dropping it. Connections reported bad are closed and re-established in
/// the background, retrying forever at the configured interval.
///
/// Cloning a pool is cheap; clones share the same connections. Dropping the
/// last clone once every borrowed connection is back closes the pool.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{BoxError, Configuration, Connection, Pool};
/// use std::time::Duration;
///
/// struct Session(u32);
///
/// impl Connection for Session {
///     fn close(&mut self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// let pool = Pool::new(Configuration::new("sessions", 3, "svc:9000", |_| Ok(Session(7))));
/// pool.init().wait().unwrap();
///
/// let conn = pool.get(Duration::from_millis(50), false).unwrap();
/// assert_eq!(conn.0, 7);
/// assert_eq!(pool.available_count(), 2);
///
/// pool.release(conn);
/// pool.close().wait().unwrap();
/// ```
pub struct Pool<C: Connection> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connection> Pool<C> {
    /// Create an empty pool; no connection is opened until [`init`](Pool::init)
    pub fn new(config: Configuration<C>) -> Self {
        let (slots_tx, slots_rx) = channel::bounded(config.size.max(1));
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);

        let shared = Arc::new(Shared {
            config,
            slots_tx,
            slots_rx,
            borrowed: DashMap::new(),
            closed: RwLock::new(false),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            population: Mutex::new(None),
            pending: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            metrics: MetricsTracker::new(),
        });

        Self {
            inner: Arc::new(PoolInner { shared }),
        }
    }

    fn shared(&self) -> &Arc<Shared<C>> {
        &self.inner.shared
    }

    /// Start filling the pool in the background
    ///
    /// Each slot gets its own worker that retries the factory until it
    /// succeeds. The returned signal fires once every slot holds a
    /// connection. Calling `init` again starts nothing new and returns a
    /// signal for the same population.
    pub fn init(&self) -> Completion {
        let shared = self.shared();
        if shared.is_closed() {
            return Completion::cancelled();
        }

        let population = {
            let mut current = shared.population.lock();
            if let Some(population) = current.as_ref() {
                warn!(pool = %shared.config.name, "pool already initialised");
                return population.subscribe();
            }
            let population = Arc::new(Population::new(shared.config.size));
            *current = Some(Arc::clone(&population));
            population
        };

        let size = shared.config.size;
        info!(
            pool = %shared.config.name,
            size,
            address = %shared.config.address,
            "populating connection pool"
        );
        let completion = population.subscribe();

        shared.pending.fetch_add(size, Ordering::SeqCst);
        for index in 0..size {
            let worker_shared = Arc::clone(shared);
            let worker_population = Arc::clone(&population);
            let spawned = shared.spawn_worker(&format!("connect-{}", index), move || {
                let filled = match worker_shared.establish() {
                    Some(slot) => worker_shared.insert(slot),
                    None => false,
                };
                worker_shared.pending.fetch_sub(1, Ordering::SeqCst);
                worker_population.worker_done(filled);
            });
            if spawned.is_err() {
                shared.pending.fetch_sub(1, Ordering::SeqCst);
                population.worker_done(false);
            }
        }

        completion
    }

    /// Borrow a connection, waiting up to `timeout` for one to free up
    ///
    /// When nothing frees up in time and `on_demand` is set, one extra
    /// connection is created beyond the pool's capacity. It is closed,
    /// not pooled, when released. Without `on_demand` an exhausted pool
    /// yields [`PoolError::Timeout`].
    pub fn get(&self, timeout: Duration, on_demand: bool) -> PoolResult<PooledConnection<C>> {
        let shared = self.shared();
        if shared.is_closed() {
            return Err(PoolError::Closed);
        }

        match shared.slots_rx.recv_timeout(timeout) {
            Ok(slot) => Ok(self.checkout(slot, false)),
            Err(RecvTimeoutError::Timeout) => {
                MetricsTracker::incr(&shared.metrics.timeouts);
                if shared.is_closed() {
                    Err(PoolError::Closed)
                } else if on_demand {
                    self.create_overflow()
                } else {
                    debug!(pool = %shared.config.name, ?timeout, "timed out waiting for connection");
                    Err(PoolError::Timeout(timeout))
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::Closed),
        }
    }

    /// Borrow a connection only if one is available right now
    pub fn try_get(&self) -> Option<PooledConnection<C>> {
        let shared = self.shared();
        if shared.is_closed() {
            return None;
        }
        shared
            .slots_rx
            .try_recv()
            .ok()
            .map(|slot| self.checkout(slot, false))
    }

    /// Borrow a connection from async code
    ///
    /// The wait runs on tokio's blocking pool so the calling task's worker
    /// thread stays free.
    pub async fn get_async(
        &self,
        timeout: Duration,
        on_demand: bool,
    ) -> PoolResult<PooledConnection<C>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.get(timeout, on_demand))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Hand a borrowed connection back
    ///
    /// A connection marked bad is closed and replaced in the background;
    /// this call never waits for the replacement. Close errors are logged,
    /// not returned.
    pub fn release(&self, conn: PooledConnection<C>) {
        drop(conn);
    }

    /// Close the pool and every connection it currently holds
    ///
    /// Background connection attempts stop, and connections borrowed at
    /// this point are closed when they come back. The returned signal
    /// fires once teardown has finished.
    pub fn close(&self) -> Completion {
        let shared = self.shared();
        let Some(idle) = shared.shut_down() else {
            debug!(pool = %shared.config.name, "pool already closed");
            return Completion::ready();
        };

        info!(
            pool = %shared.config.name,
            idle = idle.len(),
            borrowed = shared.borrowed.len(),
            "closing connection pool"
        );

        let (completer, completion) = Completion::pair();
        let teardown = Arc::new(Mutex::new(Some((idle, completer))));
        let job_teardown = Arc::clone(&teardown);
        let job_shared = Arc::clone(shared);
        let spawned = shared.spawn_worker("close", move || {
            finish_close(&job_shared, &job_teardown);
        });
        if spawned.is_err() {
            // The job never ran, so the teardown is still ours
            finish_close(shared, &teardown);
        }

        completion
    }

    /// Get the pool configuration
    pub fn config(&self) -> &Configuration<C> {
        &self.shared().config
    }

    pub fn is_closed(&self) -> bool {
        self.shared().is_closed()
    }

    /// True once [`init`](Pool::init) has been called
    pub fn is_started(&self) -> bool {
        self.shared().is_started()
    }

    /// Connections waiting in the pool
    pub fn available_count(&self) -> usize {
        self.shared().slots_rx.len()
    }

    /// Pooled connections currently lent out (on-demand ones excluded)
    pub fn borrowed_count(&self) -> usize {
        self.shared()
            .borrowed
            .iter()
            .filter(|entry| !*entry.value())
            .count()
    }

    /// Connections being established in the background
    pub fn pending_count(&self) -> usize {
        self.shared().pending.load(Ordering::SeqCst)
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.shared().metrics.get_metrics(
            self.borrowed_count(),
            self.available_count(),
            self.pending_count(),
            self.shared().config.size,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format, labelled with the pool name
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        MetricsExporter::export_prometheus(&self.get_metrics(), &self.shared().config.name, tags)
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.available_count(),
            self.borrowed_count(),
            self.pending_count(),
            self.shared().config.size,
            self.is_started(),
            self.is_closed(),
        )
    }

    fn checkout(&self, slot: Slot<C>, overflow: bool) -> PooledConnection<C> {
        let shared = self.shared();
        shared.borrowed.insert(slot.id, overflow);
        MetricsTracker::incr(&shared.metrics.total_retrieved);
        debug!(pool = %shared.config.name, id = slot.id, overflow, "connection borrowed");
        PooledConnection::new(slot, overflow, Arc::clone(&self.inner))
    }

    fn create_overflow(&self) -> PoolResult<PooledConnection<C>> {
        let shared = self.shared();
        let conn = shared.config.connect().map_err(|err| {
            MetricsTracker::incr(&shared.metrics.connect_failures);
            warn!(pool = %shared.config.name, error = %err, "failed to create on-demand connection");
            PoolError::Connect(err)
        })?;

        MetricsTracker::incr(&shared.metrics.connections_created);
        MetricsTracker::incr(&shared.metrics.overflow_created);
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(self.checkout(Slot { id, conn }, true))
    }
}

type Teardown<C> = Mutex<Option<(Vec<Slot<C>>, Completer)>>;

/// Close the drained connections and fire the close signal, once
fn finish_close<C: Connection>(shared: &Shared<C>, teardown: &Teardown<C>) {
    if let Some((idle, completer)) = teardown.lock().take() {
        shared.close_all(idle);
        info!(pool = %shared.config.name, "connection pool closed");
        completer.complete();
    }
}

impl<C: Connection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.shared().config)
            .field("available", &self.available_count())
            .field("borrowed", &self.borrowed_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
