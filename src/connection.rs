//! Connections held by the pool and the handle lent to callers

use crate::errors::BoxError;
use crate::pool::{PoolInner, Slot};

use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A transport connection the pool can own
///
/// The pool never looks inside a connection; it only closes it when the
/// connection is reported bad or when the pool shuts down.
pub trait Connection: Send + 'static {
    /// Close the underlying transport
    fn close(&mut self) -> Result<(), BoxError>;
}

impl Connection for TcpStream {
    fn close(&mut self) -> Result<(), BoxError> {
        match self.shutdown(Shutdown::Both) {
            // The peer may already have torn the socket down
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Into::into),
        }
    }
}

/// A connection borrowed from a [`Pool`](crate::Pool)
///
/// Hand it back with [`Pool::release`](crate::Pool::release) or simply drop
/// it. A handle marked bad is closed on return and the pool opens a fresh
/// connection in the background.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{BoxError, Configuration, Connection, Pool};
/// use std::time::Duration;
///
/// struct Loopback;
///
/// impl Connection for Loopback {
///     fn close(&mut self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// let pool = Pool::new(Configuration::new("doc", 1, "loopback", |_| Ok(Loopback)));
/// pool.init().wait().unwrap();
///
/// let conn = pool.get(Duration::from_millis(10), false).unwrap();
/// let id = conn.id();
/// pool.release(conn);
///
/// let again = pool.get(Duration::from_millis(10), false).unwrap();
/// assert_eq!(again.id(), id);
/// ```
pub struct PooledConnection<C: Connection> {
    slot: Option<Slot<C>>,
    bad: bool,
    overflow: bool,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connection> PooledConnection<C> {
    pub(crate) fn new(slot: Slot<C>, overflow: bool, pool: Arc<PoolInner<C>>) -> Self {
        Self {
            slot: Some(slot),
            bad: false,
            overflow,
            pool,
        }
    }

    /// Identifier of the pooled connection, stable across release and get
    pub fn id(&self) -> u64 {
        self.slot().id
    }

    /// Report the connection as unusable so the pool replaces it
    pub fn mark_bad(&mut self) {
        self.bad = true;
    }

    pub fn set_bad(&mut self, bad: bool) {
        self.bad = bad;
    }

    pub fn is_bad(&self) -> bool {
        self.bad
    }

    /// True when the connection was created beyond the pool's capacity
    pub fn is_overflow(&self) -> bool {
        self.overflow
    }

    pub fn get_ref(&self) -> &C {
        &self.slot().conn
    }

    pub fn get_mut(&mut self) -> &mut C {
        &mut self.slot_mut().conn
    }

    fn slot(&self) -> &Slot<C> {
        self.slot.as_ref().expect("connection already returned")
    }

    fn slot_mut(&mut self) -> &mut Slot<C> {
        self.slot.as_mut().expect("connection already returned")
    }
}

impl<C: Connection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.get_ref()
    }
}

impl<C: Connection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.get_mut()
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.shared.give_back(slot, self.bad, self.overflow);
        }
    }
}

impl<C: Connection> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.slot.as_ref().map(|s| s.id))
            .field("bad", &self.bad)
            .field("overflow", &self.overflow)
            .finish_non_exhaustive()
    }
}
