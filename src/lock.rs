//! Mutex coordination.
//!
//! Two independent locks protect the link:
//!
//! - `noteLock` (inside [`Notecard`](crate::Notecard)) - one request/response
//!   exchange in flight at a time, regardless of transport. It owns the
//!   transport registry, so registration cannot race a transaction.
//! - [`IoLock`] - raw access to the I2C bus. The bus is usually shared with
//!   other peripherals, so this lock is a cloneable handle that the rest of
//!   the host uses too.
//!
//! Lock order is always `noteLock` then `IoLock`. The I2C framer holds the
//! `IoLock` only around individual bus transfers, so other bus users get the
//! bus between chunks of a long exchange. Both locks are async: a waiter
//! suspends rather than spinning, and every guard releases on drop.
//!
//! # Example
//!
//! ```ignore
//! let io = notecard.io_lock();
//! {
//!     let _bus = io.lock().await;
//!     // talk to another sensor on the same I2C bus
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// Shared lock guarding raw I2C bus access.
#[derive(Debug, Clone, Default)]
pub struct IoLock {
    inner: Arc<Mutex<()>>,
}

/// Scoped I2C bus access; released on drop.
#[must_use = "the bus is released as soon as the guard is dropped"]
pub struct IoGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Scoped I2C bus access not tied to a borrow of the lock.
#[must_use = "the bus is released as soon as the guard is dropped"]
pub struct OwnedIoGuard {
    _guard: OwnedMutexGuard<()>,
}

impl IoLock {
    /// Create a new, unshared lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the bus.
    pub async fn lock(&self) -> IoGuard<'_> {
        IoGuard {
            _guard: self.inner.lock().await,
        }
    }

    /// Wait for the bus, returning a guard that can move between tasks.
    pub async fn lock_owned(&self) -> OwnedIoGuard {
        OwnedIoGuard {
            _guard: self.inner.clone().lock_owned().await,
        }
    }

    /// Take the bus if it is free right now.
    pub fn try_lock(&self) -> Option<IoGuard<'_>> {
        self.inner
            .try_lock()
            .ok()
            .map(|guard| IoGuard { _guard: guard })
    }

    /// True if someone currently holds the bus.
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// True if both handles guard the same bus.
    pub fn same_bus(&self, other: &IoLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
