use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::store::Store;

/// A store that can be shared between threads.
///
/// All writes are serialized by a single lock. Reads, including evaluation
/// of derived values and queries, may run concurrently: every thread has its
/// own tracking stack.
#[derive(Clone, Default)]
pub struct SharedStore(Arc<RwLock<Store>>);

impl SharedStore {
    /// Share a store.
    pub fn new(store: Store) -> Self {
        Self(Arc::new(RwLock::new(store)))
    }

    /// Run `f` with shared read access.
    pub fn read<T>(&self, f: impl FnOnce(&Store) -> T) -> T {
        f(&self.0.read())
    }

    /// Run `f` with exclusive write access.
    pub fn write<T>(&self, f: impl FnOnce(&mut Store) -> T) -> T {
        f(&mut self.0.write())
    }

    /// Acquire shared read access until the guard is dropped.
    pub fn lock_read(&self) -> RwLockReadGuard<'_, Store> {
        self.0.read()
    }

    /// Acquire exclusive write access until the guard is dropped.
    pub fn lock_write(&self) -> RwLockWriteGuard<'_, Store> {
        self.0.write()
    }

    /// Take the store back out if this is the last handle.
    pub fn try_unwrap(self) -> Result<Store, Self> {
        Arc::try_unwrap(self.0).map(RwLock::into_inner).map_err(Self)
    }
}

impl From<Store> for SharedStore {
    fn from(store: Store) -> Self {
        Self::new(store)
    }
}

impl Debug for SharedStore {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.0.try_read() {
            Some(store) => f.debug_tuple("SharedStore").field(&*store).finish(),
            None => f.pad("SharedStore(<locked>)"),
        }
    }
}
