mod memory_locker;

pub use memory_locker::MemoryLocker;
use salvo_core::async_trait;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};

use crate::error::TusResult;

/// Serializes access per upload id. The engine holds a write lock for the
/// whole of a mutating request (POST after id assignment, PATCH, DELETE) and
/// a read lock while streaming a download; HEAD reads without locking.
#[async_trait]
pub trait Locker: Send + Sync + 'static {
    async fn read_lock(&self, id: &str) -> TusResult<LockGuard>;
    async fn write_lock(&self, id: &str) -> TusResult<LockGuard>;
}

/// Held for the duration of the request touching the upload.
pub struct LockGuard {
    _guard: Guard,
}

enum Guard {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

impl LockGuard {
    pub(crate) fn read(guard: OwnedRwLockReadGuard<()>) -> Self {
        Self {
            _guard: Guard::Read(guard),
        }
    }

    pub(crate) fn write(guard: OwnedRwLockWriteGuard<()>) -> Self {
        Self {
            _guard: Guard::Write(guard),
        }
    }
}
