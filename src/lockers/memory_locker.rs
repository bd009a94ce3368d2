use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use salvo_core::async_trait;
use tokio::sync::RwLock;

use crate::error::TusResult;
use crate::lockers::{LockGuard, Locker};

const SHARD_COUNT: usize = 16;

type Registry = Mutex<HashMap<String, Arc<RwLock<()>>>>;

/// In-process per-id locks for a single-node deployment, which is all this
/// engine coordinates.
///
/// The registry is split into hash shards so unrelated uploads never
/// serialize on one map lock, and each checkout sweeps its shard of locks
/// nobody holds anymore; a long-lived server does not accumulate an entry
/// per upload it has ever seen. The registry mutexes are only ever held for
/// a map operation, never across an await.
#[derive(Clone)]
pub struct MemoryLocker {
    shards: Arc<[Registry; SHARD_COUNT]>,
}

impl MemoryLocker {
    pub fn new() -> Self {
        Self {
            shards: Arc::new(std::array::from_fn(|_| Mutex::new(HashMap::new()))),
        }
    }

    fn shard(&self, id: &str) -> &Registry {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    /// Hands out the lock for `id`, sweeping dead entries from its shard on
    /// the way. A poisoned registry mutex only means another thread panicked
    /// holding a map guard; the map itself stays usable.
    fn checkout(&self, id: &str) -> Arc<RwLock<()>> {
        let mut registry = self
            .shard(id)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registry.retain(|_, lock| Arc::strong_count(lock) > 1);
        registry.entry(id.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .len()
            })
            .sum()
    }
}

impl Default for MemoryLocker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Locker for MemoryLocker {
    async fn read_lock(&self, id: &str) -> TusResult<LockGuard> {
        Ok(LockGuard::read(self.checkout(id).read_owned().await))
    }

    async fn write_lock(&self, id: &str) -> TusResult<LockGuard> {
        Ok(LockGuard::write(self.checkout(id).write_owned().await))
    }
}
