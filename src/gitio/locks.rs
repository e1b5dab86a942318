//! Named in-process locks
//!
//! One lock per sanitised name; exclusive locks are strictly mutual, shared
//! locks admit concurrent readers. Acquisition is bounded by a timeout and
//! reports failure instead of blocking forever. Locks are not reentrant: a
//! holder re-acquiring its own name will time out.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

enum HeldGuard {
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
}

/// Registry of named locks
pub struct LockManager {
    locks: DashMap<String, Arc<RwLock<()>>>,
    held: parking_lot::Mutex<HashMap<String, Vec<HeldGuard>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
            held: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, name: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Acquire the named lock; returns false on timeout
    pub async fn acquire(&self, name: &str, timeout_ms: u64, exclusive: bool) -> bool {
        let lock = self.entry(name);
        let timeout = Duration::from_millis(timeout_ms);
        let guard = if exclusive {
            match tokio::time::timeout(timeout, lock.write_owned()).await {
                Ok(guard) => HeldGuard::Exclusive(guard),
                Err(_) => return false,
            }
        } else {
            match tokio::time::timeout(timeout, lock.read_owned()).await {
                Ok(guard) => HeldGuard::Shared(guard),
                Err(_) => return false,
            }
        };
        self.held
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(guard);
        true
    }

    /// Release one held guard for the name; returns false if none is held
    pub fn release(&self, name: &str) -> bool {
        let mut held = self.held.lock();
        match held.get_mut(name) {
            Some(guards) if !guards.is_empty() => {
                guards.pop();
                if guards.is_empty() {
                    held.remove(name);
                }
                true
            }
            _ => {
                tracing::warn!(lock = name, "release of a lock that is not held");
                false
            }
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
