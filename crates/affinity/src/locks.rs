//! Per-User Lock Table
//!
//! Actions from the same user must be processed one at a time so the engine
//! sees consistent weight snapshots; actions from different users proceed in
//! parallel. Locks are created on first use through the map's entry API, so
//! two tasks racing to create a user's lock end up sharing the same one.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Get-or-create table of per-user mutexes
pub struct UserLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Get the lock for a user, creating it if absent
    pub fn lock_for(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of users with a lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_user_shares_one_lock() {
        let locks = UserLocks::new();
        let first = locks.lock_for(42);
        let second = locks.lock_for(42);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_users_get_different_locks() {
        let locks = UserLocks::new();
        let first = locks.lock_for(1);
        let second = locks.lock_for(2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_lock_excludes_second_holder() {
        let locks = UserLocks::new();
        let lock = locks.lock_for(42);

        let guard = lock.lock().await;
        assert!(locks.lock_for(42).try_lock().is_err());
        drop(guard);
        assert!(locks.lock_for(42).try_lock().is_ok());
    }
}
