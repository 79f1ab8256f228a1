//! Log manager - log lifecycle and head advancement
//!
//! Owns no state of its own; everything it knows flows through the thread
//! store. The own log (the sole log in a thread with a private key) is
//! created lazily on first write; replica logs are registered when the first
//! record arrives from an unknown peer, or when an invite is ingested.

use std::sync::Arc;

use weft_model::{Cid, FollowKey, LogId, LogInfo, PeerAddr, PubKey, ThreadId};

use crate::error::Error;
use crate::thread_store::ThreadStore;

#[derive(Clone)]
pub struct LogManager {
    store: Arc<dyn ThreadStore>,
}

impl LogManager {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        Self { store }
    }

    /// Return the thread's own log, creating it if the thread has none yet.
    ///
    /// Fails with `ThreadUnknown` if the thread is not registered.
    pub fn get_or_create_own_log(&self, thread: &ThreadId) -> Result<LogInfo, Error> {
        let info = self
            .store
            .thread_info(thread)?
            .ok_or(Error::ThreadUnknown(*thread))?;

        for log in self.store.logs(thread)? {
            if log.is_own() {
                return Ok(log);
            }
        }

        let log = LogInfo::generate(info.read_key);
        tracing::debug!(thread = %thread, log = %log.id, "created own log");
        self.store.add_log(thread, log.clone())?;
        Ok(log)
    }

    /// Return the registered log for `pub_key`, creating a replica record
    /// from the supplied material if it is unknown. Known logs absorb the
    /// new address.
    pub fn get_or_create_log(
        &self,
        thread: &ThreadId,
        pub_key: PubKey,
        follow_key: FollowKey,
        addr: PeerAddr,
    ) -> Result<LogInfo, Error> {
        let info = self
            .store
            .thread_info(thread)?
            .ok_or(Error::ThreadUnknown(*thread))?;

        let id = LogId::for_pub_key(&pub_key);
        if let Some(existing) = self.store.log_info(thread, &id)? {
            self.store.add_addrs(thread, &id, &[addr])?;
            return Ok(existing);
        }

        let log = LogInfo::replica(pub_key, info.read_key, follow_key, vec![addr]);
        tracing::debug!(thread = %thread, log = %log.id, "registered replica log");
        self.store.add_log(thread, log.clone())?;
        Ok(log)
    }

    /// Set a log's frontier to `{head}`.
    ///
    /// Monotonicity is the caller's concern: appenders hold the per-log
    /// append lock and chain from the prior head; the manager does not
    /// detect forks.
    pub fn advance_head(&self, thread: &ThreadId, log: &LogId, head: Cid) -> Result<(), Error> {
        self.store.set_head(thread, log, head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread_store::MemThreadStore;
    use weft_model::ThreadInfo;

    fn manager_with_thread() -> (LogManager, ThreadId) {
        let store = Arc::new(MemThreadStore::new());
        let thread = ThreadInfo::generate();
        let id = thread.id;
        store.add_thread(thread).unwrap();
        (LogManager::new(store), id)
    }

    #[test]
    fn test_own_log_created_once() {
        let (manager, thread) = manager_with_thread();

        let first = manager.get_or_create_own_log(&thread).unwrap();
        assert!(first.is_own());

        let second = manager.get_or_create_own_log(&thread).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_own_log_requires_thread() {
        let manager = LogManager::new(Arc::new(MemThreadStore::new()));
        let unknown = ThreadId::random();
        assert!(matches!(
            manager.get_or_create_own_log(&unknown),
            Err(Error::ThreadUnknown(t)) if t == unknown
        ));
    }

    #[test]
    fn test_replica_registration_and_addr_merge() {
        let (manager, thread) = manager_with_thread();
        let pub_key = PubKey([9; 32]);
        let follow_key = FollowKey::generate();
        let addr_a = PeerAddr(PubKey([1; 32]));
        let addr_b = PeerAddr(PubKey([2; 32]));

        let created = manager
            .get_or_create_log(&thread, pub_key, follow_key, addr_a)
            .unwrap();
        assert!(!created.is_own());
        assert_eq!(created.addrs, vec![addr_a]);

        // Second contact from another address: same log, address absorbed.
        let existing = manager
            .get_or_create_log(&thread, pub_key, follow_key, addr_b)
            .unwrap();
        assert_eq!(existing.id, created.id);

        let manager_store_view = manager.store.log_info(&thread, &created.id).unwrap().unwrap();
        assert_eq!(manager_store_view.addrs, vec![addr_a, addr_b]);
    }

    #[test]
    fn test_advance_head() {
        let (manager, thread) = manager_with_thread();
        let log = manager.get_or_create_own_log(&thread).unwrap();

        let head = Cid([4; 32]);
        manager.advance_head(&thread, &log.id, head).unwrap();
        let reloaded = manager.store.log_info(&thread, &log.id).unwrap().unwrap();
        assert_eq!(reloaded.heads, vec![head]);
    }
}
