//! Thread store - persistent thread/log metadata
//!
//! Single writer of all replication metadata: thread records (id, read key,
//! member logs) and per-log records (keys, heads, addresses). Mutations are
//! atomic per log; the redb implementation runs each one in its own write
//! transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use weft_model::{Cid, LogId, LogInfo, PeerAddr, ThreadId, ThreadInfo};

use crate::error::Error;

const THREADS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("threads");
const LOGS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("logs");

/// Persistent thread and log metadata.
///
/// `add_log` registers a log under an existing thread (and upserts an
/// existing registration); `set_head` and `add_addrs` mutate a registered
/// log in place.
pub trait ThreadStore: Send + Sync + 'static {
    /// Register a thread. Re-registering an id overwrites its record.
    fn add_thread(&self, info: ThreadInfo) -> Result<(), Error>;

    /// Fetch a thread's metadata.
    fn thread_info(&self, id: &ThreadId) -> Result<Option<ThreadInfo>, Error>;

    /// All registered thread ids.
    fn threads(&self) -> Result<Vec<ThreadId>, Error>;

    /// Register a log under a thread. Fails with `ThreadUnknown` if the
    /// thread is not registered.
    fn add_log(&self, thread: &ThreadId, info: LogInfo) -> Result<(), Error>;

    /// Fetch one log's metadata.
    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<Option<LogInfo>, Error>;

    /// Every log registered under a thread, in registration order.
    fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>, Error>;

    /// Set a log's head frontier to `{head}`.
    fn set_head(&self, thread: &ThreadId, log: &LogId, head: Cid) -> Result<(), Error>;

    /// Merge addresses into a log's address set.
    fn add_addrs(&self, thread: &ThreadId, log: &LogId, addrs: &[PeerAddr]) -> Result<(), Error>;

    /// Remove a thread and all its log records.
    fn delete_thread(&self, id: &ThreadId) -> Result<(), Error>;
}

fn merge_addrs(into: &mut Vec<PeerAddr>, addrs: &[PeerAddr]) {
    for addr in addrs {
        if !into.contains(addr) {
            into.push(*addr);
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ThreadEntry {
    info: ThreadInfo,
    logs: HashMap<LogId, LogInfo>,
}

/// In-memory thread store.
#[derive(Debug, Default)]
pub struct MemThreadStore {
    threads: RwLock<HashMap<ThreadId, ThreadEntry>>,
}

impl MemThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThreadStore for MemThreadStore {
    fn add_thread(&self, info: ThreadInfo) -> Result<(), Error> {
        let mut threads = self.threads.write().unwrap_or_else(|e| e.into_inner());
        match threads.get_mut(&info.id) {
            Some(entry) => entry.info = info,
            None => {
                threads.insert(info.id, ThreadEntry { info, logs: HashMap::new() });
            }
        }
        Ok(())
    }

    fn thread_info(&self, id: &ThreadId) -> Result<Option<ThreadInfo>, Error> {
        let threads = self.threads.read().unwrap_or_else(|e| e.into_inner());
        Ok(threads.get(id).map(|e| e.info.clone()))
    }

    fn threads(&self) -> Result<Vec<ThreadId>, Error> {
        let threads = self.threads.read().unwrap_or_else(|e| e.into_inner());
        Ok(threads.keys().copied().collect())
    }

    fn add_log(&self, thread: &ThreadId, info: LogInfo) -> Result<(), Error> {
        let mut threads = self.threads.write().unwrap_or_else(|e| e.into_inner());
        let entry = threads.get_mut(thread).ok_or(Error::ThreadUnknown(*thread))?;
        if !entry.info.logs.contains(&info.id) {
            entry.info.logs.push(info.id);
        }
        entry.logs.insert(info.id, info);
        Ok(())
    }

    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<Option<LogInfo>, Error> {
        let threads = self.threads.read().unwrap_or_else(|e| e.into_inner());
        Ok(threads.get(thread).and_then(|e| e.logs.get(log).cloned()))
    }

    fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>, Error> {
        let threads = self.threads.read().unwrap_or_else(|e| e.into_inner());
        let entry = threads.get(thread).ok_or(Error::ThreadUnknown(*thread))?;
        Ok(entry
            .info
            .logs
            .iter()
            .filter_map(|id| entry.logs.get(id).cloned())
            .collect())
    }

    fn set_head(&self, thread: &ThreadId, log: &LogId, head: Cid) -> Result<(), Error> {
        let mut threads = self.threads.write().unwrap_or_else(|e| e.into_inner());
        let entry = threads.get_mut(thread).ok_or(Error::ThreadUnknown(*thread))?;
        let info = entry.logs.get_mut(log).ok_or(Error::LogUnknown(*log))?;
        info.heads = vec![head];
        Ok(())
    }

    fn add_addrs(&self, thread: &ThreadId, log: &LogId, addrs: &[PeerAddr]) -> Result<(), Error> {
        let mut threads = self.threads.write().unwrap_or_else(|e| e.into_inner());
        let entry = threads.get_mut(thread).ok_or(Error::ThreadUnknown(*thread))?;
        let info = entry.logs.get_mut(log).ok_or(Error::LogUnknown(*log))?;
        merge_addrs(&mut info.addrs, addrs);
        Ok(())
    }

    fn delete_thread(&self, id: &ThreadId) -> Result<(), Error> {
        let mut threads = self.threads.write().unwrap_or_else(|e| e.into_inner());
        threads.remove(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// redb implementation
// ---------------------------------------------------------------------------

/// Durable thread store backed by redb.
///
/// Tables:
/// - threads: thread_id -> CBOR ThreadInfo
/// - logs: thread_id || log_id -> CBOR LogInfo
pub struct RedbThreadStore {
    db: Database,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| Error::Codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))
}

fn log_key(thread: &ThreadId, log: &LogId) -> [u8; 64] {
    let mut key = [0u8; 64];
    key[..32].copy_from_slice(thread.as_bytes());
    key[32..].copy_from_slice(log.as_bytes());
    key
}

impl RedbThreadStore {
    /// Open or create the thread database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let db = Database::create(path)?;

        // Ensure tables exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(THREADS_TABLE)?;
            let _ = write_txn.open_table(LOGS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl ThreadStore for RedbThreadStore {
    fn add_thread(&self, info: ThreadInfo) -> Result<(), Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(THREADS_TABLE)?;
            table.insert(info.id.as_ref(), encode(&info)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn thread_info(&self, id: &ThreadId) -> Result<Option<ThreadInfo>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(THREADS_TABLE)?;
        match table.get(id.as_ref())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn threads(&self) -> Result<Vec<ThreadId>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(THREADS_TABLE)?;

        let mut ids = Vec::new();
        for result in table.iter()? {
            let (key, _) = result?;
            if let Ok(id) = ThreadId::try_from(key.value()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn add_log(&self, thread: &ThreadId, info: LogInfo) -> Result<(), Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut threads = write_txn.open_table(THREADS_TABLE)?;
            let mut thread_info: ThreadInfo = match threads.get(thread.as_ref())? {
                Some(value) => decode(value.value())?,
                None => return Err(Error::ThreadUnknown(*thread)),
            };
            if !thread_info.logs.contains(&info.id) {
                thread_info.logs.push(info.id);
                threads.insert(thread.as_ref(), encode(&thread_info)?.as_slice())?;
            }

            let mut logs = write_txn.open_table(LOGS_TABLE)?;
            logs.insert(log_key(thread, &info.id).as_slice(), encode(&info)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<Option<LogInfo>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOGS_TABLE)?;
        match table.get(log_key(thread, log).as_slice())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>, Error> {
        let info = self.thread_info(thread)?.ok_or(Error::ThreadUnknown(*thread))?;
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOGS_TABLE)?;

        let mut logs = Vec::with_capacity(info.logs.len());
        for id in &info.logs {
            if let Some(value) = table.get(log_key(thread, id).as_slice())? {
                logs.push(decode(value.value())?);
            }
        }
        Ok(logs)
    }

    fn set_head(&self, thread: &ThreadId, log: &LogId, head: Cid) -> Result<(), Error> {
        self.update_log(thread, log, |info| info.heads = vec![head])
    }

    fn add_addrs(&self, thread: &ThreadId, log: &LogId, addrs: &[PeerAddr]) -> Result<(), Error> {
        self.update_log(thread, log, |info| merge_addrs(&mut info.addrs, addrs))
    }

    fn delete_thread(&self, id: &ThreadId) -> Result<(), Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut threads = write_txn.open_table(THREADS_TABLE)?;
            let info: Option<ThreadInfo> = match threads.remove(id.as_ref())? {
                Some(value) => Some(decode(value.value())?),
                None => None,
            };

            if let Some(info) = info {
                let mut logs = write_txn.open_table(LOGS_TABLE)?;
                for log in &info.logs {
                    logs.remove(log_key(id, log).as_slice())?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl RedbThreadStore {
    /// Read-modify-write one log record inside a single transaction.
    fn update_log(
        &self,
        thread: &ThreadId,
        log: &LogId,
        apply: impl FnOnce(&mut LogInfo),
    ) -> Result<(), Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOGS_TABLE)?;
            let key = log_key(thread, log);
            let mut info: LogInfo = match table.get(key.as_slice())? {
                Some(value) => decode(value.value())?,
                None => return Err(Error::LogUnknown(*log)),
            };
            apply(&mut info);
            table.insert(key.as_slice(), encode(&info)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn ThreadStore) {
        let thread = ThreadInfo::generate();
        let tid = thread.id;
        let read_key = thread.read_key;

        // Logs cannot attach to an unregistered thread.
        let orphan = LogInfo::generate(read_key);
        assert!(matches!(
            store.add_log(&tid, orphan),
            Err(Error::ThreadUnknown(t)) if t == tid
        ));

        store.add_thread(thread).unwrap();
        assert_eq!(store.thread_info(&tid).unwrap().unwrap().id, tid);
        assert!(store.threads().unwrap().contains(&tid));

        let own = LogInfo::generate(read_key);
        let replica = LogInfo::replica(
            LogInfo::generate(read_key).pub_key,
            read_key,
            weft_model::FollowKey::generate(),
            Vec::new(),
        );
        store.add_log(&tid, own.clone()).unwrap();
        store.add_log(&tid, replica.clone()).unwrap();

        // Registration order is preserved.
        let logs = store.logs(&tid).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, own.id);
        assert_eq!(logs[1].id, replica.id);

        // Heads update atomically per log.
        let head = Cid([5; 32]);
        store.set_head(&tid, &own.id, head).unwrap();
        assert_eq!(store.log_info(&tid, &own.id).unwrap().unwrap().heads, vec![head]);
        assert!(store.log_info(&tid, &replica.id).unwrap().unwrap().heads.is_empty());

        assert!(matches!(
            store.set_head(&tid, &LogId([1; 32]), head),
            Err(Error::LogUnknown(_))
        ));

        // Addresses merge without duplicates.
        let addr = PeerAddr(weft_model::PubKey([7; 32]));
        store.add_addrs(&tid, &replica.id, &[addr]).unwrap();
        store.add_addrs(&tid, &replica.id, &[addr]).unwrap();
        assert_eq!(store.log_info(&tid, &replica.id).unwrap().unwrap().addrs, vec![addr]);

        store.delete_thread(&tid).unwrap();
        assert!(store.thread_info(&tid).unwrap().is_none());
        assert!(store.log_info(&tid, &own.id).unwrap().is_none());
    }

    #[test]
    fn test_mem_thread_store() {
        exercise(&MemThreadStore::new());
    }

    #[test]
    fn test_redb_thread_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbThreadStore::open(dir.path().join("threads.db")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_redb_thread_store_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("threads.db");

        let thread = ThreadInfo::generate();
        let tid = thread.id;
        let own = LogInfo::generate(thread.read_key);
        let own_id = own.id;
        {
            let store = RedbThreadStore::open(&path).unwrap();
            store.add_thread(thread).unwrap();
            store.add_log(&tid, own).unwrap();
        }

        let store = RedbThreadStore::open(&path).unwrap();
        let reloaded = store.log_info(&tid, &own_id).unwrap().unwrap();
        assert!(reloaded.is_own());
        assert_eq!(store.thread_info(&tid).unwrap().unwrap().logs, vec![own_id]);
    }

    #[test]
    fn test_own_log_survives_roundtrip() {
        let store = MemThreadStore::new();
        let thread = ThreadInfo::generate();
        let tid = thread.id;
        let read_key = thread.read_key;
        store.add_thread(thread).unwrap();

        let own = LogInfo::generate(read_key);
        store.add_log(&tid, own.clone()).unwrap();

        let loaded = store.log_info(&tid, &own.id).unwrap().unwrap();
        let identity = loaded.identity().unwrap();
        assert_eq!(identity.public_key(), own.pub_key);
    }
}
