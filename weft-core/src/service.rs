//! Thread service - local append, put, pull, and invite semantics
//!
//! The half of the service facade that touches no network: building records
//! chained onto the own log, ingesting records pushed by peers, walking
//! history backward, and constructing/ingesting invites. The network facade
//! composes this with a replication client and server.
//!
//! Ordering rules:
//! - Appends to one log are serialized by a per-(thread, log) lock so each
//!   record's `prev` equals the prior head.
//! - Blocks are persisted to the CAS before the head advances; a head never
//!   points at an absent block, no matter where a caller's future is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use weft_model::{
    Cid, FollowKey, LogId, LogInfo, PeerAddr, PubKey, ReadKey, ThreadId, ThreadInfo,
};

use crate::block_store::BlockStore;
use crate::codec::{self, Invite, ParsedRecord, RecordBundle};
use crate::error::Error;
use crate::log_manager::LogManager;
use crate::thread_store::ThreadStore;

/// Default number of records a pull walks when the caller gives no limit.
pub const DEFAULT_PULL_LIMIT: usize = 32;

/// Settings for `add`: the target thread, extra fan-out addresses, and an
/// optional body-key override (defaults to the thread read key).
#[derive(Debug, Clone)]
pub struct AddSettings {
    pub thread: ThreadId,
    pub addrs: Vec<PeerAddr>,
    pub key: Option<ReadKey>,
}

impl AddSettings {
    pub fn new(thread: ThreadId) -> Self {
        Self { thread, addrs: Vec::new(), key: None }
    }
}

/// Settings for `put`: which log of which thread the record belongs to.
#[derive(Debug, Clone, Copy)]
pub struct PutSettings {
    pub thread: ThreadId,
    pub log: LogId,
}

/// Settings for `pull`: where to start walking and how far.
///
/// `offset` defaults to the log's first head; `limit` to
/// [`DEFAULT_PULL_LIMIT`].
#[derive(Debug, Clone, Copy)]
pub struct PullSettings {
    pub offset: Option<Cid>,
    pub limit: usize,
}

impl Default for PullSettings {
    fn default() -> Self {
        Self { offset: None, limit: DEFAULT_PULL_LIMIT }
    }
}

/// The operations the replication server needs from the service. Injected at
/// server construction so the server never holds a reference back to the
/// network facade.
#[async_trait]
pub trait ServerBackend: Send + Sync + 'static {
    /// Thread metadata lookup.
    fn thread_info(&self, thread: &ThreadId) -> Result<Option<ThreadInfo>, Error>;

    /// Log metadata lookup.
    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<Option<LogInfo>, Error>;

    /// Register a replica log for an unknown sender, or absorb the address
    /// into an existing registration.
    fn register_replica(
        &self,
        thread: &ThreadId,
        pub_key: PubKey,
        follow_key: FollowKey,
        addr: PeerAddr,
    ) -> Result<LogInfo, Error>;

    /// Persist an inbound record bundle and advance the sender's head.
    async fn put_record(&self, bundle: &RecordBundle, settings: PutSettings) -> Result<Cid, Error>;

    /// Build an invite enumerating every log currently known for the thread.
    fn build_invite(&self, thread: &ThreadId) -> Result<Invite, Error>;

    /// Load marshalable bundles walking backward from `offset` (default: the
    /// log's head), newest-first, at most `limit`.
    fn load_bundles(
        &self,
        thread: &ThreadId,
        log: &LogId,
        offset: Option<Cid>,
        limit: usize,
    ) -> Result<Vec<RecordBundle>, Error>;
}

/// Local thread service: owns nothing but handles to the two stores.
pub struct ThreadService {
    store: Arc<dyn ThreadStore>,
    blocks: Arc<dyn BlockStore>,
    manager: LogManager,
    /// Per-(thread, log) append locks serializing head advancement.
    append_locks: Mutex<HashMap<(ThreadId, LogId), Arc<Mutex<()>>>>,
    /// Per-thread locks serializing own-log creation, so concurrent first
    /// appends cannot each mint a keypair.
    own_log_locks: Mutex<HashMap<ThreadId, Arc<Mutex<()>>>>,
}

impl ThreadService {
    pub fn new(store: Arc<dyn ThreadStore>, blocks: Arc<dyn BlockStore>) -> Arc<Self> {
        let manager = LogManager::new(store.clone());
        Arc::new(Self {
            store,
            blocks,
            manager,
            append_locks: Mutex::new(HashMap::new()),
            own_log_locks: Mutex::new(HashMap::new()),
        })
    }

    /// The thread store handle.
    pub fn store(&self) -> &Arc<dyn ThreadStore> {
        &self.store
    }

    /// The block store handle.
    pub fn blocks(&self) -> &Arc<dyn BlockStore> {
        &self.blocks
    }

    /// Create a new thread with a fresh read key.
    pub fn create_thread(&self) -> Result<ThreadInfo, Error> {
        let info = ThreadInfo::generate();
        tracing::info!(thread = %info.id, "created thread");
        self.store.add_thread(info.clone())?;
        Ok(info)
    }

    /// Register a thread from externally supplied material (out-of-band
    /// invite: id, read key, and any already-known logs).
    pub fn register_thread(&self, info: ThreadInfo, logs: Vec<LogInfo>) -> Result<(), Error> {
        let id = info.id;
        self.store.add_thread(ThreadInfo { logs: Vec::new(), ..info })?;
        for log in logs {
            self.store.add_log(&id, log.without_priv_key())?;
        }
        Ok(())
    }

    /// Build and persist a record chaining `body` onto the own log.
    ///
    /// Returns the log written to, the parsed record, and the full bundle
    /// for replication. The head has already advanced when this returns.
    pub async fn create_record(
        &self,
        body: &[u8],
        settings: &AddSettings,
    ) -> Result<(LogInfo, ParsedRecord, RecordBundle), Error> {
        let own = {
            let _create_guard = self.own_log_lock(&settings.thread).await;
            self.manager.get_or_create_own_log(&settings.thread)?
        };
        let Some(identity) = own.identity() else {
            return Err(Error::LogUnknown(own.id));
        };

        let _guard = self.append_lock(&settings.thread, &own.id).await;

        // Re-read under the lock: another append may have advanced the head
        // between log resolution and lock acquisition.
        let own = self
            .store
            .log_info(&settings.thread, &own.id)?
            .ok_or(Error::LogUnknown(own.id))?;

        let key = settings.key.unwrap_or(own.read_key);
        let sealed = codec::create_event(body, &key, &own.follow_key)?;
        let (record, parsed) =
            codec::create_record(sealed.event.cid, own.head(), &identity, &own.follow_key)?;
        let bundle = RecordBundle::new(record, sealed);

        self.persist_and_advance(&settings.thread, &own.id, &parsed, &bundle)?;
        tracing::debug!(thread = %settings.thread, log = %own.id, record = %parsed.cid, "appended record");
        Ok((own, parsed, bundle))
    }

    /// Persist an already-verified bundle and advance the target log's head.
    ///
    /// The inbound half of replication. Fails with `LogUnknown` if the log
    /// is not registered, `CryptoAuth` if the record was not signed by the
    /// log's key, and `InvalidEvent` if the event block is structurally
    /// unsound.
    pub async fn put(&self, bundle: &RecordBundle, settings: PutSettings) -> Result<Cid, Error> {
        if self.store.thread_info(&settings.thread)?.is_none() {
            return Err(Error::ThreadUnknown(settings.thread));
        }
        let log = self
            .store
            .log_info(&settings.thread, &settings.log)?
            .ok_or(Error::LogUnknown(settings.log))?;

        let parsed = codec::read_record(&bundle.record.data, &log.follow_key)?;
        if parsed.pub_key != log.pub_key {
            return Err(Error::CryptoAuth(weft_model::CryptoError::InvalidSignature));
        }

        let links = codec::event_links(&bundle.event.data).map_err(|_| Error::InvalidEvent)?;
        if parsed.event != bundle.event.cid
            || links.header != bundle.header.cid
            || links.body != bundle.body.cid
        {
            return Err(Error::InvalidEvent);
        }

        let _guard = self.append_lock(&settings.thread, &settings.log).await;
        self.persist_and_advance(&settings.thread, &settings.log, &parsed, bundle)?;
        tracing::debug!(thread = %settings.thread, log = %settings.log, record = %parsed.cid, "put record");
        Ok(parsed.cid)
    }

    /// Walk a log backward from `offset` (default: its first head),
    /// returning up to `limit` records newest-first.
    ///
    /// Any missing block fails the whole walk; no partial prefix is
    /// returned.
    pub fn pull(
        &self,
        thread: &ThreadId,
        log: &LogId,
        settings: &PullSettings,
    ) -> Result<Vec<ParsedRecord>, Error> {
        if self.store.thread_info(thread)?.is_none() {
            return Err(Error::ThreadUnknown(*thread));
        }
        let info = self
            .store
            .log_info(thread, log)?
            .ok_or(Error::LogUnknown(*log))?;

        let mut offset = settings.offset.or_else(|| info.head());
        let mut records = Vec::new();
        while records.len() < settings.limit {
            let Some(cid) = offset else { break };
            let data = self.blocks.get(&cid)?.ok_or(Error::NotFound(cid))?;
            let record = codec::read_record(&data, &info.follow_key)?;
            offset = record.prev;
            records.push(record);
        }
        Ok(records)
    }

    /// Snapshot of every log registered in the thread.
    pub fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>, Error> {
        self.store.logs(thread)
    }

    /// Remove a thread: best-effort deletion of every reachable block, then
    /// the metadata. Blocks already missing (or unreadable) are skipped.
    pub fn delete(&self, thread: &ThreadId) -> Result<(), Error> {
        if self.store.thread_info(thread)?.is_none() {
            return Err(Error::ThreadUnknown(*thread));
        }

        for log in self.store.logs(thread)? {
            let mut offset = log.head();
            while let Some(cid) = offset {
                match self.load_bundle(&log, cid) {
                    Ok((parsed, bundle)) => {
                        offset = parsed.prev;
                        for block in [&bundle.record, &bundle.event, &bundle.header, &bundle.body] {
                            self.blocks.delete(&block.cid)?;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(thread = %thread, log = %log.id, record = %cid, error = %err,
                            "stopping chain deletion early");
                        break;
                    }
                }
            }
        }

        tracing::info!(thread = %thread, "deleted thread");
        self.store.delete_thread(thread)
    }

    /// Merge invite contents into the thread: unknown logs are registered
    /// (private keys never imported), known logs absorb the new addresses.
    pub fn ingest_invite(&self, thread: &ThreadId, logs: Vec<LogInfo>) -> Result<(), Error> {
        for log in logs {
            match self.store.log_info(thread, &log.id)? {
                Some(_) => self.store.add_addrs(thread, &log.id, &log.addrs)?,
                None => self.store.add_log(thread, log.without_priv_key())?,
            }
        }
        Ok(())
    }

    /// Load the full bundle for one record out of the CAS.
    fn load_bundle(&self, log: &LogInfo, cid: Cid) -> Result<(ParsedRecord, RecordBundle), Error> {
        let record_data = self.blocks.get(&cid)?.ok_or(Error::NotFound(cid))?;
        let parsed = codec::read_record(&record_data, &log.follow_key)?;

        let event_data = self.blocks.get(&parsed.event)?.ok_or(Error::NotFound(parsed.event))?;
        let links = codec::event_links(&event_data)?;
        let header_data = self.blocks.get(&links.header)?.ok_or(Error::NotFound(links.header))?;
        let body_data = self.blocks.get(&links.body)?.ok_or(Error::NotFound(links.body))?;

        let bundle = RecordBundle {
            record: codec::Block::new(record_data),
            event: codec::Block::new(event_data),
            header: codec::Block::new(header_data),
            body: codec::Block::new(body_data),
        };
        Ok((parsed, bundle))
    }

    /// CAS first, head second. The linearization point of every append.
    fn persist_and_advance(
        &self,
        thread: &ThreadId,
        log: &LogId,
        parsed: &ParsedRecord,
        bundle: &RecordBundle,
    ) -> Result<(), Error> {
        self.blocks.put(bundle.body.data.clone())?;
        self.blocks.put(bundle.header.data.clone())?;
        self.blocks.put(bundle.event.data.clone())?;
        self.blocks.put(bundle.record.data.clone())?;
        self.manager.advance_head(thread, log, parsed.cid)
    }

    async fn append_lock(&self, thread: &ThreadId, log: &LogId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.append_locks.lock().await;
            locks
                .entry((*thread, *log))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    async fn own_log_lock(&self, thread: &ThreadId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.own_log_locks.lock().await;
            locks
                .entry(*thread)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[async_trait]
impl ServerBackend for ThreadService {
    fn thread_info(&self, thread: &ThreadId) -> Result<Option<ThreadInfo>, Error> {
        self.store.thread_info(thread)
    }

    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<Option<LogInfo>, Error> {
        self.store.log_info(thread, log)
    }

    fn register_replica(
        &self,
        thread: &ThreadId,
        pub_key: PubKey,
        follow_key: FollowKey,
        addr: PeerAddr,
    ) -> Result<LogInfo, Error> {
        self.manager.get_or_create_log(thread, pub_key, follow_key, addr)
    }

    async fn put_record(&self, bundle: &RecordBundle, settings: PutSettings) -> Result<Cid, Error> {
        self.put(bundle, settings).await
    }

    fn build_invite(&self, thread: &ThreadId) -> Result<Invite, Error> {
        let info = self
            .store
            .thread_info(thread)?
            .ok_or(Error::ThreadUnknown(*thread))?;
        codec::new_invite(self.store.logs(thread)?, info.read_key)
    }

    fn load_bundles(
        &self,
        thread: &ThreadId,
        log: &LogId,
        offset: Option<Cid>,
        limit: usize,
    ) -> Result<Vec<RecordBundle>, Error> {
        if self.store.thread_info(thread)?.is_none() {
            return Err(Error::ThreadUnknown(*thread));
        }
        let info = self
            .store
            .log_info(thread, log)?
            .ok_or(Error::LogUnknown(*log))?;

        let mut offset = offset.or_else(|| info.head());
        let mut bundles = Vec::new();
        while bundles.len() < limit {
            let Some(cid) = offset else { break };
            let (parsed, bundle) = self.load_bundle(&info, cid)?;
            offset = parsed.prev;
            bundles.push(bundle);
        }
        Ok(bundles)
    }
}
