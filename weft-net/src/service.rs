//! ThreadNetwork - the network-facing service facade
//!
//! Composes the local [`ThreadService`] with the replication client, the
//! inbound server loop, and optional gossip: `add` writes locally then fans
//! out to every known address; inbound pushes land through the server into
//! the same service; head announcements trigger fetches of missing history.

use std::sync::Arc;

use prost::Message;
use tokio::sync::broadcast;

use weft_core::{
    codec, AddSettings, Error, ParsedRecord, PullSettings, PutSettings, RecordBundle,
    ThreadService,
};
use weft_model::{Cid, LogId, LogIdentity, LogInfo, PeerAddr, PubKey, ThreadId, ThreadInfo};
use weft_net_types::{GossipLayer, Transport};

use crate::client::ReplicationClient;
use crate::error::NetError;
use crate::proto::{peer_message, HeadAnnounce, PeerMessage};
use crate::server;

/// A cheaply cloneable handle over the composed service; every clone shares
/// the same stores, transport, and gossip state.
pub struct ThreadNetwork<T: Transport> {
    service: Arc<ThreadService>,
    transport: Arc<T>,
    client: Arc<ReplicationClient<T>>,
    gossip: Option<Arc<dyn GossipLayer>>,
}

impl<T: Transport> Clone for ThreadNetwork<T> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            transport: self.transport.clone(),
            client: self.client.clone(),
            gossip: self.gossip.clone(),
        }
    }
}

impl<T: Transport> ThreadNetwork<T> {
    /// Build the facade and spawn the inbound accept loop.
    ///
    /// `identity` signs push envelopes and should be the same keypair the
    /// transport binds its endpoint to.
    pub fn new(
        service: Arc<ThreadService>,
        transport: Arc<T>,
        identity: LogIdentity,
        gossip: Option<Arc<dyn GossipLayer>>,
    ) -> Self {
        let client = Arc::new(ReplicationClient::new(transport.clone(), identity, service.clone()));

        // Inbound: accept connections for as long as the transport lives.
        let accept_transport = transport.clone();
        let backend = service.clone();
        tokio::spawn(async move {
            while let Some(conn) = accept_transport.accept().await {
                tokio::spawn(server::handle_connection(backend.clone(), conn));
            }
            tracing::debug!("accept loop ended");
        });

        Self { service, transport, client, gossip }
    }

    /// The local service underneath.
    pub fn service(&self) -> &Arc<ThreadService> {
        &self.service
    }

    /// This host's public key.
    pub fn public_key(&self) -> PubKey {
        self.transport.public_key()
    }

    /// Create a new thread with a fresh read key.
    pub fn create_thread(&self) -> Result<ThreadInfo, Error> {
        self.service.create_thread()
    }

    /// Register a thread from out-of-band material.
    pub fn register_thread(&self, info: ThreadInfo, logs: Vec<LogInfo>) -> Result<(), Error> {
        self.service.register_thread(info, logs)
    }

    /// Append a record to the own log, then push it to every known address
    /// of the thread's other logs and to `settings.addrs`.
    ///
    /// The first push failure is surfaced; earlier pushes are not rolled
    /// back and the local head stays advanced (retries are the caller's
    /// responsibility).
    pub async fn add(
        &self,
        body: &[u8],
        settings: AddSettings,
    ) -> Result<(LogId, ParsedRecord), Error> {
        let (own, parsed, bundle) = self.service.create_record(body, &settings).await?;
        let payload = codec::marshal(&bundle)?;
        let me = self.transport.public_key();

        for info in self.service.logs(&settings.thread)? {
            if info.id == own.id {
                continue;
            }
            for addr in &info.addrs {
                if addr.peer() == &me {
                    continue;
                }
                self.client
                    .push(&payload, &settings.thread, &own.id, addr)
                    .await
                    .map_err(Error::from)?;
            }
        }
        for addr in &settings.addrs {
            if addr.peer() == &me {
                continue;
            }
            self.client
                .push(&payload, &settings.thread, &own.id, addr)
                .await
                .map_err(Error::from)?;
        }

        self.announce_head(&settings.thread, &own.id, parsed.cid).await;
        Ok((own.id, parsed))
    }

    /// Ingest a record bundle into a registered log.
    pub async fn put(&self, bundle: &RecordBundle, settings: PutSettings) -> Result<Cid, Error> {
        self.service.put(bundle, settings).await
    }

    /// Walk a log backward through the local store.
    pub fn pull(
        &self,
        thread: &ThreadId,
        log: &LogId,
        settings: &PullSettings,
    ) -> Result<Vec<ParsedRecord>, Error> {
        self.service.pull(thread, log, settings)
    }

    /// Snapshot of every log registered in the thread.
    pub fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>, Error> {
        self.service.logs(thread)
    }

    /// Delete a thread and its blocks.
    pub fn delete(&self, thread: &ThreadId) -> Result<(), Error> {
        self.service.delete(thread)
    }

    /// Fetch remote history for a registered log and ingest it locally.
    ///
    /// Records are requested newest-first from `addr`, ingested oldest-first
    /// so the head lands on the newest, and returned newest-first.
    pub async fn fetch(
        &self,
        thread: &ThreadId,
        log: &LogId,
        addr: &PeerAddr,
        settings: PullSettings,
    ) -> Result<Vec<ParsedRecord>, Error> {
        let info = self
            .service
            .store()
            .log_info(thread, log)?
            .ok_or(Error::LogUnknown(*log))?;

        let payloads = self
            .client
            .fetch(thread, log, addr, settings.offset, settings.limit)
            .await
            .map_err(Error::from)?;

        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads.iter().rev() {
            let (parsed, bundle) = codec::unmarshal(payload, &info.follow_key)?;
            self.service
                .put(&bundle, PutSettings { thread: *thread, log: *log })
                .await?;
            records.push(parsed);
        }
        records.reverse();
        Ok(records)
    }

    /// Join the thread's gossip topic and react to head announcements by
    /// fetching missing history from the announcing peer.
    pub async fn subscribe_gossip(&self, thread: ThreadId) -> Result<(), Error> {
        let Some(gossip) = self.gossip.clone() else {
            return Ok(());
        };

        let me = self.transport.public_key();
        let peers: Vec<PubKey> = self
            .service
            .logs(&thread)?
            .iter()
            .flat_map(|l| l.addrs.iter().map(|a| *a.peer()))
            .filter(|p| p != &me)
            .collect();

        let mut rx = gossip
            .subscribe(thread, peers)
            .await
            .map_err(|e| Error::from(NetError::from(e)))?;

        let network = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok((sender, bytes)) => network.handle_announce(sender, &bytes).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(thread = %thread, skipped = n, "gossip receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }

    /// Publish a head notification. Best-effort: gossip accelerates
    /// convergence, pushes remain authoritative.
    async fn announce_head(&self, thread: &ThreadId, log: &LogId, head: Cid) {
        let Some(gossip) = &self.gossip else {
            return;
        };
        let msg = PeerMessage::head_announce(HeadAnnounce {
            thread_id: thread.as_ref().to_vec(),
            log_id: log.as_ref().to_vec(),
            head: head.as_ref().to_vec(),
        });
        if let Err(e) = gossip.broadcast(*thread, msg.encode_to_vec()).await {
            tracing::debug!(thread = %thread, error = %e, "head announce failed");
        }
    }

    async fn handle_announce(&self, sender: PubKey, bytes: &[u8]) {
        if sender == self.transport.public_key() {
            return;
        }
        let Ok(msg) = PeerMessage::decode(bytes) else {
            return;
        };
        let Some(peer_message::Message::HeadAnnounce(announce)) = msg.message else {
            return;
        };
        let (Ok(thread), Ok(log), Ok(head)) = (
            ThreadId::try_from(announce.thread_id.as_slice()),
            LogId::try_from(announce.log_id.as_slice()),
            Cid::try_from(announce.head.as_slice()),
        ) else {
            return;
        };

        // Only registered logs are worth chasing, and only unseen heads.
        let Ok(Some(info)) = self.service.store().log_info(&thread, &log) else {
            return;
        };
        if info.heads.contains(&head) || self.service.blocks().has(&head).unwrap_or(false) {
            return;
        }

        tracing::debug!(thread = %thread, log = %log, head = %head, "announced head unknown, fetching");
        let settings = PullSettings { offset: Some(head), ..Default::default() };
        if let Err(e) = self.fetch(&thread, &log, &PeerAddr(sender), settings).await {
            tracing::debug!(thread = %thread, log = %log, error = %e, "gossip-triggered fetch failed");
        }
    }
}
