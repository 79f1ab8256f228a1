//! Replication client
//!
//! Outbound half of replication: pushes marshalled records to the peers
//! advertising other logs, ingests the invite a first contact returns, and
//! fetches remote history with pull requests.
//!
//! Every request is signed by the host identity and carries the pushed
//! log's follow key, so the responder can authenticate the envelope and
//! decrypt the record without any prior state.

use std::sync::Arc;
use std::time::Duration;

use weft_core::{codec, ThreadService};
use weft_model::{Cid, FollowKey, LogId, LogIdentity, PeerAddr, ReadKey, ThreadId};
use weft_net_types::{BiStream, Connection, Transport};

use crate::error::NetError;
use crate::framing::{MessageSink, MessageStream};
use crate::proto::{peer_message, PeerMessage, PullRequest, PushRequest};
use crate::status;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ReplicationClient<T: Transport> {
    transport: Arc<T>,
    identity: LogIdentity,
    service: Arc<ThreadService>,
    timeout: Duration,
}

impl<T: Transport> ReplicationClient<T> {
    pub fn new(transport: Arc<T>, identity: LogIdentity, service: Arc<ThreadService>) -> Self {
        Self { transport, identity, service, timeout: DEFAULT_REQUEST_TIMEOUT }
    }

    /// Override the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Push a marshalled record for `(thread, log)` to one address.
    ///
    /// A `201` response means the responder had never heard from this log:
    /// its body carries an invite enumerating every log the responder knows,
    /// which is decoded under the returned keys and merged into the local
    /// thread store.
    pub async fn push(
        &self,
        payload: &[u8],
        thread: &ThreadId,
        log: &LogId,
        addr: &PeerAddr,
    ) -> Result<(), NetError> {
        let info = self
            .service
            .store()
            .log_info(thread, log)?
            .ok_or(weft_core::Error::LogUnknown(*log))?;

        let request = PushRequest {
            thread_id: thread.as_ref().to_vec(),
            log_id: log.as_ref().to_vec(),
            identity: self.identity.public_key().as_ref().to_vec(),
            signature: self.identity.sign(payload).as_ref().to_vec(),
            follow_key: info.follow_key.as_bytes().to_vec(),
            payload: payload.to_vec(),
        };

        tracing::debug!(thread = %thread, log = %log, addr = %addr, "pushing record");
        let response = self
            .request(addr, PeerMessage::push_request(request))
            .await?;

        let response = match response.message {
            Some(peer_message::Message::PushResponse(res)) => res,
            _ => return Err(NetError::Protocol("expected a push response".into())),
        };

        match response.status {
            status::CREATED => {
                let follow_key = FollowKey::from_bytes(&response.follow_key)
                    .map_err(weft_core::Error::CryptoAuth)?;
                let read_key = ReadKey::from_bytes(&response.read_key)
                    .map_err(weft_core::Error::CryptoAuth)?;

                let (_, bundle) = codec::unmarshal(&response.payload, &follow_key)?;
                let (logs, _) = codec::open_invite(&bundle, &follow_key, &read_key)?;
                tracing::debug!(thread = %thread, logs = logs.len(), "ingesting invite");
                self.service.ingest_invite(thread, logs)?;
                Ok(())
            }
            status::NO_CONTENT => Ok(()),
            other => Err(NetError::Remote { status: other, message: response.error }),
        }
    }

    /// Fetch up to `limit` marshalled bundles for `(thread, log)` from one
    /// address, walking backward from `offset` (default: the responder's
    /// head). Returns raw payloads newest-first; the caller ingests them.
    pub async fn fetch(
        &self,
        thread: &ThreadId,
        log: &LogId,
        addr: &PeerAddr,
        offset: Option<Cid>,
        limit: usize,
    ) -> Result<Vec<Vec<u8>>, NetError> {
        let info = self
            .service
            .store()
            .log_info(thread, log)?
            .ok_or(weft_core::Error::LogUnknown(*log))?;

        let request = PullRequest {
            thread_id: thread.as_ref().to_vec(),
            log_id: log.as_ref().to_vec(),
            follow_key: info.follow_key.as_bytes().to_vec(),
            offset: offset.map(|c| c.as_ref().to_vec()).unwrap_or_default(),
            limit: limit as u32,
        };

        tracing::debug!(thread = %thread, log = %log, addr = %addr, limit, "fetching history");
        let deadline = tokio::time::Instant::now() + self.timeout;
        let conn = self.connect(addr).await?;
        let stream = conn.open_bi().await?;
        let (send, recv) = stream.into_split();
        let mut sink = MessageSink::new(send);
        let mut stream = MessageStream::new(recv);

        sink.send(&PeerMessage::pull_request(request)).await?;

        let mut payloads = Vec::new();
        loop {
            let message = tokio::time::timeout_at(deadline, stream.recv())
                .await
                .map_err(|_| NetError::Timeout)??
                .ok_or(NetError::ConnectionClosed)?;
            let response = match message.message {
                Some(peer_message::Message::PullResponse(res)) => res,
                _ => return Err(NetError::Protocol("expected a pull response".into())),
            };
            if response.status != status::OK {
                return Err(NetError::Remote {
                    status: response.status,
                    message: response.error,
                });
            }
            payloads.extend(response.payloads);
            if response.done {
                break;
            }
        }
        Ok(payloads)
    }

    /// One request/response exchange on a fresh stream, under the deadline.
    async fn request(&self, addr: &PeerAddr, msg: PeerMessage) -> Result<PeerMessage, NetError> {
        let exchange = async {
            let conn = self.connect(addr).await?;
            let stream = conn.open_bi().await?;
            let (send, recv) = stream.into_split();
            let mut sink = MessageSink::new(send);
            let mut stream = MessageStream::new(recv);

            sink.send(&msg).await?;
            stream.recv().await?.ok_or(NetError::ConnectionClosed)
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| NetError::Timeout)?
    }

    async fn connect(&self, addr: &PeerAddr) -> Result<T::Connection, NetError> {
        Ok(self.transport.connect(addr.peer()).await?)
    }
}
