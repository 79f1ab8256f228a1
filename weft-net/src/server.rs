//! Replication server
//!
//! Inbound half of replication. Accepts connections from the transport,
//! dispatches streams, and serves two exchanges:
//!
//! - **push**: authenticate the envelope, decrypt and verify the record,
//!   register the sending log if it is new (responding with an invite),
//!   persist the record, and advance the sender's head.
//! - **pull**: stream marshalled history backward from an offset, gated by
//!   follow-key possession.
//!
//! All state flows through [`ServerBackend`]; a rejected request never
//! mutates anything.

use std::sync::Arc;

use weft_core::codec;
use weft_core::service::{PutSettings, ServerBackend};
use weft_model::{crypto, Cid, FollowKey, LogId, PeerAddr, PubKey, Signature, ThreadId};
use weft_net_types::{BiStream, Connection};

use crate::error::NetError;
use crate::framing::{MessageSink, MessageStream};
use crate::proto::{peer_message, PeerMessage, PullRequest, PullResponse, PushRequest, PushResponse};
use crate::status;

/// Bundles per pull-response chunk.
const CHUNK_SIZE: usize = 16;

/// Handle a single incoming connection: keep accepting streams until the
/// remote side closes.
pub async fn handle_connection<B, C>(backend: Arc<B>, conn: C)
where
    B: ServerBackend,
    C: Connection,
{
    let remote = conn.remote_public_key();
    tracing::debug!(remote = %short(&remote), "incoming connection");

    loop {
        match conn.accept_bi().await {
            Ok(stream) => {
                let backend = backend.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_stream(backend, remote, stream).await {
                        tracing::debug!(error = %e, "stream handler error");
                    }
                });
            }
            Err(e) => {
                tracing::debug!(remote = %short(&remote), error = %e, "connection closed");
                break;
            }
        }
    }
}

/// Handle one bidirectional stream: a single request/response exchange.
async fn handle_stream<B, S>(backend: Arc<B>, remote: PubKey, stream: S) -> Result<(), NetError>
where
    B: ServerBackend,
    S: BiStream,
{
    let (send, recv) = stream.into_split();
    let mut sink = MessageSink::new(send);
    let mut stream = MessageStream::new(recv);

    let Some(msg) = stream.recv().await? else {
        return Ok(());
    };

    match msg.message {
        Some(peer_message::Message::PushRequest(req)) => {
            let response = handle_push(backend.as_ref(), remote, req).await;
            sink.send(&PeerMessage::push_response(response)).await?;
        }
        Some(peer_message::Message::PullRequest(req)) => {
            handle_pull(backend.as_ref(), req, &mut sink).await?;
        }
        other => {
            tracing::debug!(message = ?other, "unexpected message type");
        }
    }
    Ok(())
}

/// A push request's parsed and validated fields.
struct PushHeaders {
    thread: ThreadId,
    log: LogId,
    identity: PubKey,
    signature: Signature,
    follow_key: FollowKey,
}

fn parse_push_headers(req: &PushRequest) -> Result<PushHeaders, String> {
    let thread = ThreadId::try_from(req.thread_id.as_slice())
        .map_err(|_| "malformed thread id".to_string())?;
    let log = LogId::try_from(req.log_id.as_slice()).map_err(|_| "malformed log id".to_string())?;
    let identity = PubKey::try_from(req.identity.as_slice())
        .map_err(|_| "missing or malformed identity".to_string())?;
    let signature = Signature::try_from(req.signature.as_slice())
        .map_err(|_| "missing or malformed signature".to_string())?;
    let follow_key = FollowKey::from_bytes(&req.follow_key)
        .map_err(|_| "missing or malformed follow key".to_string())?;
    Ok(PushHeaders { thread, log, identity, signature, follow_key })
}

/// The push pipeline. Status mapping:
/// 400 malformed fields or envelope decrypt failure, 401 bad signature or a
/// record signed by a key that is not the target log's, 404 unknown thread,
/// 201 accepted from a new sender (invite attached), 204 accepted from a
/// known sender, 500 responder-side failure.
async fn handle_push<B: ServerBackend>(
    backend: &B,
    remote: PubKey,
    req: PushRequest,
) -> PushResponse {
    let headers = match parse_push_headers(&req) {
        Ok(h) => h,
        Err(msg) => return PushResponse::rejection(status::BAD_REQUEST, msg),
    };

    if crypto::verify(&headers.identity, &req.payload, &headers.signature).is_err() {
        tracing::warn!(remote = %short(&remote), "push signature verification failed");
        return PushResponse::rejection(status::UNAUTHORIZED, "signature verification failed");
    }

    match backend.thread_info(&headers.thread) {
        Ok(Some(_)) => {}
        Ok(None) => return PushResponse::rejection(status::NOT_FOUND, "unknown thread"),
        Err(e) => return PushResponse::rejection(status::INTERNAL, e.to_string()),
    }

    // Decrypt and verify the record under the offered follow key.
    let (parsed, bundle) = match codec::unmarshal(&req.payload, &headers.follow_key) {
        Ok(ok) => ok,
        Err(e) => {
            tracing::debug!(remote = %short(&remote), error = %e, "push payload rejected");
            return PushResponse::rejection(status::BAD_REQUEST, e.to_string());
        }
    };
    if LogId::for_pub_key(&parsed.pub_key) != headers.log {
        tracing::warn!(remote = %short(&remote), log = %headers.log, "record signed by foreign key");
        return PushResponse::rejection(status::UNAUTHORIZED, "record key does not match log id");
    }

    let known = match backend.log_info(&headers.thread, &headers.log) {
        Ok(info) => info.is_some(),
        Err(e) => return PushResponse::rejection(status::INTERNAL, e.to_string()),
    };

    if !known {
        if let Err(e) = backend.register_replica(
            &headers.thread,
            parsed.pub_key,
            headers.follow_key,
            PeerAddr(remote),
        ) {
            return PushResponse::rejection(status::INTERNAL, e.to_string());
        }
        tracing::info!(thread = %headers.thread, log = %headers.log, remote = %short(&remote),
            "registered log from first contact");
    }

    let settings = PutSettings { thread: headers.thread, log: headers.log };
    if let Err(e) = backend.put_record(&bundle, settings).await {
        return PushResponse::rejection(status::INTERNAL, e.to_string());
    }

    if known {
        return PushResponse::with_status(status::NO_CONTENT);
    }

    // First contact: attach an invite enumerating every log this side knows.
    let invite = match backend.build_invite(&headers.thread) {
        Ok(invite) => invite,
        Err(e) => return PushResponse::rejection(status::INTERNAL, e.to_string()),
    };
    let payload = match codec::marshal(&invite.bundle) {
        Ok(payload) => payload,
        Err(e) => return PushResponse::rejection(status::INTERNAL, e.to_string()),
    };
    PushResponse {
        status: status::CREATED,
        follow_key: invite.follow_key.as_bytes().to_vec(),
        read_key: invite.read_key.as_bytes().to_vec(),
        payload,
        error: String::new(),
    }
}

/// Serve a pull request: walk backward from the offset and stream chunks of
/// marshalled bundles, finishing with `done = true`.
async fn handle_pull<B, W>(
    backend: &B,
    req: PullRequest,
    sink: &mut MessageSink<W>,
) -> Result<(), NetError>
where
    B: ServerBackend,
    W: tokio::io::AsyncWrite + Send + Unpin,
{
    let rejection = |status: u32, error: &str| PullResponse {
        status,
        done: true,
        payloads: Vec::new(),
        error: error.to_string(),
    };

    let (thread, log) = match (
        ThreadId::try_from(req.thread_id.as_slice()),
        LogId::try_from(req.log_id.as_slice()),
    ) {
        (Ok(t), Ok(l)) => (t, l),
        _ => {
            let res = rejection(status::BAD_REQUEST, "malformed thread or log id");
            return sink.send(&PeerMessage::pull_response(res)).await;
        }
    };

    let info = match backend.log_info(&thread, &log) {
        Ok(Some(info)) => info,
        Ok(None) => {
            let res = rejection(status::NOT_FOUND, "unknown thread or log");
            return sink.send(&PeerMessage::pull_response(res)).await;
        }
        Err(e) => {
            let res = rejection(status::INTERNAL, &e.to_string());
            return sink.send(&PeerMessage::pull_response(res)).await;
        }
    };

    // Possession of the follow key is what authorizes following a log.
    if req.follow_key != info.follow_key.as_bytes() {
        let res = rejection(status::UNAUTHORIZED, "follow key mismatch");
        return sink.send(&PeerMessage::pull_response(res)).await;
    }

    let offset = if req.offset.is_empty() {
        None
    } else {
        match Cid::try_from(req.offset.as_slice()) {
            Ok(cid) => Some(cid),
            Err(_) => {
                let res = rejection(status::BAD_REQUEST, "malformed offset");
                return sink.send(&PeerMessage::pull_response(res)).await;
            }
        }
    };

    let bundles = match backend.load_bundles(&thread, &log, offset, req.limit as usize) {
        Ok(bundles) => bundles,
        Err(e) => {
            let res = rejection(status::NOT_FOUND, &e.to_string());
            return sink.send(&PeerMessage::pull_response(res)).await;
        }
    };

    let mut payloads = Vec::with_capacity(bundles.len());
    for bundle in &bundles {
        payloads.push(codec::marshal(bundle)?);
    }

    let mut chunks = payloads.chunks(CHUNK_SIZE).peekable();
    if chunks.peek().is_none() {
        let res = PullResponse { status: status::OK, done: true, payloads: Vec::new(), error: String::new() };
        return sink.send(&PeerMessage::pull_response(res)).await;
    }
    while let Some(chunk) = chunks.next() {
        let res = PullResponse {
            status: status::OK,
            done: chunks.peek().is_none(),
            payloads: chunk.to_vec(),
            error: String::new(),
        };
        sink.send(&PeerMessage::pull_response(res)).await?;
    }
    Ok(())
}

fn short(pk: &PubKey) -> String {
    hex::encode(&pk.as_bytes()[..4])
}
