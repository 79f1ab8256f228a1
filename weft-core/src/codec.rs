//! Event codec
//!
//! Builds and parses the four content-addressed blocks making up one log
//! entry, all DAG-CBOR on the wire:
//!
//! - `body`   — application payload, sealed under the read key.
//! - `header` — the body key reference, sealed under the follow key.
//! - `event`  — plain links `{ header, body }`.
//! - `record` — sealed links `{ event, prev }` plus an Ed25519 signature by
//!   the log key over the sealed bytes.
//!
//! Every parse that returns a record verifies its signature first. Cids are
//! BLAKE3 hashes of block bytes; AEAD nonces live inside the ciphertext so
//! identical stored blocks re-hash to identical cids.

use serde::{Deserialize, Serialize};

use weft_model::crypto;
use weft_model::{Cid, FollowKey, LogIdentity, LogInfo, PubKey, ReadKey, Signature};

use crate::error::Error;

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| Error::Codec(e.to_string()))
}

fn from_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, Error> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))
}

/// A serialized block paired with its content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    pub data: Vec<u8>,
}

impl Block {
    /// Wrap serialized bytes, deriving their cid.
    pub fn new(data: Vec<u8>) -> Self {
        Self { cid: crypto::content_cid(&data), data }
    }
}

/// Plaintext of the header block: the key that sealed the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
}

/// Plaintext of the event block: links to header and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLinks {
    pub header: Cid,
    pub body: Cid,
}

/// Plaintext of a record's sealed reference pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RecordLinks {
    event: Cid,
    prev: Option<Cid>,
}

/// Wire form of the record block.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordEnvelope {
    #[serde(with = "serde_bytes")]
    sealed: Vec<u8>,
    sig: Signature,
    pub_key: PubKey,
}

/// A record parsed from a block, signature verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRecord {
    /// Cid of the record block itself.
    pub cid: Cid,
    /// Signing log public key embedded in the record.
    pub pub_key: PubKey,
    /// Cid of the event block.
    pub event: Cid,
    /// Previous record on the same log; None at genesis.
    pub prev: Option<Cid>,
}

/// The three event-side blocks produced for one payload.
#[derive(Debug, Clone)]
pub struct SealedEvent {
    pub event: Block,
    pub header: Block,
    pub body: Block,
}

/// All four blocks of one log entry, ready for storage or the wire.
#[derive(Debug, Clone)]
pub struct RecordBundle {
    pub record: Block,
    pub event: Block,
    pub header: Block,
    pub body: Block,
}

impl RecordBundle {
    pub fn new(record: Block, sealed: SealedEvent) -> Self {
        Self { record, event: sealed.event, header: sealed.header, body: sealed.body }
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Seal an application payload into body, header, and event blocks.
pub fn create_event(
    body: &[u8],
    read_key: &ReadKey,
    follow_key: &FollowKey,
) -> Result<SealedEvent, Error> {
    let body_block = Block::new(read_key.seal(body)?);

    let header = EventHeader { key: read_key.as_bytes().to_vec() };
    let header_block = Block::new(follow_key.seal(&to_cbor(&header)?)?);

    let links = EventLinks { header: header_block.cid, body: body_block.cid };
    let event_block = Block::new(to_cbor(&links)?);

    Ok(SealedEvent { event: event_block, header: header_block, body: body_block })
}

/// Build a signed record chaining `event` onto `prev`.
pub fn create_record(
    event: Cid,
    prev: Option<Cid>,
    identity: &LogIdentity,
    follow_key: &FollowKey,
) -> Result<(Block, ParsedRecord), Error> {
    let sealed = follow_key.seal(&to_cbor(&RecordLinks { event, prev })?)?;
    let sig = identity.sign(&sealed);
    let envelope = RecordEnvelope { sealed, sig, pub_key: identity.public_key() };
    let block = Block::new(to_cbor(&envelope)?);

    let parsed = ParsedRecord {
        cid: block.cid,
        pub_key: envelope.pub_key,
        event,
        prev,
    };
    Ok((block, parsed))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a record block, verify its signature, and open its reference pair.
///
/// The signature check runs against the embedded public key before anything
/// is returned; callers match that key against the log they expect.
pub fn read_record(data: &[u8], follow_key: &FollowKey) -> Result<ParsedRecord, Error> {
    let envelope: RecordEnvelope = from_cbor(data)?;
    crypto::verify(&envelope.pub_key, &envelope.sealed, &envelope.sig)?;
    let links: RecordLinks = from_cbor(&follow_key.open(&envelope.sealed)?)?;
    Ok(ParsedRecord {
        cid: crypto::content_cid(data),
        pub_key: envelope.pub_key,
        event: links.event,
        prev: links.prev,
    })
}

/// Parse an event block's links.
pub fn event_links(data: &[u8]) -> Result<EventLinks, Error> {
    from_cbor(data)
}

/// Open a header block under the follow key.
pub fn open_header(data: &[u8], follow_key: &FollowKey) -> Result<EventHeader, Error> {
    from_cbor(&follow_key.open(data)?)
}

/// Open a body block under the read key.
pub fn open_body(data: &[u8], read_key: &ReadKey) -> Result<Vec<u8>, Error> {
    Ok(read_key.open(data)?)
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct WireBundle {
    #[serde(with = "serde_bytes")]
    record: Vec<u8>,
    #[serde(with = "serde_bytes")]
    event: Vec<u8>,
    #[serde(with = "serde_bytes")]
    header: Vec<u8>,
    #[serde(with = "serde_bytes")]
    body: Vec<u8>,
}

/// Serialize a bundle for replication.
pub fn marshal(bundle: &RecordBundle) -> Result<Vec<u8>, Error> {
    to_cbor(&WireBundle {
        record: bundle.record.data.clone(),
        event: bundle.event.data.clone(),
        header: bundle.header.data.clone(),
        body: bundle.body.data.clone(),
    })
}

/// Parse a marshalled bundle, verify the record signature under `follow_key`,
/// and check that every link resolves to the inlined blocks.
pub fn unmarshal(payload: &[u8], follow_key: &FollowKey) -> Result<(ParsedRecord, RecordBundle), Error> {
    let wire: WireBundle = from_cbor(payload)?;
    let record = Block::new(wire.record);
    let event = Block::new(wire.event);
    let header = Block::new(wire.header);
    let body = Block::new(wire.body);

    let parsed = read_record(&record.data, follow_key)?;
    if parsed.event != event.cid {
        return Err(Error::Codec("record does not reference the inlined event".into()));
    }
    let links = event_links(&event.data)?;
    if links.header != header.cid || links.body != body.cid {
        return Err(Error::Codec("event links do not match inlined blocks".into()));
    }

    Ok((parsed, RecordBundle { record, event, header, body }))
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

/// Body payload of an invite: every log the responder knows for the thread,
/// plus the thread read key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitePayload {
    pub logs: Vec<LogInfo>,
    pub read_key: ReadKey,
}

/// A sealed invite plus the ephemeral keys that open it. The keys travel in
/// the push response alongside the marshalled bundle.
#[derive(Debug, Clone)]
pub struct Invite {
    pub bundle: RecordBundle,
    pub follow_key: FollowKey,
    pub read_key: ReadKey,
}

/// Build an invite record enumerating `logs`.
///
/// The record is standalone (no prev) and signed by a fresh ephemeral
/// keypair; body and envelope are sealed under fresh ephemeral keys so the
/// invite grants nothing beyond what it lists. Private keys are stripped
/// from every entry.
pub fn new_invite(logs: Vec<LogInfo>, thread_read_key: ReadKey) -> Result<Invite, Error> {
    let payload = InvitePayload {
        logs: logs.iter().map(LogInfo::without_priv_key).collect(),
        read_key: thread_read_key,
    };

    let read_key = ReadKey::generate();
    let follow_key = FollowKey::generate();
    let identity = LogIdentity::generate();

    let sealed = create_event(&to_cbor(&payload)?, &read_key, &follow_key)?;
    let (record, _) = create_record(sealed.event.cid, None, &identity, &follow_key)?;

    Ok(Invite { bundle: RecordBundle::new(record, sealed), follow_key, read_key })
}

/// Parse a decrypted invite body.
pub fn decode_invite(body: &[u8]) -> Result<(Vec<LogInfo>, ReadKey), Error> {
    let payload: InvitePayload = from_cbor(body)?;
    Ok((payload.logs, payload.read_key))
}

/// Verify and open a received invite bundle under the keys conveyed in the
/// push response.
pub fn open_invite(
    bundle: &RecordBundle,
    follow_key: &FollowKey,
    read_key: &ReadKey,
) -> Result<(Vec<LogInfo>, ReadKey), Error> {
    let parsed = read_record(&bundle.record.data, follow_key)?;
    if parsed.event != bundle.event.cid {
        return Err(Error::Codec("invite record does not reference its event".into()));
    }
    let links = event_links(&bundle.event.data)?;
    if links.body != bundle.body.cid {
        return Err(Error::Codec("invite event does not reference its body".into()));
    }
    decode_invite(&open_body(&bundle.body.data, read_key)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> (ReadKey, FollowKey, LogIdentity) {
        (ReadKey::generate(), FollowKey::generate(), LogIdentity::generate())
    }

    #[test]
    fn test_event_roundtrip() {
        let (rk, fk, _) = keys();
        let sealed = create_event(b"{\"v\":1}", &rk, &fk).unwrap();

        let links = event_links(&sealed.event.data).unwrap();
        assert_eq!(links.header, sealed.header.cid);
        assert_eq!(links.body, sealed.body.cid);

        let header = open_header(&sealed.header.data, &fk).unwrap();
        assert_eq!(header.key, rk.as_bytes().to_vec());

        assert_eq!(open_body(&sealed.body.data, &rk).unwrap(), b"{\"v\":1}");
    }

    #[test]
    fn test_body_needs_read_key() {
        let (rk, fk, _) = keys();
        let sealed = create_event(b"secret", &rk, &fk).unwrap();
        let wrong = ReadKey::generate();
        assert!(open_body(&sealed.body.data, &wrong).is_err());
    }

    #[test]
    fn test_record_roundtrip() {
        let (rk, fk, id) = keys();
        let sealed = create_event(b"payload", &rk, &fk).unwrap();
        let prev = Some(Cid([3; 32]));
        let (block, parsed) = create_record(sealed.event.cid, prev, &id, &fk).unwrap();

        let reread = read_record(&block.data, &fk).unwrap();
        assert_eq!(reread, parsed);
        assert_eq!(reread.prev, prev);
        assert_eq!(reread.pub_key, id.public_key());
    }

    #[test]
    fn test_record_rejects_tampering() {
        let (rk, fk, id) = keys();
        let sealed = create_event(b"payload", &rk, &fk).unwrap();
        let (block, _) = create_record(sealed.event.cid, None, &id, &fk).unwrap();

        // Flip a bit inside the sealed reference pair: the signature over it
        // must fail before decryption is even attempted.
        let mut envelope: RecordEnvelope = from_cbor(&block.data).unwrap();
        envelope.sealed[0] ^= 0xff;
        let tampered = to_cbor(&envelope).unwrap();
        assert!(matches!(read_record(&tampered, &fk), Err(Error::CryptoAuth(_))));
    }

    #[test]
    fn test_record_rejects_wrong_follow_key() {
        let (rk, fk, id) = keys();
        let sealed = create_event(b"payload", &rk, &fk).unwrap();
        let (block, _) = create_record(sealed.event.cid, None, &id, &fk).unwrap();

        let wrong = FollowKey::generate();
        assert!(matches!(read_record(&block.data, &wrong), Err(Error::CryptoAuth(_))));
    }

    #[test]
    fn test_marshal_unmarshal() {
        let (rk, fk, id) = keys();
        let sealed = create_event(b"wire", &rk, &fk).unwrap();
        let (record, parsed) = create_record(sealed.event.cid, None, &id, &fk).unwrap();
        let bundle = RecordBundle::new(record, sealed);

        let payload = marshal(&bundle).unwrap();
        let (reparsed, rebundle) = unmarshal(&payload, &fk).unwrap();
        assert_eq!(reparsed, parsed);
        assert_eq!(rebundle.record.cid, bundle.record.cid);
        assert_eq!(rebundle.body.data, bundle.body.data);
    }

    #[test]
    fn test_unmarshal_rejects_swapped_event() {
        let (rk, fk, id) = keys();
        let sealed_a = create_event(b"a", &rk, &fk).unwrap();
        let sealed_b = create_event(b"b", &rk, &fk).unwrap();
        let (record, _) = create_record(sealed_a.event.cid, None, &id, &fk).unwrap();

        // Bundle carries a record for event A but inlines event B.
        let bundle = RecordBundle::new(record, sealed_b);
        let payload = marshal(&bundle).unwrap();
        assert!(matches!(unmarshal(&payload, &fk), Err(Error::Codec(_))));
    }

    #[test]
    fn test_invite_roundtrip() {
        let thread_key = ReadKey::generate();
        let own = LogInfo::generate(thread_key);
        let invite = new_invite(vec![own.clone()], thread_key).unwrap();

        let (logs, rk) = open_invite(&invite.bundle, &invite.follow_key, &invite.read_key).unwrap();
        assert_eq!(rk, thread_key);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, own.id);
        // Private keys never travel in invites.
        assert!(logs[0].priv_key.is_none());
    }

    #[test]
    fn test_invite_needs_its_keys() {
        let thread_key = ReadKey::generate();
        let invite = new_invite(Vec::new(), thread_key).unwrap();
        let wrong = FollowKey::generate();
        assert!(open_invite(&invite.bundle, &wrong, &invite.read_key).is_err());
    }
}
