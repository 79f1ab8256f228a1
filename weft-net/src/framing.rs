//! Message framing for QUIC-style streams using tokio-util LengthDelimitedCodec
//!
//! Provides a clean interface for sending/receiving length-prefixed
//! `PeerMessage` over any AsyncWrite/AsyncRead stream, decoupled from
//! transport-specific types.

use futures_util::{SinkExt, StreamExt};
use prost::Message;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::NetError;
use crate::proto::PeerMessage;

/// Framed writer for sending PeerMessage over any AsyncWrite stream
pub struct MessageSink<W: AsyncWrite + Send + Unpin> {
    inner: FramedWrite<W, LengthDelimitedCodec>,
}

impl<W: AsyncWrite + Send + Unpin> MessageSink<W> {
    pub fn new(stream: W) -> Self {
        Self { inner: FramedWrite::new(stream, LengthDelimitedCodec::new()) }
    }

    /// Send a PeerMessage (length-prefixed)
    pub async fn send(&mut self, msg: &PeerMessage) -> Result<(), NetError> {
        let bytes = msg.encode_to_vec();
        self.inner.send(bytes.into()).await.map_err(NetError::Io)
    }

    /// Consume the sink and return the underlying writer.
    /// Useful for transport-specific stream finalization.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// Framed reader for receiving PeerMessage from any AsyncRead stream
pub struct MessageStream<R: AsyncRead + Send + Unpin> {
    inner: FramedRead<R, LengthDelimitedCodec>,
}

impl<R: AsyncRead + Send + Unpin> MessageStream<R> {
    pub fn new(stream: R) -> Self {
        Self { inner: FramedRead::new(stream, LengthDelimitedCodec::new()) }
    }

    /// Receive the next PeerMessage (or None if the stream closed)
    pub async fn recv(&mut self) -> Result<Option<PeerMessage>, NetError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => PeerMessage::decode(&bytes[..]).map(Some).map_err(NetError::from),
            Some(Err(e)) => Err(NetError::Io(e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{HeadAnnounce, PeerMessage};

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (client, server) = tokio::io::duplex(4096);
        let (_, client_read) = tokio::io::split(client);
        let (server_write, _) = tokio::io::split(server);

        let mut sink = MessageSink::new(server_write);
        let mut stream = MessageStream::new(client_read);

        let msg = PeerMessage::head_announce(HeadAnnounce {
            thread_id: vec![1; 32],
            log_id: vec![2; 32],
            head: vec![3; 32],
        });
        sink.send(&msg).await.unwrap();

        let got = stream.recv().await.unwrap().unwrap();
        assert_eq!(got, msg);
    }

    #[tokio::test]
    async fn test_recv_none_on_close() {
        let (client, server) = tokio::io::duplex(64);
        let (_, client_read) = tokio::io::split(client);
        drop(server);

        let mut stream = MessageStream::new(client_read);
        assert!(stream.recv().await.unwrap().is_none());
    }
}
