//! Transport abstraction: the byte stream two settled nodes share.
//!
//! The settlement handshake only needs to know who is on either end, what
//! kind of transport it is, and how to move one signed entry at a time. Any
//! ordered byte stream can carry it through `FramedTransport`; tests use an
//! in-process duplex pipe, the daemon uses TCP.
//!
//! Frame format:
//!   [u32 length BE (4 bytes)] [canonical signed entry (length bytes)]

use std::io;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

use tether_core::crypto::NODE_ID_LEN;
use tether_core::wire::{self, WireError, MAX_FRAME, MAX_TYPE_LEN};
use tether_core::{sort_pair, NodeId, SignedEntry};

/// One end of an established transport between two nodes.
///
/// Reads and writes block until the peer acts or the stream fails. Callers
/// wanting a deadline wrap the call in `tokio::time::timeout`; dropping the
/// future cancels it.
#[async_trait]
pub trait Transport: Send {
    /// Identity of this end.
    fn local_id(&self) -> NodeId;

    /// Identity of the other end.
    fn remote_id(&self) -> NodeId;

    /// Transport type tag, e.g. "tcp".
    fn transport_type(&self) -> &str;

    /// Both identities in canonical order.
    fn edges(&self) -> [NodeId; 2] {
        sort_pair(self.local_id(), self.remote_id())
    }

    async fn send_entry(&mut self, entry: &SignedEntry) -> Result<(), TransportError>;

    async fn receive_entry(&mut self) -> Result<SignedEntry, TransportError>;
}

// ── Framed stream transport ───────────────────────────────────────────────────

/// Length-prefixed signed entries over any ordered byte stream.
pub struct FramedTransport<S> {
    stream: S,
    local: NodeId,
    remote: NodeId,
    transport_type: String,
    buf: BytesMut,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream whose peer identity is already known.
    pub fn new(stream: S, local: NodeId, remote: NodeId, transport_type: &str) -> Self {
        Self {
            stream,
            local,
            remote,
            transport_type: transport_type.to_string(),
            buf: BytesMut::with_capacity(MAX_FRAME + 4),
        }
    }

    /// Swap identities and transport types with the peer, then wrap the stream.
    ///
    /// Hello format, sent by both sides:
    ///   [NodeId (33)] [type_len (1)] [type (type_len)]
    ///
    /// Nothing here proves the peer holds the key it names. Settlement does:
    /// the peer's slot must recover to the identity presented here.
    pub async fn exchange_identities(
        mut stream: S,
        local: NodeId,
        transport_type: &str,
    ) -> Result<Self, TransportError> {
        let type_bytes = transport_type.as_bytes();
        if type_bytes.len() > MAX_TYPE_LEN {
            return Err(WireError::TypeTooLong(type_bytes.len()).into());
        }

        let mut hello = BytesMut::with_capacity(NODE_ID_LEN + 1 + type_bytes.len());
        hello.put_slice(local.as_bytes());
        hello.put_u8(type_bytes.len() as u8);
        hello.put_slice(type_bytes);
        stream.write_all(&hello).await?;
        stream.flush().await?;

        let mut id = [0u8; NODE_ID_LEN];
        stream.read_exact(&mut id).await.map_err(read_error)?;
        let remote = NodeId::from_slice(&id).map_err(|_| TransportError::InvalidPeerIdentity)?;
        if remote == local {
            return Err(TransportError::SelfConnection);
        }

        let type_len = stream.read_u8().await.map_err(read_error)? as usize;
        let mut remote_type = vec![0u8; type_len];
        stream.read_exact(&mut remote_type).await.map_err(read_error)?;
        if remote_type != type_bytes {
            return Err(TransportError::TypeMismatch {
                local: transport_type.to_string(),
                remote: String::from_utf8_lossy(&remote_type).into_owned(),
            });
        }

        tracing::debug!(peer = %remote, transport_type, "identities exchanged");
        Ok(Self::new(stream, local, remote, transport_type))
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn local_id(&self) -> NodeId {
        self.local
    }

    fn remote_id(&self) -> NodeId {
        self.remote
    }

    fn transport_type(&self) -> &str {
        &self.transport_type
    }

    async fn send_entry(&mut self, entry: &SignedEntry) -> Result<(), TransportError> {
        let frame = wire::encode(entry)?;
        self.buf.clear();
        self.buf.put_u32(frame.len() as u32);
        self.buf.put_slice(&frame);
        self.stream.write_all(&self.buf).await?;
        self.stream.flush().await?;
        tracing::trace!(len = frame.len(), id = %entry.entry.id, "sent entry frame");
        Ok(())
    }

    async fn receive_entry(&mut self) -> Result<SignedEntry, TransportError> {
        let len = self.stream.read_u32().await.map_err(read_error)? as usize;
        if len > MAX_FRAME {
            return Err(TransportError::FrameTooLarge(len));
        }
        self.buf.clear();
        self.buf.resize(len, 0);
        self.stream
            .read_exact(&mut self.buf[..])
            .await
            .map_err(read_error)?;
        let entry = wire::decode(&self.buf)?;
        tracing::trace!(len, id = %entry.entry.id, "received entry frame");
        Ok(entry)
    }
}

/// A connected pair of in-process transports, `a` on the first end and `b` on
/// the second. Each direction buffers at most one frame.
pub fn pipe(
    a: NodeId,
    b: NodeId,
    transport_type: &str,
) -> (FramedTransport<DuplexStream>, FramedTransport<DuplexStream>) {
    let (left, right) = duplex(MAX_FRAME + 4);
    (
        FramedTransport::new(left, a, b, transport_type),
        FramedTransport::new(right, b, a, transport_type),
    )
}

fn read_error(e: io::Error) -> TransportError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(e)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed by peer")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame of {0} bytes exceeds maximum {}", MAX_FRAME)]
    FrameTooLarge(usize),

    #[error("malformed frame: {0}")]
    Malformed(#[from] WireError),

    #[error("peer presented an invalid identity")]
    InvalidPeerIdentity,

    #[error("peer presented our own identity")]
    SelfConnection,

    #[error("transport type mismatch: local {local:?}, remote {remote:?}")]
    TypeMismatch { local: String, remote: String },
}
