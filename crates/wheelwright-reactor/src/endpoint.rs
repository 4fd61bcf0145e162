//! Request/reply endpoints over TCP.
//!
//! Every message is one length-delimited frame. A [`ReplySocket`] serves any
//! number of peers but holds at most one unanswered request per peer: the
//! next frame from a peer is not read until its previous request has been
//! answered, which is all the backpressure a worker needs.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, SinkExt, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, warn};

use crate::{ReactorError, ReactorResult};

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// How long a reply may wait on a peer's socket before the peer is dropped.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// A duplex endpoint a [`Reactor`](crate::Reactor) can poll.
///
/// The reactor drives it in a fixed cycle: wait on [`readable`], then while a
/// request is pending hand the endpoint to its handler, which calls
/// [`recv`] and [`send`], and finally [`flush`] the staged reply.
///
/// [`readable`]: Endpoint::readable
/// [`recv`]: Endpoint::recv
/// [`send`]: Endpoint::send
/// [`flush`]: Endpoint::flush
#[async_trait]
pub trait Endpoint: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Resolve once at least one request is pending. Must be cancel safe: the
    /// reactor drops this future whenever the poll timeout expires.
    async fn readable(&mut self);

    /// Whether a request is waiting to be received.
    fn has_pending(&self) -> bool;

    /// Take the oldest pending request. Returns `None` if there is none, or if
    /// the previous request has not been answered yet.
    fn recv(&mut self) -> Option<Bytes>;

    /// Stage the reply to the request taken by the last [`recv`](Endpoint::recv).
    fn send(&mut self, payload: Bytes) -> ReactorResult<()>;

    /// Refuse the request taken by the last [`recv`](Endpoint::recv) and
    /// disconnect its peer.
    fn reject(&mut self);

    /// Deliver the staged reply. A received request that was left without a
    /// reply costs the peer its connection, as does a peer that will not take
    /// delivery within the endpoint's write timeout.
    async fn flush(&mut self);

    /// Release the listener and every peer connection.
    async fn close(&mut self);
}

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

type PeerId = u64;
type FrameReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;
type FrameWriter = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;
type PeerRead = (PeerId, FrameReader, Option<std::io::Result<BytesMut>>);

fn read_next(peer: PeerId, mut reader: FrameReader) -> BoxFuture<'static, PeerRead> {
    async move {
        let frame = reader.next().await;
        (peer, reader, frame)
    }
    .boxed()
}

enum Event {
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Frame(PeerRead),
}

/// The reply side of the build queue: a TCP listener answering requests.
pub struct ReplySocket {
    name: String,
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    next_peer: PeerId,
    writers: HashMap<PeerId, FrameWriter>,
    reading: FuturesUnordered<BoxFuture<'static, PeerRead>>,
    /// Readers of peers with a request in flight.
    parked: HashMap<PeerId, FrameReader>,
    inbox: VecDeque<(PeerId, Bytes)>,
    current: Option<PeerId>,
    staged: Option<Bytes>,
    write_timeout: Duration,
}

impl std::fmt::Debug for ReplySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplySocket")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .field("peers", &self.writers.len())
            .field("pending", &self.inbox.len())
            .finish()
    }
}

impl ReplySocket {
    /// Bind a listener. Failing here is fatal to whoever is starting up.
    pub async fn bind(name: impl Into<String>, addr: &str) -> ReactorResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ReactorError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let name = name.into();
        debug!(endpoint = %name, %local_addr, "Endpoint bound");

        Ok(Self {
            name,
            local_addr,
            listener: Some(listener),
            next_peer: 0,
            writers: HashMap::new(),
            reading: FuturesUnordered::new(),
            parked: HashMap::new(),
            inbox: VecDeque::new(),
            current: None,
            staged: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Bound how long `flush` and `close` wait on a single peer.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connected peers.
    pub fn peers(&self) -> usize {
        self.writers.len()
    }

    fn add_peer(&mut self, stream: TcpStream, addr: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let peer = self.next_peer;
        self.next_peer += 1;

        let (read_half, write_half) = stream.into_split();
        self.writers
            .insert(peer, FramedWrite::new(write_half, codec()));
        self.reading
            .push(read_next(peer, FramedRead::new(read_half, codec())));
        debug!(endpoint = %self.name, peer, %addr, "Peer connected");
    }

    fn on_frame(&mut self, (peer, reader, frame): PeerRead) {
        match frame {
            Some(Ok(payload)) => {
                self.parked.insert(peer, reader);
                self.inbox.push_back((peer, payload.freeze()));
            }
            Some(Err(e)) => {
                warn!(endpoint = %self.name, peer, error = %e, "Bad frame from peer");
                self.drop_peer(peer);
            }
            None => {
                debug!(endpoint = %self.name, peer, "Peer disconnected");
                self.drop_peer(peer);
            }
        }
    }

    fn drop_peer(&mut self, peer: PeerId) {
        self.writers.remove(&peer);
        self.parked.remove(&peer);
        self.inbox.retain(|(p, _)| *p != peer);
    }
}

#[async_trait]
impl Endpoint for ReplySocket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn readable(&mut self) {
        loop {
            if !self.inbox.is_empty() {
                return;
            }

            let event = {
                let Some(listener) = self.listener.as_ref() else {
                    return std::future::pending().await;
                };
                tokio::select! {
                    accepted = listener.accept() => Event::Accepted(accepted),
                    Some(read) = self.reading.next(), if !self.reading.is_empty() => Event::Frame(read),
                }
            };

            match event {
                Event::Accepted(Ok((stream, addr))) => self.add_peer(stream, addr),
                Event::Accepted(Err(e)) => {
                    warn!(endpoint = %self.name, error = %e, "Failed to accept connection");
                }
                Event::Frame(read) => self.on_frame(read),
            }
        }
    }

    fn has_pending(&self) -> bool {
        !self.inbox.is_empty()
    }

    fn recv(&mut self) -> Option<Bytes> {
        if self.current.is_some() {
            return None;
        }
        let (peer, payload) = self.inbox.pop_front()?;
        self.current = Some(peer);
        self.staged = None;
        Some(payload)
    }

    fn send(&mut self, payload: Bytes) -> ReactorResult<()> {
        if self.current.is_none() || self.staged.is_some() {
            return Err(ReactorError::NoRequest);
        }
        self.staged = Some(payload);
        Ok(())
    }

    fn reject(&mut self) {
        self.staged = None;
        if let Some(peer) = self.current.take() {
            debug!(endpoint = %self.name, peer, "Request rejected");
            self.drop_peer(peer);
        }
    }

    async fn flush(&mut self) {
        let Some(peer) = self.current.take() else {
            return;
        };
        let Some(payload) = self.staged.take() else {
            warn!(endpoint = %self.name, peer, "Request left unanswered, dropping peer");
            self.drop_peer(peer);
            return;
        };
        let Some(writer) = self.writers.get_mut(&peer) else {
            self.drop_peer(peer);
            return;
        };
        match tokio::time::timeout(self.write_timeout, writer.send(payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(endpoint = %self.name, peer, error = %e, "Failed to deliver reply");
                self.drop_peer(peer);
                return;
            }
            Err(_) => {
                warn!(endpoint = %self.name, peer, "Peer is not reading replies, dropping peer");
                self.drop_peer(peer);
                return;
            }
        }
        if let Some(reader) = self.parked.remove(&peer) {
            self.reading.push(read_next(peer, reader));
        }
    }

    async fn close(&mut self) {
        self.listener = None;
        for (_, mut writer) in self.writers.drain() {
            let _ =
                tokio::time::timeout(self.write_timeout, SinkExt::<Bytes>::close(&mut writer))
                    .await;
        }
        self.parked.clear();
        self.reading = FuturesUnordered::new();
        self.inbox.clear();
        self.current = None;
        self.staged = None;
        debug!(endpoint = %self.name, "Endpoint closed");
    }
}

/// The request side: one outstanding request at a time.
#[derive(Debug)]
pub struct RequestSocket {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl RequestSocket {
    pub async fn connect(addr: &str) -> ReactorResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ReactorError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let _ = stream.set_nodelay(true);
        Ok(Self {
            framed: Framed::new(stream, codec()),
        })
    }

    /// Send a request and wait for its reply.
    pub async fn request(&mut self, payload: Bytes) -> ReactorResult<Bytes> {
        self.framed.send(payload).await?;
        match self.framed.next().await {
            Some(Ok(reply)) => Ok(reply.freeze()),
            Some(Err(e)) => Err(e.into()),
            None => Err(ReactorError::Closed),
        }
    }
}
