//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each connection is split into a sink and a stream guarded by separate
//! locks, so a task blocked in [`recv`](Connection::recv) never holds up
//! writers fanning frames out to the same peer.

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{CloseInfo, Connection, ConnectionId, Handshake, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A connection accepted by [`WebSocketTransport`].
pub type ServerConnection = WebSocketConnection<TcpStream>;

/// A connection dialed with [`ClientConnection::connect`].
pub type ClientConnection = WebSocketConnection<MaybeTlsStream<TcpStream>>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        tracing::info!(%local_addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = ServerConnection;
    type Incoming = PendingUpgrade;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::trace!(%addr, "accepted TCP socket");
        Ok(PendingUpgrade { stream, addr })
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// A TCP socket accepted by [`WebSocketTransport`] that has not yet sent
/// its HTTP upgrade request.
pub struct PendingUpgrade {
    stream: TcpStream,
    addr: SocketAddr,
}

impl Handshake for PendingUpgrade {
    type Connection = ServerConnection;
    type Error = TransportError;

    fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn complete(self, timeout: Duration) -> Result<Self::Connection, Self::Error> {
        let addr = self.addr;
        let ws = tokio::time::timeout(timeout, tokio_tungstenite::accept_async(self.stream))
            .await
            .map_err(|_| TransportError::HandshakeTimeout {
                addr,
                after: timeout,
            })?
            .map_err(|e| {
                TransportError::AcceptFailed(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let conn = WebSocketConnection::from_stream(ws, Some(addr));
        tracing::debug!(id = %conn.id, %addr, "accepted WebSocket connection");
        Ok(conn)
    }
}

/// A single WebSocket connection, server or client side.
pub struct WebSocketConnection<S> {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    opened_at: Instant,
    /// Milliseconds after `opened_at` at which the last frame arrived.
    last_seen_ms: AtomicU64,
    close_info: StdMutex<Option<CloseInfo>>,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn from_stream(ws: WebSocketStream<S>, remote_addr: Option<SocketAddr>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: ConnectionId::new(
                NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            ),
            remote_addr,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            opened_at: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
            close_info: StdMutex::new(None),
        }
    }

    fn touch(&self) {
        let now = self.opened_at.elapsed().as_millis() as u64;
        self.last_seen_ms.store(now, Ordering::Relaxed);
    }

    fn record_close(&self, frame: Option<CloseFrame>) {
        let info = match frame {
            Some(frame) => CloseInfo {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned(),
            },
            None => CloseInfo {
                code: crate::close_code::NO_STATUS,
                reason: String::new(),
            },
        };
        if let Ok(mut slot) = self.close_info.lock() {
            *slot = Some(info);
        }
    }

    async fn send_message(&self, msg: Message) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| {
                TransportError::SendFailed(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }
}

impl ClientConnection {
    /// Dials `url` (`ws://host:port/path`) and completes the handshake.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _response) =
            tokio_tungstenite::connect_async(url).await.map_err(|e| {
                TransportError::ConnectFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let remote_addr = match ws.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok(),
            _ => None,
        };
        let conn = WebSocketConnection::from_stream(ws, remote_addr);
        tracing::debug!(id = %conn.id, url, "WebSocket connection established");
        Ok(conn)
    }
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Error = TransportError;

    async fn send(&self, frame: &str) -> Result<(), Self::Error> {
        self.send_message(Message::Text(frame.to_owned().into())).await
    }

    async fn recv(&self) -> Result<Option<String>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            let msg = stream.next().await;
            if msg.is_some() {
                self.touch();
            }
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec()).map(Some).map_err(
                        |e| {
                            TransportError::ReceiveFailed(io::Error::new(
                                io::ErrorKind::InvalidData,
                                e,
                            ))
                        },
                    );
                }
                Some(Ok(Message::Close(frame))) => {
                    self.record_close(frame);
                    return Ok(None);
                }
                None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.send_message(Message::Ping(Vec::new().into())).await
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), Self::Error> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.send_message(Message::Close(Some(frame))).await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        self.opened_at.elapsed().saturating_sub(last)
    }

    fn close_info(&self) -> Option<CloseInfo> {
        self.close_info.lock().ok().and_then(|slot| slot.clone())
    }
}
