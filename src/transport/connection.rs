//! One framed stream plus its lifecycle state.
//!
//! Frames go out and come in through [`FrameCodec`]. Two layers sit on top:
//! - **Simple** (`send_raw`/`recv_raw`): raw bytes, used by the handshake before
//!   any serializer is involved
//! - **Stream** (`send_value`/`recv_value`): a [`Value`] passed through the
//!   connection's [`Serializer`]
//!
//! Every step is bounded by a deadline. Any transport error or missed deadline
//! moves the connection to [`ConnectionState::Closed`]; a closed connection
//! refuses further I/O and must be discarded.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, trace};

use crate::core::codec::FrameCodec;
use crate::core::serialization::Serializer;
use crate::core::value::Value;
use crate::error::{ProtocolError, Result};
use crate::transport::endpoint::{BoxStream, Endpoint};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::{deadline_after, with_deadline};

/// Where a connection is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Authenticating,
    Busy,
    Closed,
}

pub struct Connection {
    framed: Framed<BoxStream, FrameCodec>,
    peer: String,
    state: ConnectionState,
    timeout: Option<Duration>,
    serializer: Arc<dyn Serializer>,
}

impl Connection {
    /// Wrap an already-open stream
    pub fn new(stream: BoxStream, peer: impl Into<String>, serializer: Arc<dyn Serializer>) -> Self {
        global_metrics().connection_established();
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
            peer: peer.into(),
            state: ConnectionState::Idle,
            timeout: None,
            serializer,
        }
    }

    /// Dial `endpoint`; `timeout` bounds the connect and becomes the per-step deadline
    pub async fn connect(
        endpoint: &Endpoint,
        timeout: Option<Duration>,
        serializer: Arc<dyn Serializer>,
        max_frame_size: usize,
    ) -> Result<Self> {
        let stream = endpoint.connect(timeout).await?;
        Ok(Self::new(stream, endpoint.to_string(), serializer)
            .with_timeout(timeout)
            .with_max_frame_size(max_frame_size))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        let codec = FrameCodec::new().with_max_frame_size(size);
        *self.framed.codec_mut() = codec;
        self
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move between Idle/Authenticating/Busy. A closed connection stays closed.
    pub fn set_state(&mut self, state: ConnectionState) {
        if self.state != ConnectionState::Closed {
            self.state = state;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    /// Write one frame, failing with `Timeout` if `deadline` passes first
    pub async fn send_frame(&mut self, payload: Bytes, deadline: Option<Instant>) -> Result<()> {
        self.ensure_open()?;
        let len = payload.len();

        let result = with_deadline(deadline, self.framed.send(payload)).await;
        match result {
            Ok(()) => {
                trace!(peer = %self.peer, len, "Frame sent");
                global_metrics().frame_sent(len as u64);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Read one frame.
    ///
    /// `Ok(None)` means "no frame": the peer closed the stream before a length
    /// prefix arrived, or sent a zero-length frame. Either way the connection is
    /// finished.
    pub async fn recv_frame(&mut self, deadline: Option<Instant>) -> Result<Option<Bytes>> {
        self.ensure_open()?;

        let result = with_deadline(deadline, async { self.framed.next().await.transpose() }).await;
        match result {
            Ok(Some(frame)) if !frame.is_empty() => {
                trace!(peer = %self.peer, len = frame.len(), "Frame received");
                global_metrics().frame_received(frame.len() as u64);
                Ok(Some(frame))
            }
            Ok(_) => {
                debug!(peer = %self.peer, "Peer signalled end of stream");
                self.state = ConnectionState::Closed;
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Simple mode: send raw bytes under the per-step timeout
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let deadline = deadline_after(self.timeout);
        self.send_frame(Bytes::copy_from_slice(bytes), deadline).await
    }

    /// Simple mode: receive raw bytes under the per-step timeout
    pub async fn recv_raw(&mut self) -> Result<Option<Bytes>> {
        let deadline = deadline_after(self.timeout);
        self.recv_frame(deadline).await
    }

    /// Stream mode: serialize `value` and send it
    pub async fn send_value(&mut self, value: &Value) -> Result<()> {
        let encoded = self.serializer.dump(value)?;
        let deadline = deadline_after(self.timeout);
        self.send_frame(Bytes::from(encoded), deadline).await
    }

    /// Stream mode: receive a frame and deserialize it
    pub async fn recv_value(&mut self) -> Result<Option<Value>> {
        let deadline = deadline_after(self.timeout);
        self.recv_value_until(deadline).await
    }

    /// Stream mode with an explicit deadline (`None` waits forever)
    pub async fn recv_value_until(&mut self, deadline: Option<Instant>) -> Result<Option<Value>> {
        match self.recv_frame(deadline).await? {
            Some(frame) => self.serializer.load(&frame).map(Some),
            None => Ok(None),
        }
    }

    /// Cheap liveness probe for a connection that has been sitting idle.
    ///
    /// Polls the stream once without waiting. EOF, an error, or unsolicited
    /// data all mean the connection cannot carry a new request.
    pub fn is_alive(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }

        match self.framed.next().now_or_never() {
            None => true,
            Some(None) => {
                debug!(peer = %self.peer, "Idle connection was closed by peer");
                self.state = ConnectionState::Closed;
                false
            }
            Some(Some(_)) => {
                debug!(peer = %self.peer, "Idle connection is out of sync");
                self.state = ConnectionState::Closed;
                false
            }
        }
    }

    /// Flush and shut down the write half
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = ConnectionState::Closed;
        let deadline = deadline_after(self.timeout);
        if let Err(e) = with_deadline(deadline, SinkExt::<Bytes>::close(&mut self.framed)).await {
            debug!(error = %e, "Error while closing connection");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(())
    }

    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        debug!(peer = %self.peer, error = %err, "Connection failed");
        self.state = ConnectionState::Closed;
        global_metrics().transport_error();
        err
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        global_metrics().connection_closed();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::serialization::SerializationFormat;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn pair() -> (Connection, Connection) {
        let (a, b) = duplex(64 * 1024);
        let format: Arc<dyn Serializer> = Arc::new(SerializationFormat::Json);
        (
            Connection::new(Box::new(a), "a", format.clone()),
            Connection::new(Box::new(b), "b", format),
        )
    }

    #[tokio::test]
    async fn test_raw_frames_cross_the_stream() {
        let (mut a, mut b) = pair();
        a.send_raw(b"salt").await.unwrap();
        assert_eq!(&b.recv_raw().await.unwrap().unwrap()[..], b"salt");
    }

    #[tokio::test]
    async fn test_values_cross_the_stream() {
        let (mut a, mut b) = pair();
        let value = Value::List(vec![Value::from("ping"), Value::from(3i64)]);
        a.send_value(&value).await.unwrap();
        assert_eq!(b.recv_value().await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_peer_close_is_no_frame() {
        let (a, mut b) = pair();
        drop(a);
        assert!(b.recv_raw().await.unwrap().is_none());
        assert!(b.is_closed());
        assert!(matches!(
            b.recv_raw().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_no_frame() {
        let (mut client, server) = duplex(1024);
        let format: Arc<dyn Serializer> = Arc::new(SerializationFormat::Json);
        let mut conn = Connection::new(Box::new(server), "peer", format);

        client.write_all(b"0\0").await.unwrap();
        assert!(conn.recv_raw().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deadline_marks_connection_closed() {
        let (_a, mut b) = pair();
        let deadline = deadline_after(Some(Duration::from_millis(20)));
        assert!(matches!(
            b.recv_frame(deadline).await,
            Err(ProtocolError::Timeout)
        ));
        assert_eq!(b.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_is_alive_detects_peer_close() {
        let (mut a, b) = pair();
        assert!(a.is_alive());
        drop(b);
        assert!(!a.is_alive());
    }

    #[tokio::test]
    async fn test_wire_bytes() {
        let (mut raw, other) = duplex(1024);
        let format: Arc<dyn Serializer> = Arc::new(SerializationFormat::Json);
        let mut conn = Connection::new(Box::new(other), "peer", format);
        conn.send_raw(b"hello").await.unwrap();

        let mut buf = [0u8; 7];
        raw.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"5\0hello");
    }
}
