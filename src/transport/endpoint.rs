//! Addresses, listeners and the boxed byte stream every connection runs over.
//!
//! Two kinds of endpoint are understood:
//! - `host:port` for TCP
//! - `unix:/path/to/socket` for Unix domain sockets
//!
//! On Unix the socket file is removed before binding (a previous run may have
//! left it behind) and again when the listener is dropped.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, instrument, warn};

use crate::error::{ProtocolError, Result};
use crate::utils::timeout::with_timeout_error;

/// Prefix selecting a Unix domain socket endpoint
pub const UNIX_PREFIX: &str = "unix:";

/// Any bidirectional byte stream a connection can be framed over
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxStream = Box<dyn Stream>;

/// Where to connect or listen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl Endpoint {
    /// Parse `host:port` or `unix:<path>`
    pub fn parse(address: &str) -> Result<Self> {
        if let Some(path) = address.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(ProtocolError::ConfigError(
                    "unix endpoint needs a socket path".into(),
                ));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        let (host, port) = address.rsplit_once(':').ok_or_else(|| {
            ProtocolError::ConfigError(format!("expected host:port, got '{address}'"))
        })?;
        if host.is_empty() {
            return Err(ProtocolError::ConfigError("host cannot be empty".into()));
        }
        port.parse::<u16>()
            .map_err(|_| ProtocolError::ConfigError(format!("invalid port '{port}'")))?;

        Ok(Endpoint::Tcp(address.to_string()))
    }

    /// Open a stream to this endpoint, bounded by `timeout` when set
    #[instrument(skip(self), fields(endpoint = %self))]
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<BoxStream> {
        let connect = self.connect_inner();
        match timeout {
            Some(t) => with_timeout_error(connect, t).await,
            None => connect.await,
        }
    }

    async fn connect_inner(&self) -> Result<BoxStream> {
        match self {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                debug!("TCP stream connected");
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                debug!("Unix stream connected");
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(unix_unsupported()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => f.write_str(addr),
            Endpoint::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::parse(s)
    }
}

#[cfg(not(unix))]
fn unix_unsupported() -> ProtocolError {
    ProtocolError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "unix domain sockets are not available on this platform",
    ))
}

/// A bound server socket
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
    },
}

impl Listener {
    /// Bind to `endpoint`
    #[instrument(skip(endpoint), fields(endpoint = %endpoint))]
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).await?;
                info!(address = %listener.local_addr()?, "Listening on TCP");
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                if path.exists() {
                    tokio::fs::remove_file(path).await.ok();
                }
                let listener = UnixListener::bind(path)?;
                info!(path = %path.display(), "Listening on unix socket");
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(unix_unsupported()),
        }
    }

    /// Wait for the next client; returns the stream and a printable peer name
    pub async fn accept(&self) -> Result<(BoxStream, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), addr.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), format!("{UNIX_PREFIX}{}", path.display())))
            }
        }
    }

    /// The endpoint actually bound (resolves port 0)
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match self {
            Listener::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(Endpoint::Unix(path.clone())),
        }
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            match std::fs::remove_file(&*path) {
                Ok(()) => info!(path = %path.display(), "Removed socket file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(error = %e, path = %path.display(), "Failed to remove socket file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        assert_eq!(
            Endpoint::parse("127.0.0.1:9000").unwrap(),
            Endpoint::Tcp("127.0.0.1:9000".into())
        );
        assert!(Endpoint::parse("[::1]:80").is_ok());
        assert!(Endpoint::parse("localhost").is_err());
        assert!(Endpoint::parse(":80").is_err());
        assert!(Endpoint::parse("host:http").is_err());
    }

    #[test]
    fn test_parse_unix() {
        let endpoint = Endpoint::parse("unix:/tmp/rpc.sock").unwrap();
        assert_eq!(endpoint, Endpoint::Unix(PathBuf::from("/tmp/rpc.sock")));
        assert_eq!(endpoint.to_string(), "unix:/tmp/rpc.sock");
        assert!(Endpoint::parse("unix:").is_err());
    }

    #[tokio::test]
    async fn test_bind_port_zero_reports_real_port() {
        let listener = Listener::bind(&Endpoint::parse("127.0.0.1:0").unwrap())
            .await
            .unwrap();
        match listener.local_endpoint().unwrap() {
            Endpoint::Tcp(addr) => assert!(!addr.ends_with(":0")),
            other => panic!("unexpected endpoint {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpc.sock");
        let listener = Listener::bind(&Endpoint::Unix(path.clone())).await.unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }
}
