//! Client call engine.
//!
//! A call sends one request, then reads responses until a success or failure
//! arrives. Each yield in between is handed to the caller's callback and its
//! return value is sent back on the same connection. Remote failures come back
//! as [`ProtocolError::Remote`] and leave the connection reusable; anything else
//! discards it.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::{AuthConfig, ClientConfig, NetworkConfig};
use crate::core::serialization::Serializer;
use crate::core::value::Value;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{remote_error_from_value, Request, Response, Status};
use crate::service::pool::{ConnectionManager, Dialer};
use crate::transport::connection::{Connection, ConnectionState};
use crate::transport::endpoint::Endpoint;
use crate::utils::metrics::{global_metrics, Timer};

/// Local side of a yield round-trip
type Callback<'a> = &'a mut (dyn FnMut(Vec<Value>) -> Value + Send);

/// RPC client.
///
/// With `threaded = false` every call goes through one mutex and either reuses
/// the persistent connection ([`RpcClient::persist`]) or dials a temporary one.
/// With `threaded = true` calls run concurrently over a pool sized by
/// `pool_size`.
///
/// ```no_run
/// use std::sync::Arc;
/// use wirecall::config::ClientConfig;
/// use wirecall::core::serialization::SerializationFormat;
/// use wirecall::service::client::RpcClient;
///
/// # async fn demo() -> wirecall::error::Result<()> {
/// let config = ClientConfig {
///     address: "127.0.0.1:9000".into(),
///     ..Default::default()
/// };
/// let client = RpcClient::connect(config, None, Arc::new(SerializationFormat::Bincode)).await?;
/// let sum: i64 = client.call_as("add", vec![2i64.into(), 3i64.into()]).await?;
/// assert_eq!(sum, 5);
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    manager: ConnectionManager,
    config: ClientConfig,
}

impl RpcClient {
    /// Build a client without opening any connection yet
    pub fn new(
        config: ClientConfig,
        auth: Option<AuthConfig>,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Self> {
        let dialer = Dialer {
            endpoint: Endpoint::parse(&config.address)?,
            timeout: config.timeout,
            auth,
            serializer,
            max_frame_size: config.max_frame_size,
        };

        let manager = if config.threaded {
            ConnectionManager::pooled(dialer, config.sweep_interval)
        } else {
            ConnectionManager::single(dialer)
        };

        Ok(Self { manager, config })
    }

    /// Build a client and open the initial pool (threaded mode)
    pub async fn connect(
        config: ClientConfig,
        auth: Option<AuthConfig>,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Self> {
        let pool_size = config.pool_size;
        let client = Self::new(config, auth, serializer)?;
        if client.manager.is_pooled() && pool_size > 0 {
            client.manager.resize(pool_size).await?;
        }
        Ok(client)
    }

    /// Build from a full configuration file
    pub async fn from_config(config: &NetworkConfig) -> Result<Self> {
        Self::connect(
            config.client.clone(),
            config.auth.clone(),
            Arc::new(config.serialization),
        )
        .await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Call `method` with `args`
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.invoke(method, args, None).await
    }

    /// Call `method`, answering any yields with `callback`.
    ///
    /// The callback runs once per yield, in the order the server yields.
    pub async fn call_with_callback<F>(
        &self,
        method: &str,
        args: Vec<Value>,
        mut callback: F,
    ) -> Result<Value>
    where
        F: FnMut(Vec<Value>) -> Value + Send,
    {
        self.invoke(method, args, Some(&mut callback)).await
    }

    /// Call `method` and convert the result
    pub async fn call_as<T>(&self, method: &str, args: Vec<Value>) -> Result<T>
    where
        T: TryFrom<Value, Error = ProtocolError>,
    {
        T::try_from(self.call(method, args).await?)
    }

    /// Keep one connection open across calls (single mode)
    pub async fn persist(&self) -> Result<()> {
        self.manager.persist().await
    }

    /// Close the persistent connection, or every idle pooled one
    pub async fn disconnect(&self) -> Result<()> {
        self.manager.disconnect().await
    }

    /// Grow or shrink the pool (threaded mode)
    pub async fn resize_pool(&self, size: usize) -> Result<()> {
        self.manager.resize(size).await
    }

    pub fn pool_size(&self) -> usize {
        self.manager.pool_size()
    }

    pub fn is_persistent(&self) -> bool {
        self.manager.is_persistent()
    }

    #[instrument(skip(self, args, callback), fields(endpoint = %self.manager.endpoint()))]
    async fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
        callback: Option<Callback<'_>>,
    ) -> Result<Value> {
        global_metrics().call_started();
        let _timer = Timer::start("call");

        let mut lease = self.manager.acquire().await?;
        let request = Request::new(method, args)
            .with_callback(callback.is_some())
            .with_keep_alive(lease.keep_alive());

        let outcome = exchange(lease.connection(), &request, callback).await;
        lease.release(outcome.as_ref().err()).await;

        if let Err(e) = &outcome {
            if e.is_remote() {
                global_metrics().call_failed();
            } else {
                debug!(error = %e, "Call failed");
            }
        }
        outcome
    }
}

/// Drive one request through to its final response
async fn exchange(
    conn: &mut Connection,
    request: &Request,
    mut callback: Option<Callback<'_>>,
) -> Result<Value> {
    conn.set_state(ConnectionState::Busy);
    conn.send_value(&request.to_value()).await?;

    loop {
        let Some(frame) = conn.recv_value().await? else {
            debug!("{}", constants::ERR_NO_RESPONSE);
            return Err(ProtocolError::ConnectionClosed);
        };

        let response = Response::from_value(frame)?;
        match response.status {
            Status::Success => {
                conn.set_state(ConnectionState::Idle);
                return Ok(response.value);
            }
            Status::Failure => {
                conn.set_state(ConnectionState::Idle);
                return Err(ProtocolError::Remote(remote_error_from_value(response.value)));
            }
            Status::Yield => {
                let Some(callback) = callback.as_deref_mut() else {
                    return Err(ProtocolError::UnexpectedMessage(
                        constants::ERR_NO_CALLBACK.into(),
                    ));
                };
                let reply = callback(response.yield_args());
                conn.send_value(&reply).await?;
                global_metrics().yield_round_trip();
            }
        }
    }
}
