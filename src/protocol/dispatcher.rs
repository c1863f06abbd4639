use crate::core::value::Value;
use crate::error::{constants, ProtocolError, RemoteError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

/// Remote error kind for callback misuse
pub const CALLBACK_ERROR: &str = "CallbackError";

/// The object a server exposes.
///
/// `invoke` gets the method name and arguments of one request. A method that
/// wants the client to run its callback mid-call goes through `yielder`; each
/// [`Yielder::call`] becomes one yield round-trip on the wire.
#[async_trait]
pub trait Target: Send + Sync + 'static {
    async fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
        yielder: Yielder,
    ) -> std::result::Result<Value, RemoteError>;
}

#[async_trait]
impl<T: Target + ?Sized> Target for Arc<T> {
    async fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
        yielder: Yielder,
    ) -> std::result::Result<Value, RemoteError> {
        (**self).invoke(method, args, yielder).await
    }
}

/// One pending callback invocation, answered through `reply`
#[derive(Debug)]
pub struct YieldRequest {
    pub args: Vec<Value>,
    pub reply: oneshot::Sender<Value>,
}

/// Handle a target uses to call back into the client
#[derive(Debug, Clone, Default)]
pub struct Yielder {
    tx: Option<mpsc::Sender<YieldRequest>>,
}

impl Yielder {
    pub fn new(tx: mpsc::Sender<YieldRequest>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A yielder for calls that did not declare a callback
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Run the client's callback with `args` and wait for its return value
    pub async fn call(&self, args: Vec<Value>) -> std::result::Result<Value, RemoteError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RemoteError::new(CALLBACK_ERROR, constants::ERR_NO_CALLBACK))?;

        let (reply, rx) = oneshot::channel();
        tx.send(YieldRequest { args, reply })
            .await
            .map_err(|_| RemoteError::new(CALLBACK_ERROR, constants::ERR_CALLBACK_GONE))?;

        rx.await
            .map_err(|_| RemoteError::new(CALLBACK_ERROR, constants::ERR_CALLBACK_GONE))
    }
}

type HandlerFn = dyn Fn(Vec<Value>, Yielder) -> BoxFuture<'static, std::result::Result<Value, RemoteError>>
    + Send
    + Sync
    + 'static;

/// Method table implementing [`Target`].
/// Handlers are looked up by name; an unregistered name fails with `UnknownMethod`.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<Cow<'static, str>, Arc<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register an async handler that may yield
    pub fn register<F, Fut>(&self, method: &str, handler: F) -> Result<()>
    where
        F: Fn(Vec<Value>, Yielder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, RemoteError>> + Send + 'static,
    {
        let boxed: Arc<HandlerFn> =
            Arc::new(move |args: Vec<Value>, yielder: Yielder| handler(args, yielder).boxed());
        self.insert(method, boxed)
    }

    /// Register a plain synchronous handler
    pub fn register_fn<F>(&self, method: &str, handler: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> std::result::Result<Value, RemoteError> + Send + Sync + 'static,
    {
        let boxed: Arc<HandlerFn> = Arc::new(move |args: Vec<Value>, _yielder: Yielder| {
            futures::future::ready(handler(args)).boxed()
        });
        self.insert(method, boxed)
    }

    fn insert(&self, method: &str, handler: Arc<HandlerFn>) -> Result<()> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::ConfigError(constants::ERR_DISPATCHER_WRITE_LOCK.into()))?;

        handlers.insert(Cow::Owned(method.to_string()), handler);
        Ok(())
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Result<Vec<String>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::ConfigError(constants::ERR_DISPATCHER_READ_LOCK.into()))?;

        let mut names: Vec<String> = handlers.keys().map(|k| k.to_string()).collect();
        names.sort();
        Ok(names)
    }

    pub async fn dispatch(
        &self,
        method: &str,
        args: Vec<Value>,
        yielder: Yielder,
    ) -> std::result::Result<Value, RemoteError> {
        // Clone the handler out so the lock is not held across the await.
        let handler = {
            let handlers = self.handlers.read().map_err(|_| {
                RemoteError::new("DispatcherError", constants::ERR_DISPATCHER_READ_LOCK)
            })?;
            handlers
                .get(method)
                .cloned()
                .ok_or_else(|| RemoteError::unknown_method(method))?
        };

        handler(args, yielder).await
    }
}

#[async_trait]
impl Target for Dispatcher {
    async fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
        yielder: Yielder,
    ) -> std::result::Result<Value, RemoteError> {
        self.dispatch(method, args, yielder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_and_async_handlers() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .register_fn("echo", |args| Ok(Value::List(args)))
            .unwrap();
        dispatcher
            .register("len", |args, _| async move { Ok(Value::Int(args.len() as i64)) })
            .unwrap();

        let echoed = dispatcher
            .dispatch("echo", vec![Value::from("hi")], Yielder::disabled())
            .await
            .unwrap();
        assert_eq!(echoed, Value::List(vec![Value::from("hi")]));

        let len = dispatcher
            .dispatch("len", vec![Value::Null, Value::Null], Yielder::disabled())
            .await
            .unwrap();
        assert_eq!(len, Value::Int(2));
        assert_eq!(dispatcher.methods().unwrap(), vec!["echo", "len"]);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dispatcher = Dispatcher::new();
        let err = dispatcher
            .invoke("missing", vec![], Yielder::disabled())
            .await
            .unwrap_err();
        assert_eq!(err.kind, "UnknownMethod");
        assert!(err.message.contains("missing"));
    }

    #[tokio::test]
    async fn test_disabled_yielder_fails_call() {
        let err = Yielder::disabled().call(vec![]).await.unwrap_err();
        assert_eq!(err.kind, CALLBACK_ERROR);
    }

    #[tokio::test]
    async fn test_yielder_round_trip() {
        let (tx, mut rx) = mpsc::channel(1);
        let yielder = Yielder::new(tx);

        let answer = tokio::spawn(async move {
            let req = rx.recv().await.unwrap();
            assert_eq!(req.args, vec![Value::from(20i64)]);
            req.reply.send(Value::from(21i64)).unwrap();
        });

        let value = yielder.call(vec![Value::from(20i64)]).await.unwrap();
        assert_eq!(value, Value::from(21i64));
        answer.await.unwrap();
    }
}
