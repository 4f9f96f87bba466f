//! DDLL over TCP.
//!
//! A [NativeTransport] listens on one socket and hosts any number of nodes,
//! addressed by key. Every inbound frame is handled on its own task; each
//! node sits behind its own mutex so handlers of one node never overlap.
//! Sends open a short-lived connection to the target endpoint.
//!
//! The blocking calls ([NativeTransport::insert], [NativeTransport::delete])
//! must not be made from inside the runtime.
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use ddll_core::ddll::DdllKey;
use ddll_core::ddll::Endpoint;
use ddll_core::ddll::Link;
use ddll_core::ddll::Mode;
use ddll_core::ddll::Node;
use ddll_core::ddll::NodeAction;
use ddll_core::ddll::Timer;
use ddll_core::dispatcher::Dispatcher;
use ddll_core::future::FutureValues;
use ddll_core::message::MessagePayload;
use ddll_core::observer::NodeEvent;
use ddll_core::observer::SharedNodeObserver;
use ddll_core::observer::SharedResolver;
use ddll_core::DdllConfig;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::error::Result;

mod frame;

pub use self::frame::read_frame;
pub use self::frame::write_frame;

/// Bound on establishing an outbound connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A snapshot of a hosted node.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub me: Link,
    pub mode: Mode,
    pub pred: Link,
    pub succ: Link,
    pub neighbors: Vec<Link>,
}

struct Inner {
    local: Endpoint,
    handle: Handle,
    config: DdllConfig,
    nodes: DashMap<DdllKey, Arc<Mutex<Node>>>,
    /// Token of the blocked caller of each node.
    waiters: DashMap<DdllKey, u64>,
    futures: FutureValues<NodeEvent>,
    resolver: Option<SharedResolver>,
    observers: Mutex<Vec<SharedNodeObserver>>,
}

/// Carries out the actions of one node.
struct NativeDispatcher {
    inner: Arc<Inner>,
}

pub struct NativeTransport {
    inner: Arc<Inner>,
    cancel_token: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl Drop for NativeTransport {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl NativeTransport {
    /// Listen on `addr`, e.g. `127.0.0.1:0`, on the runtime of `handle`.
    pub fn bind(
        handle: Handle,
        addr: &str,
        config: DdllConfig,
        resolver: Option<SharedResolver>,
    ) -> Result<Self> {
        let listener = handle.block_on(TcpListener::bind(addr))?;
        let local = Endpoint::new(listener.local_addr()?.to_string());
        tracing::info!("DDLL transport listening on {}", local);
        let inner = Arc::new(Inner {
            local,
            handle: handle.clone(),
            config,
            nodes: DashMap::new(),
            waiters: DashMap::new(),
            futures: FutureValues::new(),
            resolver,
            observers: Mutex::new(vec![]),
        });
        let cancel_token = CancellationToken::new();
        let listener = handle.spawn(Inner::listen(inner.clone(), listener, cancel_token.clone()));
        Ok(Self {
            inner,
            cancel_token,
            listener: Some(listener),
        })
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.inner.local
    }

    pub fn add_observer(&self, observer: SharedNodeObserver) -> Result<()> {
        self.inner
            .observers
            .lock()
            .map_err(|_| Error::NodeSyncLockError)?
            .push(observer);
        Ok(())
    }

    /// Link of `key` if it were hosted here.
    pub fn link(&self, key: DdllKey) -> Link {
        Link::new(self.inner.local.clone(), key)
    }

    fn add_node(&self, key: &DdllKey) -> Result<Arc<Mutex<Node>>> {
        if let Some(node) = self.inner.nodes.get(key) {
            let mode = node.lock().map_err(|_| Error::NodeSyncLockError)?.mode();
            if mode != Mode::Out {
                return Err(Error::NodeAlreadyExists(key.to_string()));
            }
            return Ok(node.clone());
        }
        let node = Arc::new(Mutex::new(Node::new(
            self.link(key.clone()),
            self.inner.config.clone(),
        )));
        self.inner.nodes.insert(key.clone(), node.clone());
        Ok(node)
    }

    fn run(
        &self,
        node: &Mutex<Node>,
        f: impl FnOnce(&mut Node) -> ddll_core::Result<NodeAction>,
    ) -> Result<()> {
        let (me, act) = {
            let mut node = node.lock().map_err(|_| Error::NodeSyncLockError)?;
            let act = f(&mut node)?;
            (node.me().clone(), act)
        };
        self.inner.dispatcher().dispatch(&me, act);
        Ok(())
    }

    /// Run `f` on the node of `key` and wait up to `wait` for the event it
    /// leads to. The token is released whether or not `f` succeeds.
    fn call(
        &self,
        key: &DdllKey,
        node: &Mutex<Node>,
        wait: Duration,
        f: impl FnOnce(&mut Node) -> ddll_core::Result<NodeAction>,
    ) -> Result<NodeEvent> {
        let token = self.inner.futures.new_future();
        self.inner.waiters.insert(key.clone(), token);
        let outcome = match self.run(node, f) {
            Ok(()) => self.inner.futures.get(token, wait).map_err(Error::from),
            Err(e) => {
                self.inner.futures.discard_future(token);
                Err(e)
            }
        };
        self.inner.waiters.remove(key);
        outcome
    }

    /// Blocking calls still waiting for their outcome.
    pub fn pending_calls(&self) -> usize {
        self.inner.futures.len()
    }

    /// Host `key` as the first member of a new list.
    pub fn initial(&self, key: DdllKey) -> Result<Link> {
        let node = self.add_node(&key)?;
        self.run(&node, |n| n.initial())?;
        Ok(self.link(key))
    }

    /// Host `key` and insert it between `pred` and `succ`, waiting up to
    /// `wait` for the insertion to complete.
    pub fn insert(&self, key: DdllKey, pred: Link, succ: Link, wait: Duration) -> Result<Link> {
        let node = self.add_node(&key)?;
        match self.call(&key, &node, wait, |n| n.join(pred, succ))? {
            NodeEvent::Inserted => Ok(self.link(key)),
            NodeEvent::ResolveFailed => Err(Error::ResolveFailed(key.to_string())),
            event => Err(Error::UnexpectedEvent {
                node: key.to_string(),
                event: format!("{event:?}"),
            }),
        }
    }

    /// Remove `key` from its list, waiting up to `wait`.
    pub fn delete(&self, key: &DdllKey, wait: Duration) -> Result<()> {
        let node = self
            .inner
            .nodes
            .get(key)
            .map(|n| n.clone())
            .ok_or_else(|| Error::NodeNotFound(key.to_string()))?;
        match self.call(key, &node, wait, |n| n.leave())? {
            NodeEvent::Deleted => Ok(()),
            event => Err(Error::UnexpectedEvent {
                node: key.to_string(),
                event: format!("{event:?}"),
            }),
        }
    }

    pub fn state(&self, key: &DdllKey) -> Result<NodeState> {
        let node = self
            .inner
            .nodes
            .get(key)
            .map(|n| n.clone())
            .ok_or_else(|| Error::NodeNotFound(key.to_string()))?;
        let node = node.lock().map_err(|_| Error::NodeSyncLockError)?;
        Ok(NodeState {
            me: node.me().clone(),
            mode: node.mode(),
            pred: node.pred().clone(),
            succ: node.succ().clone(),
            neighbors: node.neighbors().list(),
        })
    }

    pub fn keys(&self) -> Vec<DdllKey> {
        self.inner.nodes.iter().map(|e| e.key().clone()).collect()
    }
}

impl Inner {
    fn dispatcher(self: &Arc<Self>) -> NativeDispatcher {
        NativeDispatcher {
            inner: self.clone(),
        }
    }

    fn node(&self, key: &DdllKey) -> Option<Arc<Mutex<Node>>> {
        self.nodes.get(key).map(|n| n.clone())
    }

    /// Run `f` on the node of `key` and carry out what it returns.
    fn with_node(self: &Arc<Self>, key: &DdllKey, f: impl FnOnce(&mut Node) -> NodeAction) {
        let Some(node) = self.node(key) else {
            tracing::warn!("{} has no node {}", self.local, key);
            return;
        };
        let (me, act) = match node.lock() {
            Ok(mut node) => {
                let act = f(&mut node);
                (node.me().clone(), act)
            }
            Err(_) => {
                tracing::error!("node {} is poisoned", key);
                return;
            }
        };
        self.dispatcher().dispatch(&me, act);
    }

    async fn listen(self: Arc<Self>, listener: TcpListener, cancel_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::info!("{} stopped listening", self.local);
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            let inner = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = inner.serve(stream).await {
                                    tracing::warn!("connection from {} failed: {}", remote, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("failed to accept connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }
    }

    async fn serve(self: Arc<Self>, mut stream: TcpStream) -> Result<()> {
        while let Some(frame) = read_frame(&mut stream).await? {
            let payload = MessagePayload::from_bytes(&frame)?;
            let inner = self.clone();
            tokio::spawn(async move {
                let key = payload.target.key.clone();
                inner.with_node(&key, |n| n.handle_payload(&payload));
            });
        }
        Ok(())
    }

    async fn deliver(self: Arc<Self>, payload: MessagePayload) -> Result<()> {
        if payload.target.addr == self.local {
            let key = payload.target.key.clone();
            self.with_node(&key, |n| n.handle_payload(&payload));
            return Ok(());
        }
        let addr: SocketAddr = payload
            .target
            .addr
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidEndpoint(payload.target.addr.to_string()))?;
        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
        write_frame(&mut stream, &payload.to_bytes()?).await
    }
}

impl Dispatcher for NativeDispatcher {
    fn send(&mut self, payload: MessagePayload) {
        let inner = self.inner.clone();
        self.inner.handle.spawn(async move {
            let kind = payload.message.kind();
            let target = payload.target.clone();
            if let Err(e) = inner.deliver(payload).await {
                tracing::debug!("failed to send {} to {}: {}", kind, target, e);
            }
        });
    }

    fn schedule(&mut self, node: &Link, after: Duration, timer: Timer) {
        let inner = self.inner.clone();
        let key = node.key.clone();
        self.inner.handle.spawn(async move {
            tokio::time::sleep(after).await;
            inner.with_node(&key, |n| n.on_timer(timer));
        });
    }

    fn resolve(&mut self, node: &Link) {
        let inner = self.inner.clone();
        let key = node.key.clone();
        self.inner.handle.spawn(async move {
            let found = inner.resolver.as_ref().and_then(|r| r.resolve(&key));
            inner.with_node(&key, |n| n.on_resolved(found));
        });
    }

    fn notify(&mut self, node: &Link, event: NodeEvent) {
        tracing::debug!("{} {:?}", node, event);
        if let Ok(observers) = self.inner.observers.lock() {
            for o in observers.iter() {
                o.on_event(node, &event);
            }
        }
        if matches!(
            event,
            NodeEvent::Inserted | NodeEvent::Deleted | NodeEvent::ResolveFailed
        ) {
            if let Some(token) = self.inner.waiters.get(&node.key).map(|t| *t) {
                self.inner.futures.set(token, event);
            }
        }
    }
}
