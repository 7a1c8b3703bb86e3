//! The cluster coordinator.
//!
//! A [`Cluster`] owns the slot map and one [`Pool`] per known node. All
//! mutations of that state flow through a single actor task fed by a
//! message channel, so the map and the registry have exactly one writer at
//! any instant. Command dispatch and its retry ladder run on the calling
//! task; only the short borrow/return/commit steps synchronize with the
//! actor, so a caller waiting on the network never blocks cluster state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::cluster::builder::ClusterBuilder;
use crate::cluster::commands::{asking, cluster_slots};
use crate::cluster::key::key_from_args;
use crate::cluster::pool::Pool;
use crate::cluster::topology::{parse_cluster_slots, SlotMap};
use crate::core::command::Cmd;
use crate::core::connection::{DialFunc, NodeConnection};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Resolved configuration for a [`Cluster`].
#[derive(Clone)]
pub(crate) struct Opts {
    pub(crate) addr: String,
    pub(crate) pool_size: i32,
    pub(crate) max_active: i32,
    pub(crate) reset_throttle: Duration,
    pub(crate) dial: DialFunc,
}

/// Requests handled by the actor task.
enum Call {
    GetConn {
        key: Option<String>,
        addr: Option<String>,
        reply: oneshot::Sender<Result<NodeConnection>>,
    },
    Put {
        conn: NodeConnection,
    },
    AddrForKey {
        key: String,
        reply: oneshot::Sender<String>,
    },
    GetEvery {
        reply: oneshot::Sender<Result<HashMap<String, NodeConnection>>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    CommitMoved {
        slot: u16,
        addr: String,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// A handle to a sharded key-value cluster.
///
/// Routes every command to the node owning its key's slot, follows MOVED
/// and ASK redirects transparently, and rediscovers the topology when the
/// cluster reshards. Cheap to clone; all clones share the same pools and
/// slot map. [`close`](Cluster::close) is terminal for every clone.
///
/// # Example
///
/// ```no_run
/// use shoal::{Cluster, Cmd};
///
/// # async fn example() -> shoal::Result<()> {
/// let cluster = Cluster::connect("127.0.0.1:7000").await?;
/// let reply = cluster.cmd(Cmd::new("GET").arg("user:1000")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Cluster {
    calls: mpsc::Sender<Call>,
    miss: Arc<Notify>,
    change: Arc<Notify>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster").finish_non_exhaustive()
    }
}

impl Cluster {
    /// Connects to the cluster reachable through the given seed node and
    /// discovers the full topology from it.
    pub async fn connect(addr: &str) -> Result<Self> {
        ClusterBuilder::new().address(addr).build().await
    }

    pub(crate) async fn with_opts(opts: Opts) -> Result<Self> {
        let (seed, dial_err) = Pool::with_dialer(
            "tcp",
            &opts.addr,
            opts.pool_size,
            opts.max_active,
            opts.dial.clone(),
        )
        .await?;
        if let Some(err) = dial_err {
            seed.empty();
            return Err(err);
        }

        let mut pools = HashMap::new();
        pools.insert(opts.addr.clone(), seed);

        let change = Arc::new(Notify::new());
        let state = ClusterState {
            opts,
            slots: SlotMap::new(),
            pools,
            throttle: None,
            change: change.clone(),
        };
        let (calls, rx) = mpsc::channel(1);
        tokio::spawn(state.run(rx));

        let cluster = Self {
            calls,
            miss: Arc::new(Notify::new()),
            change,
        };
        if let Err(err) = cluster.refresh().await {
            cluster.close().await;
            return Err(err);
        }
        Ok(cluster)
    }

    /// Executes a command on the node owning the command's key.
    ///
    /// The command must carry at least one argument; the routing key is
    /// derived from the first one. Redirects and single-node network
    /// failures are handled internally: the caller sees either the server's
    /// application reply or a terminal error.
    pub async fn cmd(&self, cmd: Cmd) -> Result<Frame> {
        if cmd.args().is_empty() {
            return Err(Error::NoKey);
        }
        let key = key_from_args(cmd.args())?;
        let conn = self.conn_for(Some(key), None).await?;
        self.dispatch(conn, cmd).await
    }

    /// Borrows a connection to the node that ought to own `key`.
    ///
    /// Falls back to an arbitrary node when the owner is unknown or
    /// unreachable. Return the connection with [`put`](Cluster::put).
    pub async fn get_for_key(&self, key: &str) -> Result<NodeConnection> {
        self.conn_for(Some(key.to_string()), None).await
    }

    /// Borrows one connection per currently known node, keyed by address.
    ///
    /// Fails wholesale if any node cannot lend a connection. Return each
    /// connection with [`put`](Cluster::put).
    pub async fn get_every(&self) -> Result<HashMap<String, NodeConnection>> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .send(Call::GetEvery { reply: tx })
            .await
            .map_err(|_| Error::ClusterClosed)?;
        rx.await.map_err(|_| Error::ClusterClosed)?
    }

    /// The address that currently owns `key`'s slot. Empty until a refresh
    /// has populated the slot map.
    pub async fn addr_for_key(&self, key: &str) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .send(Call::AddrForKey {
                key: key.to_string(),
                reply: tx,
            })
            .await
            .map_err(|_| Error::ClusterClosed)?;
        rx.await.map_err(|_| Error::ClusterClosed)
    }

    /// Returns a borrowed connection to its owning pool. Connections to
    /// nodes that have since left the topology are closed.
    pub async fn put(&self, conn: NodeConnection) {
        // On a closed cluster the message (and the connection inside it) is
        // dropped, which closes the socket.
        let _ = self.calls.send(Call::Put { conn }).await;
    }

    /// Rediscovers the cluster topology and reconciles the pool registry.
    ///
    /// Throttled: within the configured interval of a previous refresh this
    /// returns success without touching the network, on the grounds that
    /// the caller piggybacks on the recent result.
    pub async fn refresh(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .send(Call::Refresh { reply: tx })
            .await
            .map_err(|_| Error::ClusterClosed)?;
        rx.await.map_err(|_| Error::ClusterClosed)?
    }

    /// Shuts down every pool and the coordinator itself. Terminal: all
    /// subsequent operations on any clone fail with
    /// [`Error::ClusterClosed`].
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.calls.send(Call::Close { reply: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Completes the next time a MOVED or ASK redirect is observed.
    ///
    /// Informational: notifications fire only for waiters already parked
    /// here; nothing is buffered.
    pub async fn wait_slot_miss(&self) {
        self.miss.notified().await;
    }

    /// Completes the next time a refresh adds or removes nodes.
    ///
    /// Informational, unbuffered, like [`wait_slot_miss`](Cluster::wait_slot_miss).
    pub async fn wait_topology_change(&self) {
        self.change.notified().await;
    }

    async fn conn_for(&self, key: Option<String>, addr: Option<String>) -> Result<NodeConnection> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .send(Call::GetConn {
                key,
                addr,
                reply: tx,
            })
            .await
            .map_err(|_| Error::ClusterClosed)?;
        rx.await.map_err(|_| Error::ClusterClosed)?
    }

    async fn commit_moved(&self, slot: u16, addr: String) {
        let _ = self.calls.send(Call::CommitMoved { slot, addr }).await;
    }

    /// The retry ladder. Every iteration either succeeds, widens `tried`,
    /// flips `have_reset`, or returns, so the number of round-trips per
    /// command is bounded by the pool count plus a constant.
    async fn dispatch(&self, mut conn: NodeConnection, cmd: Cmd) -> Result<Frame> {
        let mut ask = false;
        let mut tried: HashSet<String> = HashSet::new();
        let mut have_reset = false;
        loop {
            let preamble: Result<()> = if ask {
                conn.command(asking()).await.map(|_| ())
            } else {
                Ok(())
            };
            ask = false;
            let result = match preamble {
                Ok(()) => conn.command(cmd.clone()).await,
                Err(err) => Err(err),
            };
            let addr = conn.addr().to_string();
            self.put(conn).await;

            let err = match result {
                Ok(frame) => return Ok(frame),
                Err(err) => err,
            };

            let tried_before = tried.contains(&addr);
            tried.insert(addr.clone());

            if err.is_io() {
                // First failure on this node: its connection may just have
                // rotted; try once more over a fresh one.
                if !tried_before {
                    if let Ok(fresh) = self.conn_for(None, Some(addr)).await {
                        conn = fresh;
                        continue;
                    }
                }
                if !have_reset {
                    if let Err(reset_err) = self.refresh().await {
                        return Err(Error::Protocol {
                            message: format!("could not get cluster info: {reset_err}"),
                        });
                    }
                    conn = self.conn_for(None, None).await?;
                    tried.clear();
                    have_reset = true;
                    continue;
                }
                return Err(err);
            }

            let (slot, target, moved) = match err {
                Error::Moved { slot, address } => (slot, address, true),
                Error::Ask { slot, address } => (slot, address, false),
                // Plain application error; hand it back untouched.
                other => return Err(other),
            };
            self.miss.notify_waiters();
            debug!(slot, target = %target, moved, "redirect received");

            if tried.contains(&target) {
                // Being bounced back to a node we already tried means our
                // picture of the topology is stale; refresh once, then give
                // up if the cluster still contradicts itself.
                if have_reset {
                    return Err(Error::Protocol {
                        message: "cluster doesn't make sense".to_string(),
                    });
                }
                if let Err(reset_err) = self.refresh().await {
                    return Err(Error::Protocol {
                        message: format!("could not get cluster info: {reset_err}"),
                    });
                }
                conn = match self.conn_for(None, None).await {
                    Ok(conn) => conn,
                    Err(get_err) => {
                        return Err(Error::Protocol {
                            message: format!("no available cluster nodes: {get_err}"),
                        })
                    }
                };
                tried.clear();
                have_reset = true;
                continue;
            }

            if moved {
                // ASK redirects are one-shot and never touch the map.
                self.commit_moved(slot, target.clone()).await;
            }
            conn = self.conn_for(None, Some(target)).await?;
            ask = !moved;
        }
    }

    /// Fetches the value stored at `key`, or `None` if absent.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match self.cmd(Cmd::new("GET").arg(key)).await? {
            Frame::BulkString(data) => Ok(data),
            Frame::Null => Ok(None),
            other => Err(unexpected_reply("GET", &other)),
        }
    }

    /// Stores `value` at `key`.
    pub async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.cmd(Cmd::new("SET").arg(key).arg(value)).await?;
        Ok(())
    }

    /// Deletes `key`, returning the number of keys removed.
    pub async fn del(&self, key: &str) -> Result<i64> {
        match self.cmd(Cmd::new("DEL").arg(key)).await? {
            Frame::Integer(n) => Ok(n),
            other => Err(unexpected_reply("DEL", &other)),
        }
    }

    /// Reports whether `key` exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.cmd(Cmd::new("EXISTS").arg(key)).await? {
            Frame::Integer(n) => Ok(n > 0),
            other => Err(unexpected_reply("EXISTS", &other)),
        }
    }
}

fn unexpected_reply(cmd: &str, frame: &Frame) -> Error {
    Error::Protocol {
        message: format!("unexpected reply type for {cmd}: {frame:?}"),
    }
}

/// State owned exclusively by the actor task.
struct ClusterState {
    opts: Opts,
    slots: SlotMap,
    pools: HashMap<String, Arc<Pool>>,
    throttle: Option<Interval>,
    change: Arc<Notify>,
}

impl ClusterState {
    async fn run(mut self, mut calls: mpsc::Receiver<Call>) {
        while let Some(call) = calls.recv().await {
            match call {
                Call::GetConn { key, addr, reply } => {
                    let _ = reply.send(self.get_conn(key, addr).await);
                }
                Call::Put { conn } => self.put_conn(conn),
                Call::AddrForKey { key, reply } => {
                    let _ = reply.send(self.slots.addr_for_key(&key).to_string());
                }
                Call::GetEvery { reply } => {
                    let _ = reply.send(self.get_every().await);
                }
                Call::Refresh { reply } => {
                    let _ = reply.send(self.refresh().await);
                }
                Call::CommitMoved { slot, addr } => self.slots.set(slot, addr),
                Call::Close { reply } => {
                    self.close();
                    let _ = reply.send(());
                    return;
                }
            }
        }
    }

    /// Resolves a connection for a key or an explicit address, falling back
    /// to an arbitrary pool when the preferred one cannot lend.
    async fn get_conn(
        &mut self,
        key: Option<String>,
        addr: Option<String>,
    ) -> Result<NodeConnection> {
        let addr = match key {
            Some(key) => self.slots.addr_for_key(&key).to_string(),
            None => addr.unwrap_or_default(),
        };
        if !addr.is_empty() {
            if let Ok(pool) = self.pool_for(&addr).await {
                if let Ok(conn) = pool.get().await {
                    return Ok(conn);
                }
            }
        }
        let pool = self.arbitrary_pool().ok_or(Error::NoPools)?;
        pool.get().await
    }

    /// Looks up the pool for `addr`, creating and registering one on first
    /// reference. A freshly created pool stays registered even if its
    /// validation dial failed; the next refresh legitimizes or drops it.
    async fn pool_for(&mut self, addr: &str) -> Result<Arc<Pool>> {
        if let Some(pool) = self.pools.get(addr) {
            return Ok(pool.clone());
        }
        let (pool, _dial_err) = self.new_pool(addr).await?;
        debug!(addr, "registered pool for new node");
        self.pools.insert(addr.to_string(), pool.clone());
        Ok(pool)
    }

    async fn new_pool(&self, addr: &str) -> Result<(Arc<Pool>, Option<Error>)> {
        Pool::with_dialer(
            "tcp",
            addr,
            self.opts.pool_size,
            self.opts.max_active,
            self.opts.dial.clone(),
        )
        .await
    }

    fn put_conn(&self, conn: NodeConnection) {
        match self.pools.get(conn.addr()) {
            Some(pool) => pool.put(conn),
            // The node left the topology; nothing owns this socket anymore.
            None => drop(conn),
        }
    }

    fn arbitrary_pool(&self) -> Option<Arc<Pool>> {
        self.pools.values().next().cloned()
    }

    async fn get_every(&mut self) -> Result<HashMap<String, NodeConnection>> {
        let mut conns = HashMap::new();
        for (addr, pool) in &self.pools {
            match pool.get().await {
                Ok(conn) => {
                    conns.insert(addr.clone(), conn);
                }
                Err(err) => {
                    for (addr, conn) in conns {
                        if let Some(pool) = self.pools.get(&addr) {
                            pool.put(conn);
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(conns)
    }

    async fn refresh(&mut self) -> Result<()> {
        match &mut self.throttle {
            Some(throttle) => {
                if throttle.tick().now_or_never().is_none() {
                    debug!("topology refresh throttled");
                    return Ok(());
                }
            }
            // The first refresh (during construction) runs unthrottled; the
            // throttle starts ticking from here.
            None => {
                let period = self.opts.reset_throttle;
                let mut throttle = interval_at(Instant::now() + period, period);
                throttle.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.throttle = Some(throttle);
            }
        }

        let source = self.arbitrary_pool().ok_or_else(|| Error::Protocol {
            message: "no available nodes to call CLUSTER SLOTS on".to_string(),
        })?;
        let mut conn = source.get().await?;
        let reply = conn.command(cluster_slots()).await;
        source.put(conn);
        let assignments = parse_cluster_slots(&reply?, source.addr())?;

        let mut changed = false;
        let mut next: HashMap<String, Arc<Pool>> = HashMap::new();
        for assignment in &assignments {
            self.slots
                .set_range(assignment.start, assignment.end, &assignment.addr);
            if next.contains_key(&assignment.addr) {
                continue;
            }
            match self.pools.get(&assignment.addr) {
                Some(pool) => {
                    next.insert(assignment.addr.clone(), pool.clone());
                }
                None => {
                    let (pool, _dial_err) = self.new_pool(&assignment.addr).await?;
                    next.insert(assignment.addr.clone(), pool);
                    changed = true;
                }
            }
        }
        for (addr, pool) in &self.pools {
            if !next.contains_key(addr) {
                debug!(addr = %addr, "dropping pool for departed node");
                pool.empty();
                changed = true;
            }
        }
        self.pools = next;

        debug!(nodes = self.pools.len(), changed, "topology refreshed");
        if changed {
            self.change.notify_waiters();
        }
        Ok(())
    }

    fn close(&mut self) {
        for (_, pool) in self.pools.drain() {
            pool.empty();
        }
        self.throttle = None;
    }
}
