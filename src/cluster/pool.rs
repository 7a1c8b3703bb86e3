//! Two-tier bounded connection pool for a single node.
//!
//! The primary tier is the steady-state hot set: a fixed reservoir of idle
//! connections recycled on every get/put. The secondary tier absorbs bursts
//! beyond the hot set and sheds one connection per put once it has gone
//! unused for a minute, so surge capacity drains without churning on every
//! return. Beyond both tiers, connections are dialed on demand up to
//! `max_active`, reserved through a CAS on the active counter so concurrent
//! callers can never overshoot the cap.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::cluster::commands::ping;
use crate::core::command::Cmd;
use crate::core::connection::{DialFunc, NodeConnection};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Idle time before surge connections start being shed.
const WAIT_FOR_REUSE: Duration = Duration::from_secs(60);

/// Cap applied when the caller passes a non-positive `max_active`.
const DEFAULT_MAX_ACTIVE: i32 = 100;

/// When the pool is idle, every primary connection is probed about once per
/// this interval.
const PROBE_CYCLE: Duration = Duration::from_secs(5 * 60);

/// Bounded MPMC queue of idle connections. A zero-capacity tier behaves as
/// permanently full.
struct Tier {
    queue: Option<ArrayQueue<NodeConnection>>,
}

impl Tier {
    fn new(capacity: usize) -> Self {
        Self {
            queue: (capacity > 0).then(|| ArrayQueue::new(capacity)),
        }
    }

    fn pop(&self) -> Option<NodeConnection> {
        self.queue.as_ref()?.pop()
    }

    fn push(&self, conn: NodeConnection) -> std::result::Result<(), NodeConnection> {
        match &self.queue {
            Some(queue) => queue.push(conn),
            None => Err(conn),
        }
    }

    fn len(&self) -> usize {
        self.queue.as_ref().map_or(0, |queue| queue.len())
    }
}

/// A bounded pool of connections to one node address.
///
/// `get` never waits: it hands out an idle connection, dials a new one if
/// the active count allows, or fails with [`Error::PoolExhausted`]. A
/// background task probes idle connections with `PING` so dead ones are
/// detected and discarded while the pool sits unused.
pub struct Pool {
    network: String,
    addr: String,
    dial: DialFunc,
    primary: Tier,
    secondary: Tier,
    /// Connections attributable to this pool: idle in either tier plus
    /// checked out. Never exceeds `max_active`.
    active: AtomicI32,
    max_active: i32,
    epoch: Instant,
    /// Milliseconds since `epoch` of the last secondary-tier activity.
    secondary_last_active: AtomicU64,
    stopped: AtomicBool,
    stop_tx: watch::Sender<bool>,
    init_done: watch::Receiver<bool>,
}

impl Pool {
    /// Creates a pool of connections to `addr`, dialing through `dial`.
    ///
    /// `size` is the primary-tier capacity, `max_active` the total
    /// connection cap; `max_active ≤ 0` defaults to 100, and a `size`
    /// larger than the resulting cap is rejected. One connection is dialed
    /// synchronously to validate
    /// reachability: if that fails the pool is still returned, usable but
    /// empty, with the dial error alongside it. The remaining `size − 1`
    /// connections are dialed in the background and individual failures are
    /// swallowed.
    pub async fn with_dialer(
        network: &str,
        addr: &str,
        size: i32,
        max_active: i32,
        dial: DialFunc,
    ) -> Result<(Arc<Self>, Option<Error>)> {
        let max_active = if max_active <= 0 {
            DEFAULT_MAX_ACTIVE
        } else {
            max_active
        };
        if max_active < size {
            return Err(Error::InvalidArgument {
                message: format!("pool size {size} exceeds max active {max_active}"),
            });
        }
        let size = size.max(0);

        let (stop_tx, stop_rx) = watch::channel(false);
        let (init_tx, init_done) = watch::channel(false);
        let pool = Arc::new(Self {
            network: network.to_string(),
            addr: addr.to_string(),
            dial,
            primary: Tier::new(size as usize),
            secondary: Tier::new((max_active - size) as usize),
            active: AtomicI32::new(0),
            max_active,
            epoch: Instant::now(),
            secondary_last_active: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            stop_tx,
            init_done,
        });
        debug!(addr, size, max_active, "pool created");

        // The probe must start before the validation dial so `empty` works
        // on a pool whose constructor reported an error.
        pool.spawn_probe(stop_rx, size);

        if size < 1 {
            let _ = init_tx.send(true);
            return Ok((pool, None));
        }

        match (pool.dial)(pool.network.clone(), pool.addr.clone()).await {
            Ok(conn) => {
                pool.active.fetch_add(1, Ordering::AcqRel);
                if pool.primary.push(conn).is_err() {
                    pool.active.fetch_sub(1, Ordering::AcqRel);
                }
            }
            Err(err) => {
                let _ = init_tx.send(true);
                return Ok((pool, Some(err)));
            }
        }

        pool.spawn_fill(size, init_tx);
        Ok((pool, None))
    }

    /// The address this pool connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The network this pool connects over.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Retrieves an idle connection, or dials a new one on the fly.
    ///
    /// Never blocks waiting for a peer to return a connection: once
    /// `max_active` connections exist and none is idle, this fails with
    /// [`Error::PoolExhausted`].
    pub async fn get(&self) -> Result<NodeConnection> {
        if let Some(conn) = self.primary.pop() {
            return Ok(conn);
        }
        if let Some(conn) = self.secondary.pop() {
            self.touch_secondary();
            return Ok(conn);
        }
        loop {
            let active = self.active.load(Ordering::Acquire);
            if active >= self.max_active {
                return Err(Error::PoolExhausted);
            }
            // Reserve the slot before dialing; a failed dial releases it.
            if self
                .active
                .compare_exchange(active, active + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return match (self.dial)(self.network.clone(), self.addr.clone()).await {
                    Ok(conn) => Ok(conn),
                    Err(err) => {
                        self.active.fetch_sub(1, Ordering::AcqRel);
                        Err(err)
                    }
                };
            }
        }
    }

    /// Returns a connection to the pool.
    ///
    /// Connections carrying a critical error, and any connection returned
    /// after [`empty`](Pool::empty), are closed instead of pooled. When the
    /// primary tier accepts the connection and the secondary tier has gone
    /// unused for a minute, one surge connection is drained and closed.
    pub fn put(&self, conn: NodeConnection) {
        if conn.last_critical().is_some() || self.stopped.load(Ordering::Acquire) {
            self.discard(conn);
            return;
        }
        match self.primary.push(conn) {
            Ok(()) => {
                if self.secondary_stale() {
                    match self.secondary.pop() {
                        Some(surge) => self.discard(surge),
                        // Nothing to shed; refresh the stamp so idle pools
                        // don't re-check on every put.
                        None => self.touch_secondary(),
                    }
                }
            }
            Err(conn) => {
                if let Err(conn) = self.secondary.push(conn) {
                    self.discard(conn);
                }
            }
        }
    }

    /// Gets a connection, executes `cmd`, and puts the connection back.
    pub async fn cmd(&self, cmd: Cmd) -> Result<Frame> {
        let mut conn = self.get().await?;
        let result = conn.command(cmd).await;
        self.put(conn);
        result
    }

    /// Shuts the pool down: stops the background probe and closes every
    /// idle primary connection. Idempotent. Connections currently checked
    /// out (or parked in the secondary tier) are closed as they come back
    /// through [`put`](Pool::put).
    pub fn empty(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            let _ = self.stop_tx.send(true);
        }
        while let Some(conn) = self.primary.pop() {
            self.discard(conn);
        }
    }

    /// Number of idle connections in the primary tier. When zero, the next
    /// get either taps surge capacity or dials on the fly.
    pub fn available(&self) -> usize {
        self.primary.len()
    }

    fn discard(&self, conn: NodeConnection) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        drop(conn);
    }

    fn touch_secondary(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.secondary_last_active.store(now, Ordering::Release);
    }

    fn secondary_stale(&self) -> bool {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.secondary_last_active.load(Ordering::Acquire);
        now.saturating_sub(last) > WAIT_FOR_REUSE.as_millis() as u64
    }

    fn spawn_probe(self: &Arc<Self>, mut stop_rx: watch::Receiver<bool>, size: i32) {
        let weak = Arc::downgrade(self);
        let period = PROBE_CYCLE / size.max(1) as u32;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    _ = tick.tick() => {
                        let Some(pool) = weak.upgrade() else { return };
                        if let Err(err) = pool.cmd(ping()).await {
                            debug!(addr = %pool.addr, error = %err, "liveness probe failed");
                        }
                    }
                }
            }
        });
    }

    fn spawn_fill(self: &Arc<Self>, size: i32, init_tx: watch::Sender<bool>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            for _ in 1..size {
                let Some(pool) = weak.upgrade() else { return };
                if pool.stopped.load(Ordering::Acquire) {
                    break;
                }
                if let Ok(conn) = (pool.dial)(pool.network.clone(), pool.addr.clone()).await {
                    pool.active.fetch_add(1, Ordering::AcqRel);
                    if pool.primary.push(conn).is_err() {
                        pool.active.fetch_sub(1, Ordering::AcqRel);
                    }
                }
            }
            let _ = init_tx.send(true);
        });
    }

    /// Waits until the background pre-dial of the initial `size`
    /// connections has finished, successfully or not. Useful when warm-up
    /// should complete before taking traffic.
    pub async fn wait_initialized(&self) {
        let mut rx = self.init_done.clone();
        let _ = rx.wait_for(|done| *done).await;
    }

    #[cfg(test)]
    fn backdate_secondary(&self, by: Duration) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.secondary_last_active
            .store(now.saturating_sub(by.as_millis() as u64), Ordering::Release);
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("addr", &self.addr)
            .field("active", &self.active.load(Ordering::Relaxed))
            .field("max_active", &self.max_active)
            .field("available", &self.available())
            .finish()
    }
}
