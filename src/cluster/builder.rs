use std::time::Duration;

use crate::cluster::client::{Cluster, Opts};
use crate::core::connection::{default_dialer, DialFunc};
use crate::proto::error::{Error, Result};

const DEFAULT_POOL_SIZE: i32 = 10;
const DEFAULT_RESET_THROTTLE: Duration = Duration::from_secs(10);

/// Builder for configuring and connecting a [`Cluster`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use shoal::ClusterBuilder;
///
/// # async fn example() -> shoal::Result<()> {
/// let cluster = ClusterBuilder::new()
///     .address("127.0.0.1:7000")
///     .timeout(Duration::from_secs(1))
///     .pool_size(20)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ClusterBuilder {
    address: Option<String>,
    timeout: Option<Duration>,
    pool_size: Option<i32>,
    max_active: Option<i32>,
    reset_throttle: Option<Duration>,
    dial: Option<DialFunc>,
}

impl ClusterBuilder {
    /// Creates a new [`ClusterBuilder`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the seed node address (`host:port`). Required.
    #[inline]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the per-connection I/O timeout. Unset means the connections'
    /// own default (no timeout).
    #[inline]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the primary-tier pool size used for each node. Default 10.
    #[inline]
    pub fn pool_size(mut self, size: i32) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Sets the per-node connection cap. Default is the pool's own cap of
    /// 100.
    #[inline]
    pub fn max_active(mut self, max_active: i32) -> Self {
        self.max_active = Some(max_active);
        self
    }

    /// Sets the minimum interval between topology refreshes. Default 10 s.
    #[inline]
    pub fn reset_throttle(mut self, throttle: Duration) -> Self {
        self.reset_throttle = Some(throttle);
        self
    }

    /// Replaces the connection factory, e.g. to authenticate new
    /// connections. Defaults to plain TCP with the configured timeout.
    #[inline]
    pub fn dialer(mut self, dial: DialFunc) -> Self {
        self.dial = Some(dial);
        self
    }

    /// Connects to the seed node and discovers the cluster topology.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when no address is set, the seed
    /// dial error when the seed is unreachable, and any error of the
    /// initial topology refresh.
    pub async fn build(self) -> Result<Cluster> {
        let addr = self.address.ok_or_else(|| Error::InvalidArgument {
            message: "address is required".to_string(),
        })?;
        let dial = self
            .dial
            .unwrap_or_else(|| default_dialer(self.timeout));
        Cluster::with_opts(Opts {
            addr,
            pool_size: self.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
            max_active: self.max_active.unwrap_or(0),
            reset_throttle: self.reset_throttle.unwrap_or(DEFAULT_RESET_THROTTLE),
            dial,
        })
        .await
    }
}
