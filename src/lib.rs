//! # Shoal
//!
//! Client library for sharded RESP key-value clusters. The cluster
//! partitions its key space into 16384 hash slots spread across nodes and
//! may reshard at any time; shoal hides all of that: commands are issued
//! against a single [`Cluster`] handle, which routes them by key, pools
//! connections per node, follows MOVED/ASK redirects, and rediscovers the
//! topology when nodes come and go.
//!
//! ## Example
//!
//! ```no_run
//! use shoal::Cluster;
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() -> shoal::Result<()> {
//!     let cluster = Cluster::connect("127.0.0.1:7000").await?;
//!     cluster.set("user:1000", Bytes::from("ada")).await?;
//!     let name = cluster.get("user:1000").await?;
//!     println!("{name:?}");
//!     cluster.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod core;
pub mod proto;

pub use crate::cluster::{key_slot, Cluster, ClusterBuilder, Pool};
pub use crate::core::command::{Arg, Cmd};
pub use crate::core::connection::{DialFunc, NodeConnection};
pub use crate::proto::error::{Error, Result};
pub use crate::proto::frame::Frame;
