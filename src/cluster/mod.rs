//! Cluster coordination: slot-based routing, per-node pooling, redirect
//! handling and topology discovery.
//!
//! - **Slot routing**: every key hashes to one of 16384 slots; the slot map
//!   names the owning node.
//! - **Pooling**: one two-tier [`Pool`] per node, created lazily and
//!   reconciled on every refresh.
//! - **Redirects**: MOVED rewrites the slot map and retries; ASK retries
//!   once behind an `ASKING` preamble without touching the map.
//! - **Discovery**: `CLUSTER SLOTS` against an arbitrary node, throttled so
//!   concurrent failures trigger a single round-trip.

mod builder;
mod client;
pub mod commands;
pub(crate) mod errors;
mod key;
mod pool;
mod slot;
mod topology;

pub use builder::ClusterBuilder;
pub use client::Cluster;
pub use key::key_from_args;
pub use pool::Pool;
pub use slot::{key_slot, SLOT_COUNT};
