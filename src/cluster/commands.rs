//! Builders for the cluster-management commands the coordinator issues on
//! its own behalf.

use crate::core::command::Cmd;

/// `CLUSTER SLOTS`, the topology-discovery command behind every refresh.
pub fn cluster_slots() -> Cmd {
    Cmd::new("CLUSTER").arg("SLOTS")
}

/// `ASKING`, the one-shot preamble before retrying a command that was
/// answered with an ASK redirect.
pub fn asking() -> Cmd {
    Cmd::new("ASKING")
}

/// `PING`, the liveness probe issued by each pool's background task.
pub fn ping() -> Cmd {
    Cmd::new("PING")
}
