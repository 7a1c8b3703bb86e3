//! The slot map and the `CLUSTER SLOTS` reply parser.

use crate::cluster::slot::{key_slot, SLOT_COUNT};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Owner table: one address per slot, the empty string meaning "unknown".
///
/// Mutated only by the coordinator's actor task.
#[derive(Debug)]
pub(crate) struct SlotMap {
    addrs: Vec<String>,
}

impl SlotMap {
    pub(crate) fn new() -> Self {
        Self {
            addrs: vec![String::new(); SLOT_COUNT as usize],
        }
    }

    pub(crate) fn addr_for_slot(&self, slot: u16) -> &str {
        &self.addrs[usize::from(slot % SLOT_COUNT)]
    }

    pub(crate) fn addr_for_key(&self, key: &str) -> &str {
        self.addr_for_slot(key_slot(key))
    }

    pub(crate) fn set(&mut self, slot: u16, addr: String) {
        self.addrs[usize::from(slot % SLOT_COUNT)] = addr;
    }

    pub(crate) fn set_range(&mut self, start: u16, end: u16, addr: &str) {
        for slot in start..=end.min(SLOT_COUNT - 1) {
            self.addrs[usize::from(slot)] = addr.to_string();
        }
    }
}

/// One master assignment out of a `CLUSTER SLOTS` reply.
#[derive(Debug, PartialEq)]
pub(crate) struct SlotAssignment {
    pub(crate) start: u16,
    pub(crate) end: u16,
    pub(crate) addr: String,
}

/// Parses a `CLUSTER SLOTS` reply into master assignments.
///
/// Each element is `[start, end, [ip, port, ...], ...replicas]`; only the
/// master entry is consulted. A node reports an empty ip for itself, in
/// which case `source_addr` (the address the reply was fetched from) is
/// substituted. Any structural surprise aborts with a protocol error; an
/// empty reply is an error of its own, since a cluster with no slots served
/// cannot route anything.
pub(crate) fn parse_cluster_slots(frame: &Frame, source_addr: &str) -> Result<Vec<SlotAssignment>> {
    let entries = frame
        .to_array()
        .ok_or_else(|| protocol("CLUSTER SLOTS reply is not an array"))?;
    if entries.is_empty() {
        return Err(protocol("empty CLUSTER SLOTS response"));
    }

    let mut assignments = Vec::with_capacity(entries.len());
    for entry in entries {
        let parts = entry
            .to_array()
            .ok_or_else(|| protocol("slot entry is not an array"))?;
        if parts.len() < 3 {
            return Err(protocol("slot entry too short"));
        }
        let start = slot_number(&parts[0])?;
        let end = slot_number(&parts[1])?;
        let master = parts[2]
            .to_array()
            .ok_or_else(|| protocol("master entry is not an array"))?;
        if master.len() < 2 {
            return Err(protocol("master entry too short"));
        }
        let ip = master[0]
            .to_string_lossy()
            .ok_or_else(|| protocol("master ip is not a string"))?;
        let port = master[1]
            .to_int()
            .ok_or_else(|| protocol("master port is not an integer"))?;
        let addr = if ip.is_empty() {
            source_addr.to_string()
        } else {
            format!("{ip}:{port}")
        };
        assignments.push(SlotAssignment { start, end, addr });
    }
    Ok(assignments)
}

fn slot_number(frame: &Frame) -> Result<u16> {
    frame
        .to_int()
        .and_then(|n| u16::try_from(n).ok())
        .filter(|n| *n < SLOT_COUNT)
        .ok_or_else(|| protocol("slot number out of range"))
}

fn protocol(message: &str) -> Error {
    Error::Protocol {
        message: message.to_string(),
    }
}
