//! Command building and per-node connections.
//!
//! A [`command::Cmd`] is the unit of work handed to the cluster; a
//! [`connection::NodeConnection`] is the unit of transport the pools manage.

pub mod command;
pub mod connection;
