//! Wire protocol: RESP frames and their streaming codec.
//!
//! Every node in the cluster speaks RESP. Commands go out as arrays of bulk
//! strings; replies come back as any [`Frame`](frame::Frame) variant. The
//! coordinator never sees raw bytes, only decoded frames.

pub mod codec;
pub mod error;
pub mod frame;
