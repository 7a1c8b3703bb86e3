//! In-process mock node for integration tests.
//!
//! Binds a real listener, decodes incoming commands with the crate's own
//! codec, and lets each test script the replies: a closure receives the
//! command name and arguments and decides whether to answer or hang up.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use shoal::proto::codec::{Decoder, Encoder};
use shoal::proto::frame::Frame;

/// What the handler wants done with a received command.
pub enum Action {
    /// Write this frame back.
    Reply(Frame),
    /// Drop the connection without replying, simulating a node failure.
    Hangup,
}

/// A scripted node listening on a real local port.
pub struct MockNode {
    addr: String,
    listener: Option<TcpListener>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    connections: Arc<AtomicUsize>,
}

impl MockNode {
    /// Binds a listener on an ephemeral port. Call [`serve`](MockNode::serve)
    /// to start answering; binding first lets tests capture the address in
    /// their handler closures.
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        Self {
            addr,
            listener: Some(listener),
            hits: Arc::new(Mutex::new(HashMap::new())),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The `host:port` this node listens on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Starts the accept loop with the given command handler.
    pub fn serve<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str, &[String]) -> Action + Send + 'static,
    {
        let listener = self.listener.take().expect("serve called twice");
        let hits = self.hits.clone();
        let connections = self.connections.clone();
        let handler = Arc::new(Mutex::new(handler));
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle_conn(socket, hits.clone(), handler.clone()));
            }
        });
        self
    }

    /// How many times a command (by upper-cased name) has been received.
    pub fn hits(&self, command: &str) -> usize {
        *self.hits.lock().unwrap().get(command).unwrap_or(&0)
    }

    /// How many TCP connections have been accepted.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn handle_conn<F>(
    mut socket: TcpStream,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    handler: Arc<Mutex<F>>,
) where
    F: FnMut(&str, &[String]) -> Action + Send + 'static,
{
    let mut decoder = Decoder::new();
    let mut encoder = Encoder::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        decoder.append(&buf[..n]);
        loop {
            let frame = match decoder.decode() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) => return,
            };
            let mut parts = Vec::new();
            if let Some(items) = frame.to_array() {
                for item in items {
                    parts.push(item.to_string_lossy().unwrap_or_default());
                }
            }
            let Some(name) = parts.first() else { return };
            let name = name.to_uppercase();
            *hits.lock().unwrap().entry(name.clone()).or_insert(0) += 1;
            let action = {
                let mut handler = handler.lock().unwrap();
                (*handler)(&name, &parts[1..])
            };
            match action {
                Action::Reply(reply) => {
                    encoder.encode(&reply);
                    let data = encoder.take();
                    if socket.write_all(&data).await.is_err() {
                        return;
                    }
                }
                Action::Hangup => return,
            }
        }
    }
}

/// Builds a `CLUSTER SLOTS` reply from `(start, end, "ip:port")` ranges.
pub fn slots_reply(ranges: &[(u16, u16, &str)]) -> Frame {
    Frame::Array(
        ranges
            .iter()
            .map(|(start, end, addr)| {
                let (ip, port) = addr.rsplit_once(':').expect("addr must be ip:port");
                Frame::Array(vec![
                    Frame::Integer(i64::from(*start)),
                    Frame::Integer(i64::from(*end)),
                    Frame::Array(vec![
                        bulk(ip),
                        Frame::Integer(port.parse().unwrap()),
                        bulk("0f8e7d6c5b4a39281706f5e4d3c2b1a098765432"),
                    ]),
                ])
            })
            .collect(),
    )
}

pub fn bulk(s: &str) -> Frame {
    Frame::BulkString(Some(Bytes::from(s.to_string())))
}

pub fn simple(s: &str) -> Frame {
    Frame::SimpleString(s.as_bytes().to_vec())
}

pub fn moved(slot: u16, addr: &str) -> Frame {
    Frame::Error(format!("MOVED {slot} {addr}").into_bytes())
}

pub fn ask(slot: u16, addr: &str) -> Frame {
    Frame::Error(format!("ASK {slot} {addr}").into_bytes())
}
