//! Test utilities: a scriptable RESP server on a local TCP port.
//!
//! Available in unit tests and, for integration tests, behind the
//! `test-utils` feature.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::proto::codec::{Decoder, Encoder};
use crate::proto::frame::Frame;

/// What the server does in response to one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Send this frame.
    Frame(Frame),
    /// Wait, then send the frame.
    Delay(Duration, Frame),
    /// Send these bytes verbatim, well-formed or not.
    Raw(Bytes),
    /// Close the connection without replying.
    Close,
}

type Handler = dyn Fn(Vec<Bytes>) -> MockReply + Send + Sync;

/// A RESP server that answers each request through a handler closure.
///
/// The accept loop stops when the server is dropped; connections already
/// accepted keep running until the client hangs up.
#[derive(Debug)]
pub struct MockServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Vec<Bytes>>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Binds to an ephemeral localhost port and starts serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(Vec<Bytes>) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let accepted = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let task = {
            let accepted = accepted.clone();
            let commands = commands.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(socket, handler.clone(), commands.clone()));
                }
            })
        };

        Self {
            addr,
            accepted,
            commands,
            task,
        }
    }

    /// A server backed by a small in-memory keyspace that understands
    /// `PING`, `SET`, `GET`, `DEL`, `HSET`, `HMSET`, `HGETALL`, `HMGET`,
    /// and accepts the handshake commands.
    pub async fn store() -> Self {
        let store = Arc::new(Mutex::new(Store::default()));
        Self::start(move |args| {
            let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
            MockReply::Frame(store.apply(&args))
        })
        .await
    }

    /// The bound socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The bound address as `host:port`.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Every request received so far, across all connections.
    pub fn commands(&self) -> Vec<Vec<Bytes>> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    handler: Arc<Handler>,
    commands: Arc<Mutex<Vec<Vec<Bytes>>>>,
) {
    let mut decoder = Decoder::new();
    let mut encoder = Encoder::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => return,
        };
        decoder.append(&buf[..n]);

        loop {
            let frame = match decoder.decode() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) => return,
            };
            let args = request_args(frame);
            commands
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(args.clone());

            let data = match handler(args) {
                MockReply::Frame(frame) => {
                    encoder.encode(&frame);
                    encoder.take().freeze()
                }
                MockReply::Delay(delay, frame) => {
                    tokio::time::sleep(delay).await;
                    encoder.encode(&frame);
                    encoder.take().freeze()
                }
                MockReply::Raw(data) => data,
                MockReply::Close => return,
            };
            if socket.write_all(&data).await.is_err() {
                return;
            }
        }
    }
}

fn request_args(frame: Frame) -> Vec<Bytes> {
    match frame {
        Frame::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Frame::Bulk(Some(data)) => data,
                other => Bytes::from(other.to_string()),
            })
            .collect(),
        other => vec![Bytes::from(other.to_string())],
    }
}

enum Value {
    Str(Bytes),
    Hash(Vec<(Bytes, Bytes)>),
}

#[derive(Default)]
struct Store {
    keys: HashMap<Bytes, Value>,
}

fn wrong_args(verb: &str) -> Frame {
    Frame::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        verb.to_ascii_lowercase()
    ))
}

fn wrong_type() -> Frame {
    Frame::Error("WRONGTYPE Operation against a key holding the wrong kind of value".to_string())
}

impl Store {
    fn apply(&mut self, args: &[Bytes]) -> Frame {
        let Some(verb) = args.first() else {
            return Frame::Error("ERR empty command".to_string());
        };
        let verb = String::from_utf8_lossy(verb).to_ascii_uppercase();
        let rest = &args[1..];

        match verb.as_str() {
            "PING" => Frame::status("PONG"),
            "AUTH" | "SELECT" | "CLIENT" => Frame::status("OK"),
            "SET" if rest.len() == 2 => {
                self.keys
                    .insert(rest[0].clone(), Value::Str(rest[1].clone()));
                Frame::status("OK")
            }
            "GET" if rest.len() == 1 => match self.keys.get(&rest[0]) {
                Some(Value::Str(data)) => Frame::Bulk(Some(data.clone())),
                Some(Value::Hash(_)) => wrong_type(),
                None => Frame::Bulk(None),
            },
            "DEL" if !rest.is_empty() => {
                let removed = rest
                    .iter()
                    .filter(|key| self.keys.remove(*key).is_some())
                    .count();
                Frame::Integer(removed as i64)
            }
            "HSET" | "HMSET" if rest.len() >= 3 && rest.len() % 2 == 1 => {
                let added = match self.hash_mut(&rest[0]) {
                    Some(hash) => set_fields(hash, &rest[1..]),
                    None => return wrong_type(),
                };
                if verb == "HSET" {
                    Frame::Integer(added as i64)
                } else {
                    Frame::status("OK")
                }
            }
            "HGETALL" if rest.len() == 1 => match self.keys.get(&rest[0]) {
                Some(Value::Hash(fields)) => Frame::Array(
                    fields
                        .iter()
                        .flat_map(|(f, v)| [Frame::bulk(f.clone()), Frame::bulk(v.clone())])
                        .collect(),
                ),
                Some(Value::Str(_)) => wrong_type(),
                None => Frame::Array(Vec::new()),
            },
            "HMGET" if rest.len() >= 2 => {
                let fields = match self.keys.get(&rest[0]) {
                    Some(Value::Hash(fields)) => fields.as_slice(),
                    Some(Value::Str(_)) => return wrong_type(),
                    None => &[][..],
                };
                Frame::Array(
                    rest[1..]
                        .iter()
                        .map(|name| {
                            fields
                                .iter()
                                .find(|(f, _)| f == name)
                                .map(|(_, v)| Frame::bulk(v.clone()))
                                .unwrap_or(Frame::Bulk(None))
                        })
                        .collect(),
                )
            }
            "SET" | "GET" | "DEL" | "HSET" | "HMSET" | "HGETALL" | "HMGET" => wrong_args(&verb),
            _ => Frame::Error(format!("ERR unknown command '{}'", verb.to_ascii_lowercase())),
        }
    }

    fn hash_mut(&mut self, key: &Bytes) -> Option<&mut Vec<(Bytes, Bytes)>> {
        match self
            .keys
            .entry(key.clone())
            .or_insert_with(|| Value::Hash(Vec::new()))
        {
            Value::Hash(fields) => Some(fields),
            Value::Str(_) => None,
        }
    }
}

/// Sets alternating field/value pairs, returning how many fields were new.
fn set_fields(hash: &mut Vec<(Bytes, Bytes)>, pairs: &[Bytes]) -> usize {
    let mut added = 0;
    for pair in pairs.chunks_exact(2) {
        match hash.iter_mut().find(|(f, _)| *f == pair[0]) {
            Some((_, value)) => *value = pair[1].clone(),
            None => {
                hash.push((pair[0].clone(), pair[1].clone()));
                added += 1;
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    #[test]
    fn test_store_strings() {
        let mut store = Store::default();
        assert_eq!(store.apply(&args(&["SET", "k", "v"])), Frame::status("OK"));
        assert_eq!(store.apply(&args(&["get", "k"])), Frame::bulk("v"));
        assert_eq!(store.apply(&args(&["GET", "missing"])), Frame::Bulk(None));
        assert_eq!(store.apply(&args(&["DEL", "k", "missing"])), Frame::Integer(1));
    }

    #[test]
    fn test_store_hashes() {
        let mut store = Store::default();
        assert_eq!(
            store.apply(&args(&["HSET", "h", "a", "1", "b", "2"])),
            Frame::Integer(2)
        );
        assert_eq!(
            store.apply(&args(&["HMSET", "h", "a", "3"])),
            Frame::status("OK")
        );
        assert_eq!(
            store.apply(&args(&["HGETALL", "h"])),
            Frame::Array(vec![
                Frame::bulk("a"),
                Frame::bulk("3"),
                Frame::bulk("b"),
                Frame::bulk("2"),
            ])
        );
        assert_eq!(
            store.apply(&args(&["HMGET", "h", "b", "zz"])),
            Frame::Array(vec![Frame::bulk("2"), Frame::Bulk(None)])
        );
        assert!(matches!(store.apply(&args(&["GET", "h"])), Frame::Error(_)));
    }

    #[test]
    fn test_store_rejects_bad_arity() {
        let mut store = Store::default();
        assert!(matches!(store.apply(&args(&["SET", "k"])), Frame::Error(_)));
        assert!(matches!(store.apply(&args(&["HSET", "h", "a"])), Frame::Error(_)));
    }

    #[tokio::test]
    async fn test_server_records_commands() {
        let server = MockServer::start(|_| MockReply::Frame(Frame::status("OK"))).await;
        let mut socket = TcpStream::connect(server.addr()).await.unwrap();
        socket
            .write_all(b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 5];
        socket.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"+OK\r\n");
        assert_eq!(server.accepted(), 1);
        assert_eq!(server.commands(), vec![args(&["ECHO", "hi"])]);
    }
}
