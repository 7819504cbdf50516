use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use respool::proto::codec::{Decoder, Encoder};
use respool::{Client, ClientBuilder, Cmd, Error, Frame, PoolStats};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What the scripted server sends back.
enum Reply {
    Frame(Frame),
    Raw(&'static [u8]),
    Sleep(u64, Frame),
}

fn respond(args: &[Bytes]) -> Reply {
    let verb = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match verb.as_str() {
        "PING" => Reply::Frame(Frame::status("PONG")),
        "SET" => Reply::Frame(Frame::status("OK")),
        "GARBAGE" => Reply::Raw(b"?not resp\r\n"),
        "TRUNCATED" => Reply::Raw(b"$10\r\nabc"),
        "SLEEP" => {
            let ms = String::from_utf8_lossy(&args[1]).parse().unwrap_or(0);
            Reply::Sleep(ms, Frame::status("OK"))
        }
        "HGETALL" => Reply::Frame(Frame::Array(vec![
            Frame::bulk("field1"),
            Frame::bulk("hello"),
            Frame::bulk("field2"),
            Frame::bulk("42"),
        ])),
        "KEYS" => Reply::Frame(Frame::Array(vec![
            Frame::bulk("a"),
            Frame::Bulk(None),
            Frame::bulk("c"),
        ])),
        _ => Reply::Frame(Frame::Error(format!("ERR unknown command '{}'", verb))),
    }
}

/// Starts the scripted server; returns its address and accept counter.
async fn spawn_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut decoder = Decoder::new();
                let mut encoder = Encoder::new();
                let mut buf = [0u8; 4096];

                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    decoder.append(&buf[..n]);

                    while let Ok(Some(Frame::Array(items))) = decoder.decode() {
                        let args: Vec<Bytes> = items
                            .into_iter()
                            .filter_map(|item| match item {
                                Frame::Bulk(Some(data)) => Some(data),
                                _ => None,
                            })
                            .collect();

                        let data = match respond(&args) {
                            Reply::Frame(frame) => {
                                encoder.encode(&frame);
                                encoder.take().freeze()
                            }
                            Reply::Raw(raw) => Bytes::from_static(raw),
                            Reply::Sleep(ms, frame) => {
                                tokio::time::sleep(Duration::from_millis(ms)).await;
                                encoder.encode(&frame);
                                encoder.take().freeze()
                            }
                        };
                        if socket.write_all(&data).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    (addr.to_string(), accepted)
}

async fn client_with(max_idle: usize, max_active: usize) -> (Client, Arc<AtomicUsize>) {
    let (addr, accepted) = spawn_server().await;
    let client = ClientBuilder::new()
        .address(addr)
        .max_idle(max_idle)
        .max_active(max_active)
        .wait(false)
        .build()
        .unwrap();
    (client, accepted)
}

#[tokio::test]
async fn test_set_returns_ok_status() {
    let (client, _) = client_with(4, 4).await;
    let reply = client
        .query(&Cmd::new("SET").arg("k").arg("v"))
        .await
        .unwrap();
    assert_eq!(reply, Frame::status("OK"));
    assert_eq!(
        client.string(&Cmd::new("SET").arg("k").arg("v")).await.unwrap(),
        "OK"
    );
}

#[tokio::test]
async fn test_malformed_reply_connection_is_not_reused() {
    let (client, accepted) = client_with(4, 4).await;
    client.ping().await.unwrap();
    assert_eq!(client.pool().stats(), PoolStats { active: 1, idle: 1 });

    let err = client.query(&Cmd::new("GARBAGE")).await.unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
    assert_eq!(client.pool().stats(), PoolStats { active: 0, idle: 0 });

    client.ping().await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_truncated_reply_connection_is_not_reused() {
    let (client, accepted) = client_with(4, 4).await;

    // The server keeps the socket open, so a read deadline is what ends
    // the wait for the rest of the frame.
    let err = client
        .query_with_timeout(&Cmd::new("TRUNCATED"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(client.pool().stats(), PoolStats { active: 0, idle: 0 });

    client.ping().await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_deadline_shorter_than_latency() {
    let (client, _) = client_with(4, 4).await;
    let err = client
        .query_with_timeout(&Cmd::new("SLEEP").arg(300), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(client.pool().stats().idle, 0);

    let reply = client
        .query_with_timeout(&Cmd::new("SLEEP").arg(0), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply, Frame::status("OK"));
    assert_eq!(client.pool().stats(), PoolStats { active: 1, idle: 1 });
}

#[tokio::test]
async fn test_exhausted_pool_fails_fast() {
    let (client, _) = client_with(2, 2).await;
    let _a = client.get_connection().await.unwrap();
    let _b = client.get_connection().await.unwrap();
    assert!(matches!(client.ping().await, Err(Error::PoolExhausted)));
}

#[tokio::test]
async fn test_max_idle_caps_cached_connections() {
    let (client, accepted) = client_with(1, 4).await;
    let mut conns = vec![
        client.get_connection().await.unwrap(),
        client.get_connection().await.unwrap(),
        client.get_connection().await.unwrap(),
    ];
    // A reply proves the server has accepted each socket.
    for conn in conns.iter_mut() {
        assert_eq!(
            conn.send(&Cmd::new("PING")).await.unwrap(),
            Frame::status("PONG")
        );
    }
    assert_eq!(client.pool().stats(), PoolStats { active: 3, idle: 0 });
    drop(conns);
    assert_eq!(client.pool().stats(), PoolStats { active: 1, idle: 1 });
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_collection_coercion_through_client() {
    let (client, _) = client_with(4, 4).await;

    let map = client.string_map(&Cmd::new("HGETALL").arg("h")).await.unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map["field1"], "hello");

    let keys = client.strings(&Cmd::new("KEYS").arg("*")).await.unwrap();
    assert_eq!(keys, vec!["a".to_string(), String::new(), "c".to_string()]);

    let err = client.int64(&Cmd::new("NOPE")).await.unwrap_err();
    assert!(matches!(err, Error::Server { .. }));
    assert_eq!(client.pool().stats(), PoolStats { active: 1, idle: 1 });
}
