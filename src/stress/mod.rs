//! Internal stress tests for the pool.
//!
//! These tests hammer one pool from many tasks and check that the capacity
//! bounds hold and that broken connections never come back.

use std::time::Duration;

use crate::core::builder::ClientBuilder;
use crate::core::command::Cmd;
use crate::proto::codec::{Decoder, Encoder};
use crate::proto::frame::Frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers PING with PONG, `SLEEP <ms>` after the delay, anything else OK.
async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(s) => s,
                Err(_) => break,
            };

            tokio::spawn(async move {
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

                    while let Ok(Some(frame)) = decoder.decode() {
                        let response = match frame {
                            Frame::Array(ref args) => match args.as_slice() {
                                [Frame::Bulk(Some(cmd))] if cmd.eq_ignore_ascii_case(b"PING") => {
                                    Frame::status("PONG")
                                }
                                [Frame::Bulk(Some(cmd)), Frame::Bulk(Some(ms))]
                                    if cmd.eq_ignore_ascii_case(b"SLEEP") =>
                                {
                                    let ms = std::str::from_utf8(ms)
                                        .ok()
                                        .and_then(|s| s.parse().ok())
                                        .unwrap_or(0);
                                    tokio::time::sleep(Duration::from_millis(ms)).await;
                                    Frame::status("OK")
                                }
                                _ => Frame::status("OK"),
                            },
                            _ => Frame::Error("ERR format".to_string()),
                        };

                        encoder.encode(&response);
                        let data = encoder.take();
                        if socket.write_all(&data).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    addr.to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_stress_bounds() {
    let addr = spawn_server().await;
    let client = ClientBuilder::new()
        .address(addr)
        .max_idle(4)
        .max_active(8)
        .build()
        .expect("Failed to build client");

    let mut handles = Vec::new();
    for _ in 0..1000 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let res = client.ping().await;
            assert_eq!(res.unwrap(), "PONG");
            let stats = client.pool().stats();
            assert!(stats.active <= 8, "active {} over limit", stats.active);
            assert!(stats.idle <= 4, "idle {} over limit", stats.idle);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let stats = client.pool().stats();
    assert!(stats.idle <= 4);
    assert_eq!(stats.active, stats.idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_stress_with_deadlines() {
    let addr = spawn_server().await;
    let client = ClientBuilder::new()
        .address(addr)
        .max_idle(8)
        .max_active(8)
        .build()
        .expect("Failed to build client");

    let mut handles = Vec::new();
    for i in 0..200u64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            // Every fourth call outlives its deadline.
            let (delay, deadline) = if i % 4 == 0 { (200, 10) } else { (0, 2000) };
            let cmd = Cmd::new("SLEEP").arg(delay);
            let res = client
                .query_with_timeout(&cmd, Duration::from_millis(deadline))
                .await;
            if i % 4 == 0 {
                assert!(matches!(res, Err(crate::Error::Timeout { .. })));
            } else {
                assert_eq!(res.unwrap(), Frame::status("OK"));
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let stats = client.pool().stats();
    assert!(stats.active <= 8);
    assert_eq!(stats.active, stats.idle);

    for _ in 0..stats.idle {
        let mut conn = client.get_connection().await.unwrap();
        assert!(!conn.is_broken());
        assert_eq!(
            conn.send(&Cmd::new("PING")).await.unwrap(),
            Frame::status("PONG")
        );
    }
}
