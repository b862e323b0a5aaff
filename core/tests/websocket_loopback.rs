/*
 * websocket_loopback.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Runs a relay session over the real WebSocket client against a minimal
 * relay on 127.0.0.1: handshake, ping/pong, a fragmented EVENT, EOSE,
 * then CLOSE and a close frame from the client.
 */

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ned_core::protocol::nostr::{fetch_events, Query, SessionEnd, WebSocketConnector};
use ned_core::FetchConfig;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Read one client frame: (fin, opcode, unmasked payload).
async fn read_frame(stream: &mut TcpStream) -> (bool, u8, Vec<u8>) {
    let mut hdr = [0u8; 2];
    stream.read_exact(&mut hdr).await.unwrap();
    assert!(hdr[1] & 0x80 != 0, "client frames must be masked");
    let len = match hdr[1] & 0x7f {
        126 => stream.read_u16().await.unwrap() as usize,
        127 => stream.read_u64().await.unwrap() as usize,
        n => n as usize,
    };
    let mut mask = [0u8; 4];
    stream.read_exact(&mut mask).await.unwrap();
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= mask[i % 4];
    }
    (hdr[0] & 0x80 != 0, hdr[0] & 0x0f, payload)
}

async fn write_frame(stream: &mut TcpStream, fin: bool, opcode: u8, payload: &[u8]) {
    let mut out = vec![(if fin { 0x80 } else { 0 }) | opcode];
    if payload.len() < 126 {
        out.push(payload.len() as u8);
    } else {
        out.push(126);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    }
    out.extend_from_slice(payload);
    stream.write_all(&out).await.unwrap();
}

struct Seen {
    request_line: String,
    texts: Vec<String>,
    pong: Option<Vec<u8>>,
    close_code: Option<u16>,
}

async fn serve_one(listener: TcpListener) -> Seen {
    let (mut stream, _) = listener.accept().await.unwrap();
    let head = read_head(&mut stream).await;
    let key = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("sec-websocket-key").then(|| value.trim().to_string())
        })
        .unwrap();
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID.as_bytes());
    let accept = STANDARD.encode(hasher.finalize());
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept
    );
    stream.write_all(response.as_bytes()).await.unwrap();

    let mut seen = Seen {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        texts: Vec::new(),
        pong: None,
        close_code: None,
    };

    let (_, opcode, req) = read_frame(&mut stream).await;
    assert_eq!(opcode, 1);
    let req = String::from_utf8(req).unwrap();
    let sub = serde_json::from_str::<serde_json::Value>(&req).unwrap()[1]
        .as_str()
        .unwrap()
        .to_string();
    seen.texts.push(req);

    write_frame(&mut stream, true, 9, b"hello").await;
    let event = serde_json::json!({
        "id": "e1", "pubkey": "pk", "created_at": 1700000500, "kind": 30023,
        "tags": [["d", "abc"], ["title", "Hello"], ["published_at", "1700000000"]],
        "content": "long form body", "sig": ""
    });
    let message = format!(r#"["EVENT","{}",{}]"#, sub, event).into_bytes();
    let (first, second) = message.split_at(40);
    write_frame(&mut stream, false, 1, first).await;
    write_frame(&mut stream, true, 0, second).await;
    write_frame(&mut stream, true, 1, format!(r#"["EOSE","{}"]"#, sub).as_bytes()).await;

    loop {
        let (_, opcode, payload) = read_frame(&mut stream).await;
        match opcode {
            1 => seen.texts.push(String::from_utf8(payload).unwrap()),
            10 => seen.pong = Some(payload),
            8 => {
                if payload.len() >= 2 {
                    seen.close_code = Some(u16::from_be_bytes([payload[0], payload[1]]));
                }
                // The client may already be gone.
                let mut echo = vec![0x88, payload.len() as u8];
                echo.extend_from_slice(&payload);
                let _ = stream.write_all(&echo).await;
                break;
            }
            other => panic!("unexpected opcode {}", other),
        }
    }
    seen
}

#[tokio::test]
async fn session_over_loopback_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(serve_one(listener));

    let relay = format!("ws://127.0.0.1:{}/relay", port);
    let filter = Query::articles_by("pk").to_filter();
    let outcome = fetch_events(&WebSocketConnector, &relay, &filter, &FetchConfig::default())
        .await
        .unwrap();
    assert_eq!(outcome.end, SessionEnd::EndOfStoredEvents);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].id, "e1");

    let seen = server.await.unwrap();
    assert_eq!(seen.request_line, "GET /relay HTTP/1.1");
    assert_eq!(seen.pong.as_deref(), Some(&b"hello"[..]));
    assert_eq!(seen.texts.len(), 2);
    assert!(seen.texts[0].starts_with(r#"["REQ","ned-"#));
    let sub = serde_json::from_str::<serde_json::Value>(&seen.texts[0]).unwrap()[1].clone();
    assert_eq!(seen.texts[1], serde_json::json!(["CLOSE", sub]).to_string());
    assert_eq!(seen.close_code, Some(1000));
}
