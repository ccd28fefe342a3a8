#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Wire-level behaviour of a single worker, driven through its raw channels.

mod common;

use bytes::Bytes;
use common::{setup_may_runtime, test_routes};
use keiro::protocol::{RequestParts, ResponseParts, WireHeaders};
use keiro::worker::{Worker, WorkerOptions};
use std::sync::Arc;

fn spawn_worker(stream_window: usize) -> Worker {
    setup_may_runtime();
    let (routes, registry) = test_routes();
    let router = Arc::new(registry.resolve(&routes).unwrap());
    Worker::spawn(
        &router,
        WorkerOptions {
            stream_window,
            ..WorkerOptions::default()
        },
    )
    .unwrap()
}

fn head(method: &str, path: &str) -> RequestParts {
    RequestParts::Request {
        url: format!("http://worker.test{path}"),
        method: method.to_string(),
        headers: WireHeaders::new(),
    }
}

fn send_get(worker: &Worker, path: &str) {
    worker.send(head("GET", path)).unwrap();
    worker.send(RequestParts::Done).unwrap();
}

/// Receive data chunks (acknowledging each) up to and including the terminal one.
fn read_chunks(worker: &Worker) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    loop {
        match worker.recv().unwrap() {
            ResponseParts::Chunk { done: true, .. } => return chunks,
            ResponseParts::Chunk { done: false, data } => {
                chunks.push(data.unwrap_or_default());
                worker.ack().unwrap();
            }
            other => panic!("expected a chunk, got {other:?}"),
        }
    }
}

#[test]
fn test_text_response_is_a_single_message() {
    let worker = spawn_worker(16);
    send_get(&worker, "/hello/ada");

    match worker.recv().unwrap() {
        ResponseParts::Response {
            status,
            status_text,
            headers,
            body,
        } => {
            assert_eq!(status, 200);
            assert_eq!(status_text, "OK");
            assert!(headers["content-type"][0].starts_with("text/plain"));
            assert_eq!(body.as_deref(), Some("hello ada"));
        }
        other => panic!("expected response, got {other:?}"),
    }

    // Nothing else belongs to that exchange: the next message answers the next request
    send_get(&worker, "/hello/bob");
    match worker.recv().unwrap() {
        ResponseParts::Response { body, .. } => assert_eq!(body.as_deref(), Some("hello bob")),
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn test_streamed_response_chunks_arrive_in_order() {
    let worker = spawn_worker(16);
    send_get(&worker, "/stream/5");

    match worker.recv().unwrap() {
        ResponseParts::Response { status, body, .. } => {
            assert_eq!(status, 200);
            assert_eq!(body, None);
        }
        other => panic!("expected response head, got {other:?}"),
    }
    let chunks = read_chunks(&worker);
    let expected: Vec<Bytes> = (0..5).map(|n| Bytes::from(format!("chunk-{n};"))).collect();
    assert_eq!(chunks, expected);
}

#[test]
fn test_stream_longer_than_window_completes_with_acks() {
    let worker = spawn_worker(2);
    send_get(&worker, "/stream/40");

    assert!(matches!(
        worker.recv().unwrap(),
        ResponseParts::Response { body: None, .. }
    ));
    assert_eq!(read_chunks(&worker).len(), 40);
}

#[test]
fn test_request_body_is_reassembled_byte_exact() {
    let worker = spawn_worker(16);
    let parts: Vec<Bytes> = vec![
        Bytes::from_static(b"\x00\x01binary"),
        Bytes::new(),
        Bytes::from(vec![0xFF; 1000]),
        Bytes::from_static(b"tail"),
    ];
    let expected: Vec<u8> = parts.iter().flat_map(|b| b.iter().copied()).collect();

    worker.send(head("POST", "/echo")).unwrap();
    for data in parts {
        worker.send(RequestParts::Body { data }).unwrap();
    }
    worker.send(RequestParts::Done).unwrap();

    assert!(matches!(worker.recv().unwrap(), ResponseParts::Response { .. }));
    let echoed: Vec<u8> = read_chunks(&worker)
        .iter()
        .flat_map(|b| b.iter().copied())
        .collect();
    assert_eq!(echoed, expected);
}

#[test]
fn test_body_frames_on_get_are_ignored() {
    let worker = spawn_worker(16);
    worker.send(head("GET", "/length")).unwrap();
    worker
        .send(RequestParts::Body {
            data: Bytes::from_static(b"should not be seen"),
        })
        .unwrap();
    worker.send(RequestParts::Done).unwrap();

    match worker.recv().unwrap() {
        ResponseParts::Response { body, .. } => assert_eq!(body.as_deref(), Some("0")),
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn test_out_of_order_message_aborts_exchange() {
    let worker = spawn_worker(16);

    // A second `request` before `done` breaks the exchange
    worker.send(head("GET", "/hello/first")).unwrap();
    worker.send(head("GET", "/hello/second")).unwrap();
    match worker.recv().unwrap() {
        ResponseParts::Chunk { done: true, data } => assert!(data.is_none()),
        other => panic!("expected abort chunk, got {other:?}"),
    }

    // Stray `done` outside an exchange is dropped; the worker is back to idle
    worker.send(RequestParts::Done).unwrap();
    send_get(&worker, "/hello/again");
    match worker.recv().unwrap() {
        ResponseParts::Response { body, .. } => assert_eq!(body.as_deref(), Some("hello again")),
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn test_invalid_method_is_bad_request() {
    let worker = spawn_worker(16);
    worker.send(head("NOT A METHOD", "/hello/x")).unwrap();
    worker.send(RequestParts::Done).unwrap();

    match worker.recv().unwrap() {
        ResponseParts::Response { status, body, .. } => {
            assert_eq!(status, 400);
            assert!(body.unwrap().contains("invalid method"));
        }
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn test_unrouted_path_gets_empty_404() {
    let worker = spawn_worker(16);
    send_get(&worker, "/no/such/route");

    match worker.recv().unwrap() {
        ResponseParts::Response { status, body, .. } => {
            assert_eq!(status, 404);
            assert_eq!(body, None);
        }
        other => panic!("expected response, got {other:?}"),
    }
    assert!(read_chunks(&worker).is_empty());
}
