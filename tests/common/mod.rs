#![allow(dead_code)]

use bytes::Bytes;
use http::header::HeaderValue;
use http::{Method, StatusCode};
use keiro::registry::{HandlerRegistry, RouteModule, WorkerRouterData};
use keiro::web::Response;
use std::sync::Once;

/// Ensures May coroutines are configured only once
static MAY_INIT: Once = Once::new();

pub fn setup_may_runtime() {
    MAY_INIT.call_once(|| {
        may::config().set_stack_size(0x10000);
    });
}

pub fn octet_stream() -> HeaderValue {
    HeaderValue::from_static("application/octet-stream")
}

/// Routes shared by the pool and forwarder tests.
///
/// - `GET /hello/[name]` text
/// - `POST /echo` echoes the body as bytes
/// - `GET|HEAD|POST /length` text with the received body length
/// - `GET /stream/[count]` `count` chunks of `chunk-N;`
/// - `GET /fail` handler error
/// - `GET /panic` handler panic
/// - `GET /broken-stream` two chunks, then a failing chunk
pub fn test_routes() -> (WorkerRouterData, HandlerRegistry) {
    let mut registry = HandlerRegistry::new();
    registry
        .register_route(
            "hello",
            RouteModule::new().get(|event| {
                let name = event.param("name").unwrap_or("nobody").to_string();
                Ok(Response::text(StatusCode::OK, format!("hello {name}")))
            }),
        )
        .register_route(
            "echo",
            RouteModule::new().post(|mut event| {
                let body = event.request.take_body().collect()?;
                Ok(Response::bytes(StatusCode::OK, octet_stream(), body))
            }),
        )
        .register_route(
            "length",
            RouteModule::new().fallback(|mut event| {
                let body = event.request.take_body().collect()?;
                Ok(Response::text(StatusCode::OK, body.len().to_string()))
            }),
        )
        .register_route(
            "stream",
            RouteModule::new().get(|event| {
                let count: usize = event.param("count").unwrap_or("0").parse()?;
                let chunks = (0..count).map(|n| Ok(Bytes::from(format!("chunk-{n};"))));
                Ok(Response::stream(StatusCode::OK, octet_stream(), chunks))
            }),
        )
        .register_route(
            "fail",
            RouteModule::new().get(|_| Err(anyhow::anyhow!("handler failed on purpose"))),
        )
        .register_route(
            "panic",
            RouteModule::new().get(|_| panic!("handler panicked on purpose")),
        )
        .register_route(
            "broken-stream",
            RouteModule::new().get(|_| {
                let chunks = vec![
                    Ok(Bytes::from_static(b"one;")),
                    Ok(Bytes::from_static(b"two;")),
                    Err(anyhow::anyhow!("disk went away")),
                    Ok(Bytes::from_static(b"never;")),
                ];
                Ok(Response::stream(
                    StatusCode::OK,
                    octet_stream(),
                    chunks.into_iter(),
                ))
            }),
        );

    let routes = WorkerRouterData::new()
        .route("/hello/[name]", "hello")
        .route("/echo", "echo")
        .route("/length", "length")
        .route("/stream/[count]", "stream")
        .route("/fail", "fail")
        .route("/panic", "panic")
        .route("/broken-stream", "broken-stream");
    (routes, registry)
}

/// Every method `test_routes` answers on `/length`.
pub const LENGTH_METHODS: [Method; 3] = [Method::GET, Method::HEAD, Method::POST];
