use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use http::header::HeaderValue;
use http::StatusCode;
use keiro::forwarder::Forwarder;
use keiro::pool::{DynamicWorkerPool, FixedWorkerPool};
use keiro::registry::{HandlerRegistry, RouteModule, WorkerRouterData};
use keiro::router::{RoutePattern, RouteTable};
use keiro::web::{Request, Response};
use std::hint::black_box;
use std::sync::Arc;

const ROUTE_IDS: &[&str] = &[
    "/",
    "/zoo/animals",
    "/zoo/animals/[id]",
    "/zoo/animals/[id]/toys/[toy_id]",
    "/zoo/[category]/animals/[id]/habitats/[habitat_id]/sections/[section_id]",
    "/inventory/[warehouse]/feeds/[feed]/items/[item]/batches/[batch]",
    "/docs/[[...path]]",
    "/zoo/health",
];

const STREAM_BYTES: usize = 256 * 1024;

fn demo_routes() -> (WorkerRouterData, HandlerRegistry) {
    let mut registry = HandlerRegistry::new();
    registry
        .register_route(
            "routes/ping",
            RouteModule::new().get(|_| Ok(Response::text(StatusCode::OK, "pong"))),
        )
        .register_route(
            "routes/blob",
            RouteModule::new().get(|_| {
                let chunks = (0..STREAM_BYTES / 4096).map(|_| Ok(Bytes::from_static(&[7u8; 4096])));
                Ok(Response::stream(
                    StatusCode::OK,
                    HeaderValue::from_static("application/octet-stream"),
                    chunks,
                ))
            }),
        );
    let routes = WorkerRouterData::new()
        .route("/ping", "routes/ping")
        .route("/blob", "routes/blob");
    (routes, registry)
}

fn bench_route_match(c: &mut Criterion) {
    let mut table = RouteTable::new();
    for id in ROUTE_IDS {
        table.insert(&RoutePattern::parse(id).expect("valid route id"), *id);
    }
    let paths = [
        "/zoo/animals/123",
        "/zoo/animals/123/toys/456",
        "/zoo/cats/animals/123/habitats/88/sections/5",
        "/inventory/1/feeds/2/items/3/batches/4",
        "/docs/guide/intro/setup",
        "/does/not/exist",
    ];
    c.bench_function("route_match", |b| {
        b.iter(|| {
            for path in paths.iter() {
                black_box(table.lookup(black_box(path)));
            }
        })
    });
}

fn bench_forward(c: &mut Criterion) {
    may::config().set_stack_size(0x10000);
    let (routes, registry) = demo_routes();

    let fixed = Forwarder::new(Arc::new(
        FixedWorkerPool::new(4, &routes, &registry).expect("fixed pool"),
    ));
    let dynamic = Forwarder::new(Arc::new(
        DynamicWorkerPool::new(4, &routes, &registry).expect("dynamic pool"),
    ));

    let mut group = c.benchmark_group("forward_text");
    group.bench_function("fixed", |b| {
        b.iter(|| {
            let response = fixed.forward(Request::get("http://bench/ping")).expect("forward");
            black_box(response.into_body().collect().expect("body"))
        })
    });
    group.bench_function("dynamic", |b| {
        b.iter(|| {
            let response = dynamic.forward(Request::get("http://bench/ping")).expect("forward");
            black_box(response.into_body().collect().expect("body"))
        })
    });
    group.finish();

    let mut group = c.benchmark_group("forward_stream");
    group.throughput(Throughput::Bytes(STREAM_BYTES as u64));
    group.bench_function("fixed", |b| {
        b.iter(|| {
            let response = fixed.forward(Request::get("http://bench/blob")).expect("forward");
            black_box(response.into_body().collect().expect("body"))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_route_match, bench_forward);
criterion_main!(benches);
