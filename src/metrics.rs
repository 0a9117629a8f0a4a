//! Prometheus metrics for the knowledge graph engine.
//!
//! Exposes:
//! - `knowledge_graph_store_call_duration_seconds` (histogram by operation)
//! - `knowledge_graph_store_call_total` (counter by operation and status)
//! - `knowledge_graph_build_duration_seconds` (histogram by status)
//! - `knowledge_graph_nodes_created_total` (counter by node kind)
//! - `knowledge_graph_relationship_writes_total` (counter by kind and status)
//! - `knowledge_graph_command_*` for CLI commands
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static STORE_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 1ms up to ~30s.
    let buckets =
        prometheus::exponential_buckets(0.001, 2.0, 16).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "knowledge_graph_store_call_duration_seconds",
        "Graph store call duration in seconds",
        &["operation"],
        buckets
    )
    .expect("failed to register store call histogram")
});

static STORE_CALL_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "knowledge_graph_store_call_total",
        "Total graph store calls by status",
        &["operation", "status"]
    )
    .expect("failed to register store call counter")
});

static BUILD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 50ms up to ~3 minutes.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "knowledge_graph_build_duration_seconds",
        "Duration of build_graph_from_chunks calls in seconds",
        &["status"],
        buckets
    )
    .expect("failed to register build duration histogram")
});

static NODES_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "knowledge_graph_nodes_created_total",
        "Nodes upserted by the pipeline",
        &["kind"]
    )
    .expect("failed to register nodes counter")
});

static RELATIONSHIP_WRITES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "knowledge_graph_relationship_writes_total",
        "Relationship writes attempted by the pipeline",
        &["kind", "status"]
    )
    .expect("failed to register relationship counter")
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "knowledge_graph_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "knowledge_graph_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "knowledge_graph_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&STORE_CALL_DURATION);
    Lazy::force(&STORE_CALL_TOTAL);
    Lazy::force(&BUILD_DURATION);
    Lazy::force(&NODES_CREATED);
    Lazy::force(&RELATIONSHIP_WRITES);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
}

fn status_label(success: bool) -> &'static str {
    if success {
        "ok"
    } else {
        "error"
    }
}

/// Record one graph store call.
pub fn record_store_call(operation: &str, duration: Duration, success: bool) {
    STORE_CALL_DURATION
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
    STORE_CALL_TOTAL
        .with_label_values(&[operation, status_label(success)])
        .inc();
}

/// Record a completed pipeline run.
pub fn record_build(duration: Duration, success: bool) {
    BUILD_DURATION
        .with_label_values(&[status_label(success)])
        .observe(duration.as_secs_f64());
}

/// Count a node upsert (`document`, `chunk`, `entity`, `concept`).
pub fn record_node_created(kind: &str) {
    NODES_CREATED.with_label_values(&[kind]).inc();
}

/// Count a relationship write attempt (`relationship`, `mention`).
pub fn record_relationship_write(kind: &str, success: bool) {
    RELATIONSHIP_WRITES
        .with_label_values(&[kind, status_label(success)])
        .inc();
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, status_label(success)])
        .inc();
}

fn plain_response(status: StatusCode, body: Full<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            Full::from("encode error"),
        ));
    }

    let mut response = plain_response(StatusCode::OK, Full::from(buffer));
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, Full::new(Bytes::new()))),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn records_store_calls_by_status() {
        let op = "test_store_call_status";

        record_store_call(op, Duration::from_millis(3), true);
        record_store_call(op, Duration::from_millis(7), false);

        assert_eq!(STORE_CALL_TOTAL.with_label_values(&[op, "ok"]).get(), 1);
        assert_eq!(STORE_CALL_TOTAL.with_label_values(&[op, "error"]).get(), 1);
        assert_eq!(
            STORE_CALL_DURATION
                .with_label_values(&[op])
                .get_sample_count(),
            2
        );
    }

    #[test]
    fn records_nodes_and_relationship_writes() {
        let kind = "test_node_kind";
        record_node_created(kind);
        record_node_created(kind);
        assert_eq!(NODES_CREATED.with_label_values(&[kind]).get(), 2);

        let rel_kind = "test_rel_kind";
        record_relationship_write(rel_kind, false);
        assert_eq!(
            RELATIONSHIP_WRITES
                .with_label_values(&[rel_kind, "error"])
                .get(),
            1
        );
    }

    #[test]
    fn records_build_duration() {
        let before = BUILD_DURATION.with_label_values(&["ok"]).get_sample_count();
        record_build(Duration::from_millis(250), true);
        let after = BUILD_DURATION.with_label_values(&["ok"]).get_sample_count();
        assert!(after > before);
    }

    #[test]
    fn records_command_metrics() {
        let cmd = "test_command_metrics";

        record_command_start(cmd);
        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 1);

        record_command_result(cmd, Duration::from_millis(120), true);

        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 0);
        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "ok"]).get(), 1);
    }

    #[test]
    fn init_collectors_can_be_called_multiple_times() {
        init_collectors();
        init_collectors();
    }

    #[tokio::test]
    async fn metrics_response_contains_registered_metrics() {
        init_collectors();
        let op = "test_metrics_response_op";
        record_store_call(op, Duration::from_millis(10), true);

        let response = metrics_response().await.expect("metrics response");
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/"));

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect metrics body")
            .to_bytes();
        let text = String::from_utf8(body_bytes.to_vec()).expect("utf-8 metrics body");
        assert!(text.contains("knowledge_graph_store_call_total"));
        assert!(text.contains(op));
    }
}
