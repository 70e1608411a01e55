use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{Encoder, Gauge, IntCounterVec, Opts, TextEncoder};
use tracing::{error, info};

use crate::errors::ErrorCategory;

lazy_static::lazy_static! {
    pub static ref CALLS_ISSUED_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("calls_issued_total", "Total number of dispatched HTTP calls by status code")
                .namespace("chunli"),
            &["status_code"]
        ).unwrap();

    pub static ref CALL_ERRORS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("call_errors_total", "Total number of failed calls by category")
                .namespace("chunli"),
            &["category"]
        ).unwrap();

    pub static ref DISPATCHER_RUNNING_NODES: Gauge =
        Gauge::with_opts(
            Opts::new("dispatcher_running_nodes", "Number of runs currently executing on this process")
                .namespace("chunli")
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry. Safe to call
/// more than once per process; registration failures are logged, not fatal.
pub fn register_metrics() {
    for result in [
        prometheus::default_registry().register(Box::new(CALLS_ISSUED_TOTAL.clone())),
        prometheus::default_registry().register(Box::new(CALL_ERRORS_TOTAL.clone())),
        prometheus::default_registry().register(Box::new(DISPATCHER_RUNNING_NODES.clone())),
    ] {
        if let Err(error) = result {
            error!(error = %error, "failed to register metric");
        }
    }
}

/// Records one completed call's outcome for observability. `status_code` of
/// `-1` denotes a transport failure, matching the wire protocol's sentinel.
pub fn record_call_outcome(status_code: i32) {
    CALLS_ISSUED_TOTAL
        .with_label_values(&[&status_code.to_string()])
        .inc();

    if status_code < 0 {
        CALL_ERRORS_TOTAL
            .with_label_values(&[ErrorCategory::NetworkError.label()])
            .inc();
    } else if let Some(category) = ErrorCategory::from_status_code(status_code as u16) {
        CALL_ERRORS_TOTAL.with_label_values(&[category.label()]).inc();
    }
}

pub async fn metrics_handler(_req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();

    let response = Response::builder()
        .status(200)
        .header("Content-Type", encoder.format_type())
        .body(Body::from(buffer))
        .unwrap();

    Ok(response)
}

pub async fn start_metrics_server(port: u16) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, hyper::Error>(service_fn(metrics_handler))
    });

    let server = Server::bind(&addr).serve(make_svc);
    info!(port, %addr, "metrics server listening");

    if let Err(e) = server.await {
        error!(error = %e, "metrics server error");
    }
}
