use std::convert::Infallible;
use std::io::Read as _;
use std::sync::Arc;

use flate2::read::GzDecoder;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use rand::seq::SliceRandom;
use tracing_subscriber::EnvFilter;

use rust_loadtest::aggregator;
use rust_loadtest::catalog;
use rust_loadtest::client::build_client;
use rust_loadtest::config::AppConfig;
use rust_loadtest::coordinator::Coordinator;
use rust_loadtest::dispatcher::Dispatcher;
use rust_loadtest::errors::LoadtestError;
use rust_loadtest::metrics;
use rust_loadtest::model::{CallerConfig, Results, WireError};
use rust_loadtest::run_initiator;

// ref: https://liberproeliis.fandom.com/pt-br/wiki/Chun-Li
const CHUN_LI_ATTACKS: &[&str] = &[
    "Hyakuretsukyaku",
    "Senretsukyaku",
    "Oyokukyaku",
    "Houyoku Sen",
    "Hosenka",
];

struct AppState {
    coordinator: Coordinator,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if config.debug { "debug" } else { "info" })
        }))
        .init();

    metrics::register_metrics();

    let coordinator = Coordinator::connect(&config.redis_target).await?;
    let http_client = build_client(&config)?;

    for worker_id in 0..config.workers {
        let coordinator = coordinator.clone();
        let http_client = http_client.clone();
        tokio::spawn(async move {
            tracing::info!(worker_id, "dispatcher loop starting");
            let dispatcher = Dispatcher::new(coordinator, http_client);
            dispatcher.run_forever().await;
        });
    }

    tokio::spawn(metrics::start_metrics_server(9090));

    let state = Arc::new(AppState { coordinator });

    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone()))) }
    });

    tracing::info!(addr = %config.control_addr, "control server listening");
    Server::bind(&config.control_addr).serve(make_svc).await?;

    Ok(())
}

async fn handle(
    req: Request<Body>,
    state: Arc<AppState>,
) -> Result<Response<Body>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, "/run") => handle_run(req, &state).await,
        (&Method::GET, "/status") => handle_status(),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    };
    Ok(response)
}

fn handle_status() -> Response<Body> {
    let attack = CHUN_LI_ATTACKS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Hyakuretsukyaku");
    let body = serde_json::json!({ "chunli": attack }).to_string();
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

/// `POST /run?duration=<int>&rps_per_node=<int>[&rampup_time=<int>]`, body a
/// gzip-compressed text file of calls, one per line (§4.8).
async fn handle_run(req: Request<Body>, state: &AppState) -> Response<Body> {
    let query = req.uri().query().unwrap_or("").to_string();
    let params = parse_query(&query);

    let result = run_once(req, state, &params).await;

    let results = result.unwrap_or_else(|error| {
        tracing::error!(error = %error, "run failed");
        Results::from_error(WireError::from(&error))
    });

    let body = serde_json::to_string(&results).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn run_once(
    req: Request<Body>,
    state: &AppState,
    params: &std::collections::HashMap<String, String>,
) -> Result<Results, LoadtestError> {
    let duration: u64 = params
        .get("duration")
        .ok_or_else(|| LoadtestError::BadRequest("missing duration query parameter".into()))?
        .parse()
        .map_err(|_| LoadtestError::BadRequest("duration must be an integer".into()))?;
    let rps_per_node: f64 = params
        .get("rps_per_node")
        .ok_or_else(|| LoadtestError::BadRequest("missing rps_per_node query parameter".into()))?
        .parse()
        .map_err(|_| LoadtestError::BadRequest("rps_per_node must be a number".into()))?;
    let rampup_time: u64 = match params.get("rampup_time") {
        Some(value) => value
            .parse()
            .map_err(|_| LoadtestError::BadRequest("rampup_time must be an integer".into()))?,
        None => 0,
    };

    let compressed = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|error| LoadtestError::InvalidGzipBody(error.to_string()))?;
    let mut decoder = GzDecoder::new(compressed.as_ref());
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|error| LoadtestError::InvalidGzipBody(error.to_string()))?;

    let lines: Vec<&str> = text.lines().collect();
    catalog::set_calls(&state.coordinator, lines).await?;

    run_initiator::start_distributed_calls(
        &state.coordinator,
        CallerConfig {
            duration,
            rps_per_node,
            rampup_time,
        },
    )
    .await?;

    let results = aggregator::get_results(&state.coordinator, duration, 0).await?;
    Ok(results)
}

fn parse_query(query: &str) -> std::collections::HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_string_pairs() {
        let params = parse_query("duration=10&rps_per_node=20&rampup_time=5");
        assert_eq!(params.get("duration").unwrap(), "10");
        assert_eq!(params.get("rps_per_node").unwrap(), "20");
        assert_eq!(params.get("rampup_time").unwrap(), "5");
    }

    #[test]
    fn parses_query_string_without_rampup() {
        let params = parse_query("duration=10&rps_per_node=20");
        assert!(!params.contains_key("rampup_time"));
    }
}
