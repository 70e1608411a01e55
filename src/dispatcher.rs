//! Per-node dispatcher: the state machine and dispatch loop of §4.4.
//!
//! ```text
//! IDLE → SUBSCRIBED → RECEIVED_CONFIG → RUNNING → REPORTING → IDLE
//!                                     ↘ STOP (terminal)
//! ```
//!
//! The subscription-acknowledgement message a raw pub/sub client normally has
//! to filter out is handled internally by `redis`'s async pub/sub stream, so
//! this implementation only ever sees real payloads on that stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use reqwest::Method;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::coordinator::{Coordinator, CoordinatorError, STOP_SIGNAL};
use crate::errors::LoadtestError;
use crate::generator::CallGenerator;
use crate::model::{Call, CallerConfig, Results};
use crate::rate_controller::wait_to_call;
use crate::stats;

const MAX_CONCURRENT_CALLS: usize = 100;

/// Outcome of one subscribe-wait-act cycle of `run_forever`.
pub enum CycleOutcome {
    Ran,
    Stopped,
}

/// Accumulates per-call outcomes behind one mutex so a completed call's
/// status and latency are always recorded together, never observed
/// half-updated by a concurrent reader building the final Results.
#[derive(Default)]
struct RunAccumulator {
    latencies: Vec<f64>,
    status_map: HashMap<i32, u64>,
}

impl RunAccumulator {
    fn record(&mut self, status_code: i32, latency_secs: f64) {
        self.latencies.push(latency_secs);
        *self.status_map.entry(status_code).or_insert(0) += 1;
    }

    fn realized_requests(&self) -> u64 {
        self.status_map.values().sum()
    }

    fn errors_count(&self) -> u64 {
        [500, 502, 503, -1]
            .iter()
            .map(|code| *self.status_map.get(code).unwrap_or(&0))
            .sum()
    }
}

pub struct Dispatcher {
    coordinator: Coordinator,
    http_client: reqwest::Client,
    generator: Mutex<Option<Box<dyn CallGenerator>>>,
}

impl Dispatcher {
    pub fn new(coordinator: Coordinator, http_client: reqwest::Client) -> Self {
        Dispatcher {
            coordinator,
            http_client,
            generator: Mutex::new(None),
        }
    }

    /// Installs a pluggable call generator (§4.2), used instead of the
    /// shared queue for every subsequent run on this node.
    pub fn with_generator(self, generator: Box<dyn CallGenerator>) -> Self {
        *self.generator.lock().unwrap() = Some(generator);
        self
    }

    /// Subscribes and services runs forever, until a `stop` signal arrives.
    /// Matches `wait_for_ditributed_calls_in_background`: a crash in one
    /// cycle is logged and the loop resubscribes rather than exiting.
    pub async fn run_forever(&self) {
        loop {
            match self.run_one_cycle().await {
                Ok(CycleOutcome::Stopped) => {
                    tracing::info!("received stop signal, exiting dispatch loop");
                    return;
                }
                Ok(CycleOutcome::Ran) => {}
                Err(error) => {
                    tracing::error!(error = %error, "dispatch cycle failed");
                }
            }
        }
    }

    /// SUBSCRIBED → RECEIVED_CONFIG → RUNNING → REPORTING, or → STOP.
    pub async fn run_one_cycle(&self) -> Result<CycleOutcome, LoadtestError> {
        let mut pubsub = self.coordinator.subscribe().await?;
        let message = {
            let mut stream = pubsub.on_message();
            stream.next().await
        };
        drop(pubsub);

        let Some(message) = message else {
            return Ok(CycleOutcome::Ran);
        };
        let payload: Vec<u8> = message.get_payload_bytes().to_vec();

        if payload == STOP_SIGNAL {
            return Ok(CycleOutcome::Stopped);
        }

        let config: CallerConfig = serde_json::from_slice(&payload).map_err(|error| {
            LoadtestError::Coordinator(CoordinatorError::Encode(error))
        })?;

        self.run_calls(config).await?;
        Ok(CycleOutcome::Ran)
    }

    /// The RUNNING state: dispatches calls at the configured rate for
    /// `config.duration` seconds, then writes this node's Results.
    pub async fn run_calls(&self, config: CallerConfig) -> Result<(), LoadtestError> {
        let running_id = Uuid::new_v4().to_string();
        tracing::info!(running_id, ?config, "starting calls");

        self.coordinator.join_running(&running_id).await?;
        crate::metrics::DISPATCHER_RUNNING_NODES.inc();

        let start_time = Instant::now();
        let accumulator = Arc::new(Mutex::new(RunAccumulator::default()));
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CALLS));
        let calls_count = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut tasks = JoinSet::new();
        let mut last_wait_time = 0.1_f64;

        'dispatch: while should_keep_running(start_time, config.duration) {
            let Some(group) = self.next_group().await? else {
                tokio::task::yield_now().await;
                continue;
            };

            for call in group {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore open");
                let client = self.http_client.clone();
                let accumulator = accumulator.clone();
                let calls_count_for_task = calls_count.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    issue_call(&client, &call, &accumulator).await;
                    calls_count_for_task.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                });

                let current_count = calls_count.load(std::sync::atomic::Ordering::Relaxed);
                last_wait_time = wait_to_call(
                    last_wait_time,
                    current_count,
                    config.rps_per_node,
                    config.rampup_time,
                    start_time,
                )
                .await;

                if !should_keep_running(start_time, config.duration) {
                    break 'dispatch;
                }
            }
        }

        while tasks.join_next().await.is_some() {}

        self.coordinator.clear_script().await?;

        let results = {
            let accumulator = accumulator.lock().unwrap();
            let realized_requests = accumulator.realized_requests();
            let latency = stats::summarize(&accumulator.latencies);
            Results {
                duration: Some(config.duration as f64),
                rampup_time: Some(config.rampup_time),
                requested_rps_per_node: Some(config.rps_per_node),
                realized_requests: Some(realized_requests as f64),
                realized_rps: Some(realized_requests as f64 / config.duration as f64),
                latency: Some(latency),
                error: None,
                nodes_quantity: None,
                errors_count: Some(accumulator.errors_count()),
            }
        };

        self.coordinator.store_result(&running_id, &results).await?;
        self.coordinator.leave_running(&running_id).await?;
        crate::metrics::DISPATCHER_RUNNING_NODES.dec();
        tracing::info!(running_id, ?results, "finished calls");

        Ok(())
    }

    async fn next_group(&self) -> Result<Option<crate::model::CallGroup>, CoordinatorError> {
        if let Some(generator) = self.generator.lock().unwrap().as_mut() {
            return Ok(generator.next_group());
        }
        match self.coordinator.pop_call_group().await? {
            Some(group) => {
                self.coordinator.push_call_group(&group).await?;
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }
}

fn should_keep_running(start_time: Instant, duration: u64) -> bool {
    start_time.elapsed().as_secs_f64() <= duration as f64
}

async fn issue_call(client: &reqwest::Client, call: &Call, accumulator: &Mutex<RunAccumulator>) {
    let start = Instant::now();
    let method = Method::from_bytes(call.method.as_bytes()).unwrap_or(Method::GET);
    let mut builder = client.request(method, &call.url);
    for (name, value) in &call.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = &call.body {
        builder = builder.json(body);
    }

    let outcome = builder.send().await;
    let latency = start.elapsed().as_secs_f64();

    let status_code: i32 = match &outcome {
        Ok(response) => response.status().as_u16() as i32,
        Err(error) => {
            tracing::debug!(url = %call.url, error = %error, "call failed");
            -1
        }
    };

    accumulator.lock().unwrap().record(status_code, latency);
    crate::metrics::record_call_outcome(status_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_counts_errors_by_known_codes() {
        let mut acc = RunAccumulator::default();
        acc.record(200, 0.01);
        acc.record(500, 0.02);
        acc.record(502, 0.01);
        acc.record(503, 0.01);
        acc.record(-1, 0.0);
        acc.record(404, 0.01);

        assert_eq!(acc.realized_requests(), 6);
        assert_eq!(acc.errors_count(), 4);
    }

    #[test]
    fn should_keep_running_respects_duration() {
        let start = Instant::now();
        assert!(should_keep_running(start, 60));
    }
}
