//! Results aggregator (§4.6): waits for every dispatcher node to finish, then
//! merges per-node Results into one aggregate Results.

use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::coordinator::Coordinator;
use crate::errors::LoadtestError;
use crate::model::{Latency, Results};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Waits for the run to finish, polling roughly once a second, then merges
/// every node's Results. Keeps waiting while the deadline hasn't passed or
/// the running-set is still non-empty. The results-map being empty is
/// checked only after the wait settles, never as a loop condition on its
/// own — otherwise a run nobody ever picks up would wait forever instead of
/// surfacing `ResultsTimeoutError`.
pub async fn get_results(
    coordinator: &Coordinator,
    duration: u64,
    timeout: u64,
) -> Result<Results, LoadtestError> {
    let start_wait = Instant::now();
    let deadline = Duration::from_secs(duration + timeout);

    loop {
        let running = coordinator.running_count().await?;
        let deadline_not_passed = start_wait.elapsed() < deadline;

        if deadline_not_passed || running > 0 {
            sleep(POLL_INTERVAL).await;
            continue;
        }
        break;
    }

    let running = coordinator.running_count().await?;
    let results_len = coordinator.results_len().await?;
    if running > 0 || results_len == 0 {
        return Err(LoadtestError::ResultsTimeout(duration + timeout));
    }

    let per_node = coordinator.all_results().await?;
    Ok(merge(&per_node, duration))
}

fn merge(per_node: &[Results], requested_duration: u64) -> Results {
    let mean_of = |extract: fn(&Results) -> Option<f64>| -> f64 {
        let values: Vec<f64> = per_node.iter().filter_map(extract).collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };

    let realized_requests: f64 = per_node
        .iter()
        .filter_map(|r| r.realized_requests)
        .sum();

    let latency = Latency {
        mean: mean_of(|r| r.latency.map(|l| l.mean)),
        median: mean_of(|r| r.latency.map(|l| l.median)),
        percentile99: mean_of(|r| r.latency.map(|l| l.percentile99)),
        percentile95: mean_of(|r| r.latency.map(|l| l.percentile95)),
    };

    Results {
        duration: Some(mean_of(|r| r.duration)),
        rampup_time: Some(mean_of(|r| r.rampup_time.map(|v| v as f64)).round() as u64),
        requested_rps_per_node: Some(mean_of(|r| r.requested_rps_per_node)),
        realized_requests: Some(realized_requests),
        realized_rps: Some(realized_requests / requested_duration as f64),
        latency: Some(latency),
        error: None,
        nodes_quantity: Some(per_node.len()),
        // The aggregate never recomputes this from per-node counts, matching
        // the reference merge phase; per-node error counts stay visible on
        // each node's own Results entry in `chunli:results`.
        errors_count: Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(
        duration: f64,
        realized_requests: f64,
        mean: f64,
        errors_count: u64,
    ) -> Results {
        Results {
            duration: Some(duration),
            rampup_time: Some(0),
            requested_rps_per_node: Some(10.0),
            realized_requests: Some(realized_requests),
            realized_rps: Some(realized_requests / duration),
            latency: Some(Latency {
                mean,
                median: mean,
                percentile95: mean,
                percentile99: mean,
            }),
            error: None,
            nodes_quantity: None,
            errors_count: Some(errors_count),
        }
    }

    #[test]
    fn merging_one_node_is_identity() {
        let nodes = vec![node(3.0, 30.0, 0.05, 2)];
        let aggregate = merge(&nodes, 3);
        assert_eq!(aggregate.nodes_quantity, Some(1));
        assert_eq!(aggregate.realized_requests, Some(30.0));
        assert_eq!(aggregate.duration, Some(3.0));
        assert!((aggregate.latency.unwrap().mean - 0.05).abs() < 1e-9);
    }

    #[test]
    fn realized_requests_sum_across_nodes() {
        let nodes = vec![node(3.0, 30.0, 0.05, 1), node(3.0, 20.0, 0.07, 3)];
        let aggregate = merge(&nodes, 3);
        assert_eq!(aggregate.realized_requests, Some(50.0));
        assert!((aggregate.realized_rps.unwrap() - 50.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_errors_count_is_not_recomputed_from_nodes() {
        let nodes = vec![node(3.0, 30.0, 0.05, 1), node(3.0, 20.0, 0.07, 3)];
        let aggregate = merge(&nodes, 3);
        assert_eq!(aggregate.errors_count, Some(0));
    }

    #[test]
    fn latency_statistics_are_averaged_not_recomputed() {
        let nodes = vec![node(3.0, 10.0, 0.1, 0), node(3.0, 10.0, 0.3, 0)];
        let aggregate = merge(&nodes, 3);
        assert!((aggregate.latency.unwrap().mean - 0.2).abs() < 1e-9);
    }
}
