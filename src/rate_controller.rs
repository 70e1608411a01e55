//! Closed-loop rate controller for the dispatch loop.
//!
//! `wait_to_call` computes how long to sleep before submitting the next call
//! so that, over time, the observed call rate tracks the configured target.
//! The arithmetic is kept separate from the actual sleep so it can be
//! exercised without wall-clock delay.

use std::time::Duration;

/// Linear ramp-up law: the effective target RPS rises from 0 to `rps` over
/// `rampup_time` seconds, then holds at `rps`.
pub fn rps_for_rampup(elapsed_time: f64, rampup_time: u64, rps: f64) -> f64 {
    if rampup_time > 0 && elapsed_time < rampup_time as f64 {
        rps * elapsed_time / rampup_time as f64
    } else {
        rps
    }
}

/// One step of the controller's arithmetic, pure and side-effect free.
///
/// Returns the next wait time in seconds. The caller is responsible for
/// sleeping that long and feeding the result back in as `last_wait_time` on
/// the following call.
pub fn next_wait_time(
    last_wait_time: f64,
    current_calls_count: u64,
    rps: f64,
    rampup_time: u64,
    elapsed_time: f64,
) -> f64 {
    let target_rps = if rampup_time > 0 {
        rps_for_rampup(elapsed_time, rampup_time, rps)
    } else {
        rps
    };

    let current_rps = if elapsed_time > 1.0 {
        current_calls_count as f64 / elapsed_time
    } else {
        current_calls_count as f64
    };

    let mut wait_time = last_wait_time;
    if current_rps > target_rps {
        wait_time += last_wait_time * target_rps / current_rps;
    } else if current_rps < target_rps - 1.0 {
        wait_time -= last_wait_time * current_rps / target_rps;
    }

    wait_time.max(0.0)
}

/// Computes the next wait time and sleeps for it, returning the value to be
/// used as `last_wait_time` on the following call.
pub async fn wait_to_call(
    last_wait_time: f64,
    current_calls_count: u64,
    rps: f64,
    rampup_time: u64,
    start_time: std::time::Instant,
) -> f64 {
    let elapsed_time = start_time.elapsed().as_secs_f64();
    let wait_time = next_wait_time(
        last_wait_time,
        current_calls_count,
        rps,
        rampup_time,
        elapsed_time,
    );

    tracing::debug!(
        rps,
        current_calls_count,
        wait_time,
        elapsed_time,
        "rate controller step"
    );

    if wait_time > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(wait_time)).await;
    }

    wait_time
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rampup_scales_linearly_before_target() {
        assert_eq!(rps_for_rampup(1.0, 10, 100.0), 10.0);
        assert_eq!(rps_for_rampup(9.0, 10, 100.0), 90.0);
    }

    #[test]
    fn rampup_holds_target_at_and_after_horizon() {
        assert_eq!(rps_for_rampup(10.0, 10, 100.0), 100.0);
        assert_eq!(rps_for_rampup(20.0, 10, 100.0), 100.0);
    }

    #[test]
    fn no_rampup_returns_target_immediately() {
        assert_eq!(rps_for_rampup(0.5, 0, 100.0), 100.0);
    }

    #[test]
    fn running_too_fast_increases_wait_time() {
        // current_rps (200) > target (100): slow down.
        let wait = next_wait_time(0.1, 200, 100.0, 0, 2.0);
        assert!(wait > 0.1);
    }

    #[test]
    fn running_too_slow_decreases_wait_time() {
        // current_rps (10) < target (100) - 1: speed up.
        let wait = next_wait_time(0.1, 10, 100.0, 0, 2.0);
        assert!(wait < 0.1);
    }

    #[test]
    fn within_dead_band_leaves_wait_time_unchanged() {
        // current_rps == 99.5, within [target - 1, target]: no adjustment.
        let wait = next_wait_time(0.1, 199, 100.0, 0, 2.0);
        assert_eq!(wait, 0.1);
    }

    #[test]
    fn wait_time_never_goes_negative() {
        let wait = next_wait_time(0.01, 1000, 100.0, 0, 2.0);
        assert!(wait >= 0.0);
    }
}
