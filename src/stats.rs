//! Exact latency statistics over a finite sample.
//!
//! Unlike the HdrHistogram-based tracking elsewhere in this codebase, the
//! distributed run protocol requires statistics that match a reference
//! `numpy`-style computation bit for bit on small per-node samples, so this
//! module computes mean/median/percentile directly over a sorted `Vec<f64>`
//! rather than through a histogram approximation.

use crate::model::Latency;

/// Computes mean/median/p95/p99 over a latency sample, in seconds.
///
/// An empty sample yields all-zero statistics rather than panicking or
/// returning `NaN`, since a node that issued zero calls in a run still has to
/// report a well-formed `Latency`.
pub fn summarize(samples: &[f64]) -> Latency {
    if samples.is_empty() {
        return Latency {
            mean: 0.0,
            median: 0.0,
            percentile99: 0.0,
            percentile95: 0.0,
        };
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Latency {
        mean: mean(&sorted),
        median: percentile_sorted(&sorted, 50.0),
        percentile99: percentile_sorted(&sorted, 99.0),
        percentile95: percentile_sorted(&sorted, 95.0),
    }
}

fn mean(sorted: &[f64]) -> f64 {
    sorted.iter().sum::<f64>() / sorted.len() as f64
}

/// Linear-interpolation percentile, matching `numpy.percentile`'s default
/// (`linear`) interpolation method. `sorted` must already be sorted ascending.
fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        return sorted[lower];
    }

    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
