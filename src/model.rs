//! Wire data model shared between the control plane, the coordinator, and every
//! dispatcher node. These types are serialized as JSON on the shared store and
//! must stay structurally compatible across nodes (see the protocol notes in
//! `coordinator`).

use serde::{Deserialize, Serialize};

/// A single HTTP request description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Call {
    pub fn get(url: impl Into<String>) -> Self {
        Call {
            url: url.into(),
            method: default_method(),
            headers: std::collections::HashMap::new(),
            body: None,
        }
    }
}

/// An ordered group of calls pulled off the queue as a single unit of work.
pub type CallGroup = Vec<Call>;

/// The parameters of one distributed run, broadcast on `chunli:distributed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallerConfig {
    pub duration: u64,
    pub rps_per_node: f64,
    #[serde(default)]
    pub rampup_time: u64,
}

/// Summary latency statistics in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Latency {
    pub mean: f64,
    pub median: f64,
    pub percentile99: f64,
    pub percentile95: f64,
}

/// A wire-level error: a short kind tag plus positional arguments, mirroring
/// the `(type(error).__name__, error.args)` shape the protocol was built on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub name: String,
    pub args: Vec<String>,
}

impl WireError {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        WireError {
            name: name.into(),
            args,
        }
    }
}

/// Results of a run. Every aggregate-only field is optional so a per-node
/// payload and an aggregate payload share one serialized shape, and any node
/// can decode any other node's result regardless of which variant produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Results {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rampup_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_rps_per_node: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_requests: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_rps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<Latency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_quantity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors_count: Option<u64>,
}

impl Results {
    /// Builds a Results envelope that carries only a top-level error, used by
    /// the control plane when a run cannot be completed.
    pub fn from_error(error: WireError) -> Self {
        Results {
            error: Some(error),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_defaults_method_to_get_when_absent() {
        let call: Call = serde_json::from_str(r#"{"url":"http://x/a"}"#).unwrap();
        assert_eq!(call.method, "GET");
        assert!(call.headers.is_empty());
        assert!(call.body.is_none());
    }

    #[test]
    fn call_round_trips_through_json() {
        let call = Call {
            url: "http://x/a".into(),
            method: "POST".into(),
            headers: [("Authorization".to_string(), "Bearer x".to_string())]
                .into_iter()
                .collect(),
            body: Some(serde_json::json!({"k": "v"})),
        };
        let encoded = serde_json::to_string(&call).unwrap();
        let decoded: Call = serde_json::from_str(&encoded).unwrap();
        assert_eq!(call, decoded);
    }

    #[test]
    fn results_omits_unset_aggregate_fields_on_encode() {
        let results = Results {
            duration: Some(3.0),
            ..Default::default()
        };
        let encoded = serde_json::to_string(&results).unwrap();
        assert!(!encoded.contains("nodes_quantity"));
        assert!(encoded.contains("\"duration\":3.0"));
    }

    #[test]
    fn results_from_error_carries_only_error() {
        let results = Results::from_error(WireError::new("ResultsTimeoutError", vec!["2".into()]));
        assert!(results.error.is_some());
        assert!(results.duration.is_none());
    }
}
