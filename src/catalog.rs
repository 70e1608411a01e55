//! Parses the uploaded call corpus into normalized CallGroups (§4.1).
//!
//! Line normalization is kept as a pure function, independent of the
//! coordinator, so it is directly unit-testable without a running store.

use tracing::warn;

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::model::{Call, CallGroup};

/// Normalizes one input line into a CallGroup, or `None` if the line is
/// blank or unrecognizable. A JSON object becomes a one-element group; a
/// JSON array is taken as-is; a bare `http...` URL becomes a single GET call.
/// Unrecognized non-empty lines are logged and skipped, never fail the batch.
pub fn parse_call_line(line: &str) -> Option<CallGroup> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Ok(group) = serde_json::from_str::<CallGroup>(line) {
        return Some(group);
    }
    if let Ok(call) = serde_json::from_str::<Call>(line) {
        return Some(vec![call]);
    }

    if line.starts_with("http") {
        return Some(vec![Call::get(line)]);
    }

    warn!(line, "invalid call line, skipping");
    None
}

/// Clears the existing queue and script, then parses and pushes every line.
pub async fn set_calls<I, S>(coordinator: &Coordinator, lines: I) -> Result<usize, CoordinatorError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    coordinator.clear_calls().await?;

    let mut accepted = 0;
    for line in lines {
        if let Some(group) = parse_call_line(line.as_ref()) {
            coordinator.push_call_group(&group).await?;
            accepted += 1;
        }
    }
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_url_becomes_single_get_call() {
        let group = parse_call_line("http://x/a").unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].url, "http://x/a");
        assert_eq!(group[0].method, "GET");
        assert!(group[0].headers.is_empty());
        assert!(group[0].body.is_none());
    }

    #[test]
    fn single_object_line_becomes_one_element_group() {
        let group = parse_call_line(r#"{"url":"http://x/a","method":"POST"}"#).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].method, "POST");
    }

    #[test]
    fn array_line_is_taken_as_a_group() {
        let group =
            parse_call_line(r#"[{"url":"http://x/a"},{"url":"http://x/b","method":"POST"}]"#)
                .unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].method, "GET");
        assert_eq!(group[1].method, "POST");
    }

    #[test]
    fn invalid_line_is_skipped() {
        assert!(parse_call_line("garbage").is_none());
    }

    #[test]
    fn blank_line_is_skipped() {
        assert!(parse_call_line("").is_none());
        assert!(parse_call_line("   ").is_none());
    }
}
