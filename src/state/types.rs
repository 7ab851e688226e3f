//! On-disk shape of the state file.
//!
//! ```json
//! { "course": { "1": { "lastUpdated": 1704153600 } } }
//! ```
//!
//! Keys this program does not know about, at the top level or inside a
//! course record, are carried through a load/flush cycle untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Per-course sync record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Remote last-updated time of the version last walked, in Unix seconds.
    #[serde(
        rename = "lastUpdated",
        default,
        deserialize_with = "epoch_seconds"
    )]
    pub last_updated: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CourseRecord {
    pub fn new(last_updated: i64) -> Self {
        Self {
            last_updated,
            extra: Map::new(),
        }
    }
}

/// Persistent mapping of course id to last-synced timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub course: BTreeMap<String, CourseRecord>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncState {
    pub fn last_synced(&self, course_id: &str) -> Option<i64> {
        self.course.get(course_id).map(|r| r.last_updated)
    }

    /// True if the course was never synced or `remote_timestamp` is
    /// strictly newer than the recorded one.
    pub fn is_stale(&self, course_id: &str, remote_timestamp: i64) -> bool {
        match self.last_synced(course_id) {
            None => true,
            Some(last) => remote_timestamp > last,
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.course.is_empty()
    }
}

/// Accept integer or floating-point seconds. Older state files were written
/// with fractional timestamps such as `1704153600.0`.
fn epoch_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(i64),
        Float(f64),
    }
    match Seconds::deserialize(deserializer)? {
        Seconds::Int(n) => Ok(n),
        Seconds::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Seconds::Float(f) => Err(serde::de::Error::custom(format!(
            "lastUpdated is not a finite number: {}",
            f
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_and_float_timestamps() {
        let state: SyncState = serde_json::from_value(json!({
            "course": {
                "1": {"lastUpdated": 1704153600},
                "2": {"lastUpdated": 1704153600.0},
                "3": {}
            }
        }))
        .unwrap();
        assert_eq!(state.last_synced("1"), Some(1_704_153_600));
        assert_eq!(state.last_synced("2"), Some(1_704_153_600));
        assert_eq!(state.last_synced("3"), Some(0));
        assert_eq!(state.last_synced("4"), None);
    }

    #[test]
    fn test_serializes_integer_seconds() {
        let mut state = SyncState::default();
        state
            .course
            .insert("1".to_string(), CourseRecord::new(1_704_153_600));
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"course": {"1": {"lastUpdated": 1704153600}}})
        );
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let raw = json!({
            "course": {"7": {"lastUpdated": 5, "note": "keep me"}},
            "version": 2
        });
        let state: SyncState = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&state).unwrap(), raw);
    }

    #[test]
    fn test_missing_course_map_is_empty() {
        let state: SyncState = serde_json::from_str("{}").unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(serde_json::from_str::<SyncState>(r#"{"course": []}"#).is_err());
        assert!(serde_json::from_str::<SyncState>(r#"{"course": {"1": {"lastUpdated": "x"}}}"#).is_err());
    }
}
