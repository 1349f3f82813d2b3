//! Typed argument values for configured operations.
//!
//! Actions persist their per-operation arguments as a serialized JSON object
//! (`data_json`). The engine never works on that blob directly: it is parsed
//! into [`ArgValues`] at the boundary, where undeclared keys can be detected
//! against the operation's steps.

use crate::error::{Result, TriageError};
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// ArgValue
// ---------------------------------------------------------------------------

/// A single user-entered argument value.
///
/// Strings map to `Text`, arrays of strings to `List`; anything else (numbers,
/// objects, mixed arrays, `null`) is kept verbatim as `Custom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Text(String),
    List(Vec<String>),
    Custom(serde_json::Value),
}

impl ArgValue {
    /// True when the value counts as an answer for readiness purposes.
    pub fn is_filled(&self) -> bool {
        match self {
            ArgValue::Text(s) => !s.trim().is_empty(),
            ArgValue::List(items) => items.iter().any(|i| !i.trim().is_empty()),
            ArgValue::Custom(v) => match v {
                serde_json::Value::Null => false,
                serde_json::Value::String(s) => !s.trim().is_empty(),
                serde_json::Value::Array(a) => !a.is_empty(),
                serde_json::Value::Object(o) => !o.is_empty(),
                _ => true,
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(s) => Some(s.as_str()),
            ArgValue::Custom(serde_json::Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The selected values, in order. A text value selects itself.
    pub fn selections(&self) -> Vec<&str> {
        match self {
            ArgValue::List(items) => items.iter().map(String::as_str).collect(),
            other => other.as_text().into_iter().collect(),
        }
    }

    /// True if any selected value is one of `allowed`.
    pub fn matches_any(&self, allowed: &[String]) -> bool {
        self.selections()
            .into_iter()
            .any(|s| allowed.iter().any(|a| a == s))
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Text(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Text(s)
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(items: Vec<String>) -> Self {
        ArgValue::List(items)
    }
}

// ---------------------------------------------------------------------------
// ArgValues
// ---------------------------------------------------------------------------

/// Argument key → value for one configured operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgValues(BTreeMap<String, ArgValue>);

impl ArgValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `data_json` string. Anything but a JSON object is malformed.
    pub fn parse(data_json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(data_json)
            .map_err(|e| TriageError::MalformedData(e.to_string()))?;
        if !value.is_object() {
            return Err(TriageError::MalformedData(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| TriageError::MalformedData(e.to_string()))
    }

    /// Parse a `data_json` string, treating malformed data as no values at all.
    pub fn parse_lenient(data_json: &str) -> Self {
        match Self::parse(data_json) {
            Ok(values) => values,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed operation data");
                Self::default()
            }
        }
    }

    pub fn to_data_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ArgValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<ArgValue> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    pub fn is_filled(&self, key: &str) -> bool {
        self.get(key).is_some_and(ArgValue::is_filled)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys present here that no step of `operation` declares.
    pub fn unknown_keys(&self, operation: &Operation) -> Vec<String> {
        let declared = operation.declared_keys();
        self.0
            .keys()
            .filter(|k| !declared.contains(k.as_str()))
            .cloned()
            .collect()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationStep, StepArg};

    #[test]
    fn parse_maps_json_shapes_to_variants() {
        let values =
            ArgValues::parse(r#"{"label":"x","tags":["a","b"],"count":3,"gone":null}"#).unwrap();
        assert_eq!(values.get("label"), Some(&ArgValue::Text("x".into())));
        assert_eq!(
            values.get("tags"),
            Some(&ArgValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(values.get("count"), Some(&ArgValue::Custom(3.into())));
        assert!(!values.is_filled("gone"));
    }

    #[test]
    fn parse_rejects_non_objects() {
        assert!(matches!(
            ArgValues::parse("[1,2]"),
            Err(TriageError::MalformedData(_))
        ));
        assert!(matches!(
            ArgValues::parse("{not json"),
            Err(TriageError::MalformedData(_))
        ));
    }

    #[test]
    fn lenient_parse_treats_garbage_as_empty() {
        assert!(ArgValues::parse_lenient("{oops").is_empty());
        assert!(ArgValues::parse_lenient("").is_empty());
    }

    #[test]
    fn blank_text_and_empty_list_are_not_filled() {
        let values = ArgValues::new()
            .with("a", "   ")
            .with("b", Vec::<String>::new())
            .with("c", "ok");
        assert!(!values.is_filled("a"));
        assert!(!values.is_filled("b"));
        assert!(values.is_filled("c"));
        assert!(!values.is_filled("missing"));
    }

    #[test]
    fn data_json_roundtrip_preserves_values() {
        let values = ArgValues::new()
            .with("label", "x")
            .with("tags", vec!["a".to_string()]);
        let json = values.to_data_json().unwrap();
        assert_eq!(ArgValues::parse(&json).unwrap(), values);
    }

    #[test]
    fn unknown_keys_reports_typos() {
        let op = Operation {
            steps: vec![OperationStep {
                args: vec![StepArg::new("label")],
                ..Default::default()
            }],
            ..Operation::new("add_label", "Add label")
        };
        let values = ArgValues::new().with("label", "x").with("lable", "y");
        assert_eq!(values.unknown_keys(&op), vec!["lable".to_string()]);
    }

    #[test]
    fn matches_any_checks_every_selection() {
        let allowed = vec!["set".to_string()];
        assert!(ArgValue::from("set").matches_any(&allowed));
        assert!(ArgValue::from(vec!["clear".to_string(), "set".to_string()]).matches_any(&allowed));
        assert!(!ArgValue::from("clear").matches_any(&allowed));
    }
}
