//! Rule predicates: boolean conditions over event properties.

use crate::types::Properties;
use serde::{Deserialize, Serialize};

/// Expression tree selecting which occurrences of an event count.
///
/// In TOML a leaf reads
/// `{ property = { key = "error", operator = "is_set" } }` and groups nest as
/// `{ all = [ ... ] }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    Property(PropertyCondition),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyCondition {
    pub key: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    IsSet,
    IsNotSet,
    InList,
    NotInList,
}

impl Predicate {
    pub fn property(
        key: impl Into<String>,
        operator: ComparisonOperator,
        value: serde_json::Value,
    ) -> Self {
        Predicate::Property(PropertyCondition {
            key: key.into(),
            operator,
            value,
        })
    }

    /// Evaluate against a property map. An empty `All` holds, an empty `Any`
    /// does not.
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Predicate::All(children) => children.iter().all(|p| p.matches(properties)),
            Predicate::Any(children) => children.iter().any(|p| p.matches(properties)),
            Predicate::Not(inner) => !inner.matches(properties),
            Predicate::Property(condition) => {
                let actual = properties
                    .get(&condition.key)
                    .unwrap_or(&serde_json::Value::Null);
                compare_values(actual, condition.operator, &condition.value)
            }
        }
    }

    /// Every property key the predicate reads, in first-seen order.
    pub fn property_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Predicate::All(children) | Predicate::Any(children) => {
                children.iter().for_each(|c| c.collect_keys(keys))
            }
            Predicate::Not(inner) => inner.collect_keys(keys),
            Predicate::Property(condition) => {
                if !keys.contains(&condition.key.as_str()) {
                    keys.push(&condition.key);
                }
            }
        }
    }
}

pub fn compare_values(
    actual: &serde_json::Value,
    operator: ComparisonOperator,
    expected: &serde_json::Value,
) -> bool {
    use std::cmp::Ordering;

    match operator {
        ComparisonOperator::Equals => loosely_equal(actual, expected),
        ComparisonOperator::NotEquals => !loosely_equal(actual, expected),
        ComparisonOperator::GreaterThan => numeric_cmp(actual, expected) == Some(Ordering::Greater),
        ComparisonOperator::GreaterThanOrEqual => matches!(
            numeric_cmp(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ComparisonOperator::LessThan => numeric_cmp(actual, expected) == Some(Ordering::Less),
        ComparisonOperator::LessThanOrEqual => matches!(
            numeric_cmp(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        ComparisonOperator::Contains => {
            text_pair(actual, expected).is_some_and(|(a, e)| a.contains(e.as_str()))
        }
        ComparisonOperator::StartsWith => {
            text_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(e.as_str()))
        }
        ComparisonOperator::EndsWith => {
            text_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(e.as_str()))
        }
        ComparisonOperator::IsSet => !is_blank(actual),
        ComparisonOperator::IsNotSet => is_blank(actual),
        ComparisonOperator::InList => expected
            .as_array()
            .is_some_and(|list| list.iter().any(|v| loosely_equal(actual, v))),
        ComparisonOperator::NotInList => expected
            .as_array()
            .map_or(true, |list| !list.iter().any(|v| loosely_equal(actual, v))),
    }
}

/// Backend properties frequently arrive as strings, so `"500"` equals `500`.
fn loosely_equal(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(e)) => a == e,
        _ => false,
    }
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_pair(actual: &serde_json::Value, expected: &serde_json::Value) -> Option<(String, String)> {
    as_text(actual).zip(as_text(expected))
}

fn numeric_cmp(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    as_number(a)?.partial_cmp(&as_number(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_leaf_operators() {
        let p = props(json!({"status": "failed", "code": "503", "error": ""}));

        let check = |key: &str, operator: ComparisonOperator, value: serde_json::Value| {
            Predicate::property(key, operator, value).matches(&p)
        };

        assert!(check("status", ComparisonOperator::Equals, json!("failed")));
        assert!(check("code", ComparisonOperator::GreaterThanOrEqual, json!(500)));
        assert!(check("code", ComparisonOperator::Equals, json!(503)));
        assert!(check("status", ComparisonOperator::StartsWith, json!("fail")));
        assert!(check("error", ComparisonOperator::IsNotSet, json!(null)));
        assert!(check("missing", ComparisonOperator::IsNotSet, json!(null)));
        assert!(!check("status", ComparisonOperator::IsNotSet, json!(null)));
        assert!(check("status", ComparisonOperator::InList, json!(["failed", "timeout"])));
        assert!(check("missing", ComparisonOperator::NotInList, json!(["x"])));
    }

    #[test]
    fn test_groups_and_negation() {
        let p = props(json!({"status": "ok", "retries": 3}));
        let failed = Predicate::property("status", ComparisonOperator::Equals, json!("failed"));
        let retried = Predicate::property("retries", ComparisonOperator::GreaterThan, json!(1));

        assert!(!Predicate::All(vec![failed.clone(), retried.clone()]).matches(&p));
        assert!(Predicate::Any(vec![failed.clone(), retried]).matches(&p));
        assert!(Predicate::Not(Box::new(failed)).matches(&p));
        assert!(Predicate::All(vec![]).matches(&p));
        assert!(!Predicate::Any(vec![]).matches(&p));
    }

    #[test]
    fn test_deserialize_from_toml_shape() {
        let raw = json!({
            "all": [
                {"property": {"key": "error", "operator": "is_set"}},
                {"not": {"property": {"key": "status", "operator": "equals", "value": "success"}}}
            ]
        });
        let predicate: Predicate = serde_json::from_value(raw).unwrap();
        assert_eq!(predicate.property_keys(), vec!["error", "status"]);
        assert!(predicate.matches(&props(json!({"error": "boom", "status": "failed"}))));
    }
}
