//! HogQL query building with bound placeholders.
//!
//! Event names, window bounds, platforms and predicate literals never appear
//! in the query text; they are passed in `values` and referenced as
//! `{name}`. Property names cannot be bound, so they are checked against a
//! strict character set instead.

use pulse_core::predicate::PropertyCondition;
use pulse_core::{ComparisonOperator, FetchFailure, Platform, Predicate, RowQuery};
use serde::Serialize;
use serde_json::{Map, Value};

/// Columns selected ahead of the projected properties, in row order.
pub const FIXED_COLUMNS: [&str; 5] = [
    "event",
    "properties.$os",
    "distinct_id",
    "timestamp",
    "properties.$session_id",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HogQlQuery {
    pub query: String,
    pub values: Map<String, Value>,
}

impl HogQlQuery {
    /// Body for `POST /api/projects/{id}/query/`.
    pub fn request_body(&self) -> Value {
        serde_json::json!({
            "query": {
                "kind": "HogQLQuery",
                "query": self.query,
                "values": self.values,
            }
        })
    }
}

/// `properties.<key>` for a key made of `[A-Za-z0-9_$]`.
pub fn property_expr(key: &str) -> Result<String, FetchFailure> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !valid {
        return Err(FetchFailure::InvalidQuery(format!(
            "unsupported property name '{key}'"
        )));
    }
    Ok(format!("properties.{key}"))
}

/// Build the row query for `query`, falling back to `default_limit` when the
/// request carries no limit of its own.
pub fn build_row_query(query: &RowQuery, default_limit: usize) -> Result<HogQlQuery, FetchFailure> {
    let mut binder = Binder::default();

    let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    for key in &query.projected_properties {
        columns.push(property_expr(key)?);
    }

    let mut conditions = vec![
        format!("event = {}", binder.bind_named("event", Value::from(query.event_name.clone()))),
        format!(
            "timestamp >= toDateTime({})",
            binder.bind_named("date_from", Value::from(query.window.from_text()))
        ),
        format!(
            "timestamp < toDateTime({})",
            binder.bind_named("date_to", Value::from(query.window.to_text()))
        ),
    ];

    let platforms: Vec<String> = Platform::RECOGNIZED
        .iter()
        .enumerate()
        .map(|(i, p)| binder.bind_named(&format!("os_{i}"), Value::from(p.as_str())))
        .collect();
    conditions.push(format!("properties.$os IN ({})", platforms.join(", ")));

    if let Some(predicate) = &query.predicate {
        conditions.push(compile_predicate(predicate, &mut binder)?);
    }

    let limit = query.limit.unwrap_or(default_limit);
    let text = format!(
        "SELECT {} FROM events WHERE {} ORDER BY timestamp DESC LIMIT {}",
        columns.join(", "),
        conditions.join(" AND "),
        limit
    );

    Ok(HogQlQuery {
        query: text,
        values: binder.values,
    })
}

#[derive(Default)]
struct Binder {
    values: Map<String, Value>,
    next: usize,
}

impl Binder {
    fn bind_named(&mut self, name: &str, value: Value) -> String {
        self.values.insert(name.to_string(), value);
        format!("{{{name}}}")
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!("p{}", self.next);
        self.next += 1;
        self.bind_named(&name, value)
    }
}

fn compile_predicate(predicate: &Predicate, binder: &mut Binder) -> Result<String, FetchFailure> {
    match predicate {
        Predicate::All(children) => compile_group(children, " AND ", "1 = 1", binder),
        Predicate::Any(children) => compile_group(children, " OR ", "1 = 0", binder),
        Predicate::Not(inner) => Ok(format!("NOT ({})", compile_predicate(inner, binder)?)),
        Predicate::Property(condition) => compile_condition(condition, binder),
    }
}

fn compile_group(
    children: &[Predicate],
    joiner: &str,
    empty: &str,
    binder: &mut Binder,
) -> Result<String, FetchFailure> {
    if children.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = children
        .iter()
        .map(|c| compile_predicate(c, binder))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", parts.join(joiner)))
}

fn compile_condition(
    condition: &PropertyCondition,
    binder: &mut Binder,
) -> Result<String, FetchFailure> {
    let column = property_expr(&condition.key)?;
    let text = format!("toString({column})");
    let text_or_blank = format!("coalesce(toString({column}), '')");

    let sql = match condition.operator {
        ComparisonOperator::Equals => {
            format!("{text} = {}", binder.bind(literal_text(&condition.value)))
        }
        ComparisonOperator::NotEquals => {
            format!("{text_or_blank} != {}", binder.bind(literal_text(&condition.value)))
        }
        ComparisonOperator::GreaterThan => numeric(&column, ">", condition, binder)?,
        ComparisonOperator::GreaterThanOrEqual => numeric(&column, ">=", condition, binder)?,
        ComparisonOperator::LessThan => numeric(&column, "<", condition, binder)?,
        ComparisonOperator::LessThanOrEqual => numeric(&column, "<=", condition, binder)?,
        ComparisonOperator::Contains => {
            format!("position({text}, {}) > 0", binder.bind(literal_text(&condition.value)))
        }
        ComparisonOperator::StartsWith => {
            format!("startsWith({text}, {})", binder.bind(literal_text(&condition.value)))
        }
        ComparisonOperator::EndsWith => {
            format!("endsWith({text}, {})", binder.bind(literal_text(&condition.value)))
        }
        ComparisonOperator::IsSet => format!("({column} IS NOT NULL AND {text} != '')"),
        ComparisonOperator::IsNotSet => format!("({column} IS NULL OR {text} = '')"),
        ComparisonOperator::InList | ComparisonOperator::NotInList => {
            let items = condition.value.as_array().ok_or_else(|| {
                FetchFailure::InvalidQuery(format!(
                    "'{}' needs a list value",
                    condition.key
                ))
            })?;
            let negated = condition.operator == ComparisonOperator::NotInList;
            if items.is_empty() {
                return Ok(if negated { "1 = 1" } else { "1 = 0" }.to_string());
            }
            let bound: Vec<String> = items.iter().map(|v| binder.bind(literal_text(v))).collect();
            if negated {
                format!("{text_or_blank} NOT IN ({})", bound.join(", "))
            } else {
                format!("{text} IN ({})", bound.join(", "))
            }
        }
    };
    Ok(sql)
}

fn numeric(
    column: &str,
    op: &str,
    condition: &PropertyCondition,
    binder: &mut Binder,
) -> Result<String, FetchFailure> {
    let number = match &condition.value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        FetchFailure::InvalidQuery(format!("'{}' needs a numeric value", condition.key))
    })?;
    Ok(format!(
        "toFloat({column}) {op} {}",
        binder.bind(Value::from(number))
    ))
}

/// Properties are compared as text, matching how they are stored.
fn literal_text(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.clone()),
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}
