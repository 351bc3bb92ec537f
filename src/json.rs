//! Bridges between template-engine JSON and expression values, and the
//! JSON ordering behind the `orderBy` helper.

use std::cmp::Ordering;

use serde_json::Value as Json;

use crate::value::Value;

// ── Conversion ──────────────────────────────────────────────────────

/// Convert a helper parameter into an expression value.
pub fn to_value(json: &Json) -> Result<Value, String> {
    match json {
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| "not a representable number".to_string()),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Null | Json::Array(_) | Json::Object(_) => Err("not a string or number".to_string()),
    }
}

/// Convert an expression value into JSON for a block context. Integral
/// numbers become JSON integers so templates print `3`, not `3.0`.
pub fn from_value(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => {
            const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
            if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                Json::from(*n as i64)
            } else {
                serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number)
            }
        }
    }
}

// ── Property paths ──────────────────────────────────────────────────

/// Follow a dotted path such as `stats.avg` or `items.0.name`.
pub fn lookup_path<'a>(json: &'a Json, path: &str) -> Option<&'a Json> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(json, |current, segment| match current {
        Json::Object(map) => map.get(segment),
        Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

// ── Ordering ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `desc` sorts descending; any other token, or none, ascending.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub direction: SortDirection,
}

fn type_rank(json: &Json) -> u8 {
    match json {
        Json::Number(_) => 0,
        Json::String(_) => 1,
        Json::Bool(_) => 2,
        Json::Array(_) => 3,
        Json::Object(_) => 4,
        Json::Null => 5,
    }
}

/// Ascending order of two sort values; missing and null values go last.
fn compare_ascending(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => (a, b),
    };
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Json::String(x), Json::String(y)) => x.cmp(y),
        (Json::Bool(x), Json::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// The elements of an array, or the values of an object, ordered by
/// `keys`. The sort is stable and never fails: a path that resolves to
/// nothing simply sorts last (first when descending). Anything other
/// than an array or object orders to an empty array.
pub fn order_by(collection: &Json, keys: &[SortKey]) -> Json {
    let mut items: Vec<&Json> = match collection {
        Json::Array(items) => items.iter().collect(),
        Json::Object(map) => map.values().collect(),
        _ => Vec::new(),
    };

    items.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ordering =
                    compare_ascending(lookup_path(a, &key.path), lookup_path(b, &key.path));
                match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    Json::Array(items.into_iter().cloned().collect())
}
