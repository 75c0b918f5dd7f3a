use std::cmp::Ordering;

use serde_json::{json, Value};

use crate::collection::path;
use crate::query::predicate::parse_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortType {
    Numeric,
    String,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// How to order a result set: a field path, a comparison type and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub path: String,
    pub sort_type: SortType,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(path: &str, sort_type: SortType, order: SortOrder) -> Self {
        Self {
            path: path.to_string(),
            sort_type,
            order,
        }
    }

    /// Wire form for the SEARCH body: `{path: 1}` ascending, `{path: -1}`
    /// descending.
    pub fn to_wire(&self) -> Value {
        let direction = match self.order {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        };
        json!({ self.path.clone(): direction })
    }
}

/// Sort in place by the spec's field path. Multi-valued fields compare by
/// their first element; missing values sort first ascending.
pub fn sort_values(data: &mut [&Value], spec: &SortSpec) {
    data.sort_by(|a, b| {
        let ordering = compare(first_at(a, &spec.path), first_at(b, &spec.path), spec.sort_type);
        match spec.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn first_at<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    match path::get(value, field)? {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>, sort_type: SortType) -> Ordering {
    match sort_type {
        SortType::Numeric => {
            let x = a.and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
            let y = b.and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
            x.total_cmp(&y)
        }
        SortType::String => {
            let x = a.and_then(Value::as_str).unwrap_or("").to_lowercase();
            let y = b.and_then(Value::as_str).unwrap_or("").to_lowercase();
            x.cmp(&y)
        }
        SortType::Date => {
            let x = a.and_then(parse_date).map(|d| d.timestamp_millis()).unwrap_or(i64::MIN);
            let y = b.and_then(parse_date).map(|d| d.timestamp_millis()).unwrap_or(i64::MIN);
            x.cmp(&y)
        }
    }
}
