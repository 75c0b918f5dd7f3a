use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::error;
use regex::Regex;
use serde_json::Value;

use crate::collection::path;
use crate::query::error::QueryError;

/// Evaluate a structured query against a set of entity values, returning the
/// matching subset in input order.
///
/// A query maps field paths to `{operator: operand}` tables, or uses the
/// `$and`/`$or` combinators. Field values resolve as lists (scalars become
/// singletons) and an entity matches when ANY element satisfies the operator.
pub fn evaluate<'a>(query: &Value, data: Vec<&'a Value>) -> Result<Vec<&'a Value>, QueryError> {
    let Some(clauses) = query.as_object() else {
        return Err(QueryError::NotAnObject);
    };

    let mut out = data;
    for (field, command) in clauses {
        if field == "$and" {
            let Some(arms) = command.as_array() else {
                return Err(QueryError::MalformedCombinator { op: "$and" });
            };
            // Sequential narrowing: each arm filters the previous result.
            for arm in arms {
                out = evaluate(arm, out)?;
            }
            continue;
        }

        if field == "$or" {
            let Some(arms) = command.as_array() else {
                return Err(QueryError::MalformedCombinator { op: "$or" });
            };
            // Union in first-seen order, deduplicated by element identity.
            let mut combined: Vec<&Value> = Vec::new();
            for arm in arms {
                for matched in evaluate(arm, out.clone())? {
                    if !combined.iter().any(|kept| std::ptr::eq(*kept, matched)) {
                        combined.push(matched);
                    }
                }
            }
            out = combined;
            continue;
        }

        let Some(operators) = command.as_object() else {
            return Err(QueryError::MalformedClause {
                field: field.clone(),
            });
        };
        for (operator, operand) in operators {
            out = apply_operator(out, field, operator, operand)?;
        }
    }
    Ok(out)
}

fn apply_operator<'a>(
    data: Vec<&'a Value>,
    field: &str,
    operator: &str,
    operand: &Value,
) -> Result<Vec<&'a Value>, QueryError> {
    let kept = match operator {
        "$eq" => retain(data, |lhs| any_resolved(lhs, field, |v| v == operand)),
        "$not" => retain(data, |lhs| any_resolved(lhs, field, |v| v != operand)),
        "$gt" => ordered(data, field, operand, &[Ordering::Greater]),
        "$lt" => ordered(data, field, operand, &[Ordering::Less]),
        "$gte" => ordered(data, field, operand, &[Ordering::Greater, Ordering::Equal]),
        "$lte" => ordered(data, field, operand, &[Ordering::Less, Ordering::Equal]),
        "$rex" => regex_match(data, field, operand, false)?,
        "$rexi" => regex_match(data, field, operand, true)?,
        "$in" => membership(data, field, operand, operator, true)?,
        "$nin" => membership(data, field, operand, operator, false)?,
        "$exists" => {
            let expected = operand.as_bool().unwrap_or(false);
            retain(data, |lhs| {
                (path::get(lhs, field).is_some()) == expected
            })
        }
        "$inProp" => retain(data, |lhs| match lhs.get(field) {
            Some(Value::String(haystack)) => operand
                .as_str()
                .map(|needle| haystack.contains(needle))
                .unwrap_or(false),
            Some(Value::Array(items)) => items.contains(operand),
            _ => false,
        }),
        "$elMatch" => {
            let mut kept = Vec::new();
            for lhs in data {
                let elements = resolve(lhs, field).unwrap_or_default();
                if !evaluate(operand, elements)?.is_empty() {
                    kept.push(lhs);
                }
            }
            kept
        }
        "$gtDate" => date_compare(data, field, operand, &[Ordering::Greater]),
        "$ltDate" => date_compare(data, field, operand, &[Ordering::Less]),
        "$gteDate" => date_compare(data, field, operand, &[Ordering::Greater, Ordering::Equal]),
        "$lteDate" => date_compare(data, field, operand, &[Ordering::Less, Ordering::Equal]),
        unknown => {
            error!("invalid query operator: {unknown}");
            Vec::new()
        }
    };
    Ok(kept)
}

fn retain<'a>(data: Vec<&'a Value>, pred: impl Fn(&Value) -> bool) -> Vec<&'a Value> {
    data.into_iter().filter(|lhs| pred(lhs)).collect()
}

/// Resolve a field path to its list form: arrays yield their elements,
/// scalars a singleton. `None` means the path is absent entirely.
fn resolve<'a>(value: &'a Value, field: &str) -> Option<Vec<&'a Value>> {
    match path::get(value, field)? {
        Value::Array(items) => Some(items.iter().collect()),
        other => Some(vec![other]),
    }
}

fn any_resolved(lhs: &Value, field: &str, pred: impl Fn(&Value) -> bool) -> bool {
    resolve(lhs, field)
        .map(|values| values.into_iter().any(pred))
        .unwrap_or(false)
}

fn ordered<'a>(
    data: Vec<&'a Value>,
    field: &str,
    operand: &Value,
    accept: &[Ordering],
) -> Vec<&'a Value> {
    retain(data, |lhs| {
        any_resolved(lhs, field, |v| {
            compare_values(v, operand)
                .map(|ordering| accept.contains(&ordering))
                .unwrap_or(false)
        })
    })
}

/// Numeric when both sides read as numbers (numeric strings included),
/// lexical when both are strings; anything else does not compare.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (to_f64(a), to_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn regex_match<'a>(
    data: Vec<&'a Value>,
    field: &str,
    operand: &Value,
    case_insensitive: bool,
) -> Result<Vec<&'a Value>, QueryError> {
    let Some(pattern) = operand.as_str() else {
        return Err(QueryError::MalformedOperand {
            operator: if case_insensitive { "$rexi" } else { "$rex" }.to_string(),
        });
    };
    let source = if case_insensitive {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    let regex = Regex::new(&source).map_err(|err| QueryError::InvalidRegex {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })?;

    Ok(retain(data, |lhs| {
        any_resolved(lhs, field, |v| match v {
            Value::String(s) => regex.is_match(s),
            Value::Number(n) => regex.is_match(&n.to_string()),
            _ => false,
        })
    }))
}

/// `$in`/`$nin`: the operand array is tested against the field's direct
/// value (no path traversal, no list expansion).
fn membership<'a>(
    data: Vec<&'a Value>,
    field: &str,
    operand: &Value,
    operator: &str,
    want_present: bool,
) -> Result<Vec<&'a Value>, QueryError> {
    let Some(candidates) = operand.as_array() else {
        return Err(QueryError::MalformedOperand {
            operator: operator.to_string(),
        });
    };
    Ok(retain(data, |lhs| {
        let present = lhs
            .get(field)
            .map(|value| candidates.contains(value))
            .unwrap_or(false);
        present == want_present
    }))
}

/// Date comparisons tolerate null operands (always false) and skip null or
/// unparseable field values.
fn date_compare<'a>(
    data: Vec<&'a Value>,
    field: &str,
    operand: &Value,
    accept: &[Ordering],
) -> Vec<&'a Value> {
    let Some(rhs) = parse_date(operand) else {
        return Vec::new();
    };
    retain(data, |lhs| {
        any_resolved(lhs, field, |v| {
            if v.is_null() {
                return false;
            }
            parse_date(v)
                .map(|lhs_date| accept.contains(&lhs_date.cmp(&rhs)))
                .unwrap_or(false)
        })
    })
}

/// Permissive date parsing: RFC 3339/2822, common naive forms, bare dates,
/// and numeric millisecond timestamps.
pub(crate) fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            for format in ["%Y-%m-%d", "%d/%m/%Y"] {
                if let Ok(date) = NaiveDate::parse_from_str(s, format) {
                    return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
                }
            }
            None
        }
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        _ => None,
    }
}
