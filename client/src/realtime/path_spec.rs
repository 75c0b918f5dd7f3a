use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// `:param` segments of a path spec, with an optional trailing constraint
/// such as `:id([0-9a-f]{24})`.
static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:([A-Za-z0-9\-]+)(?:\(.*\))?$").expect("path-spec parameter pattern is valid")
});

/// Lower-camel-case a route segment: `service-agreement` -> `serviceAgreement`.
/// Parameter segments (`:id`) pass through untouched.
pub(crate) fn camelize(segment: &str) -> String {
    if segment.starts_with(':') {
        return segment.to_string();
    }
    let mut out = String::with_capacity(segment.len());
    let mut upper_next = false;
    for c in segment.chars() {
        if c == '-' || c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a slash-separated route into camelized, non-empty segments.
pub(crate) fn route_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(camelize)
        .collect()
}

/// Match the concrete path against its parameterized spec, recovering the
/// positional parameters (`tasks/abc123` against `tasks/:id` yields
/// `id = abc123`).
pub(crate) fn extract_params(path: &[String], spec: &[String]) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (index, segment) in path.iter().enumerate() {
        let Some(spec_segment) = spec.get(index) else {
            break;
        };
        if let Some(captures) = PARAM_RE.captures(spec_segment) {
            params.insert(captures[1].to_string(), segment.clone());
        }
    }
    params
}
