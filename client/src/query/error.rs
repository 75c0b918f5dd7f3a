use thiserror::Error;

/// Structural errors in a query document. Unknown operators are NOT errors;
/// they are logged and evaluate to an empty result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query must be a JSON object")]
    NotAnObject,

    #[error("`{op}` expects an array of sub-queries")]
    MalformedCombinator { op: &'static str },

    #[error("operator table for field `{field}` must be an object")]
    MalformedClause { field: String },

    #[error("operand for `{operator}` has the wrong shape")]
    MalformedOperand { operator: String },

    #[error("invalid regular expression `{pattern}`: {message}")]
    InvalidRegex { pattern: String, message: String },
}
