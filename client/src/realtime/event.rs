use serde::Deserialize;
use serde_json::Value;

use crate::realtime::error::RealtimeError;

/// Event type carrying document-store activity on the realtime stream.
pub const DB_ACTIVITY: &str = "db-activity";

/// Envelope delivered by the realtime transport:
/// `{type, payload: {sequence, data}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RealtimeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl RealtimeMessage {
    pub fn from_value(value: Value) -> Result<Self, RealtimeError> {
        serde_json::from_value(value).map_err(|err| RealtimeError::MalformedEvent {
            message: err.to_string(),
        })
    }

    pub fn is_db_activity(&self) -> bool {
        self.kind == DB_ACTIVITY
    }

    pub fn into_activity(self) -> Result<ActivityEvent, RealtimeError> {
        serde_json::from_value(self.payload).map_err(|err| RealtimeError::MalformedEvent {
            message: err.to_string(),
        })
    }
}

/// One sequenced db-activity event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityEvent {
    pub sequence: u64,
    pub data: ActivityPayload,
}

/// The mutation the server performed, described by its REST surface: the
/// concrete request path, the parameterized spec it matched, the verb, the
/// originating user and the response body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityPayload {
    pub path: String,
    #[serde(rename = "pathSpec")]
    pub path_spec: String,
    pub verb: ActivityVerb,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityVerb {
    Post,
    Put,
    Delete,
}
