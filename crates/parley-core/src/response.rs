//! Response types: what the platform sees, and what a send returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::Activity;

/// The synchronous answer to an inbound activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl InvokeResponse {
    pub const fn new(status: u16) -> Self {
        Self { status, body: None }
    }

    /// `200` without a body.
    pub const fn ok() -> Self {
        Self::new(200)
    }

    /// `500` without a body.
    pub const fn internal_error() -> Self {
        Self::new(500)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl Default for InvokeResponse {
    fn default() -> Self {
        Self::ok()
    }
}

/// Identifier returned by the platform for a created or updated activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResponse {
    #[serde(default)]
    pub id: String,
}

impl ResourceResponse {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// An activity that left the process, paired with its platform id.
#[derive(Debug, Clone, PartialEq)]
pub struct SentActivity {
    pub id: String,
    pub activity: Activity,
}

impl SentActivity {
    pub fn new(id: impl Into<String>, mut activity: Activity) -> Self {
        let id = id.into();
        activity.id = Some(id.clone());
        Self { id, activity }
    }
}
