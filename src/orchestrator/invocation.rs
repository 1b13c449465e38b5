//! Tool invocation lifecycle

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    /// Announced by the provider, arguments still streaming
    Pending,
    /// Handed to the dispatcher
    Executing,
    /// Dispatcher returned, successfully or not
    Complete,
}

/// One model-requested tool call, tracked from announcement to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub status: InvocationStatus,
    pub input: Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: InvocationStatus::Pending,
            input: Value::Object(Default::default()),
        }
    }
}
