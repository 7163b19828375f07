use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of one action accepted by `POST /api/cdc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the action's arguments (besides `action`).
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}
