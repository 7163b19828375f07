//! `init_session` action: load a captcha and park the flow state server-side.

use serde_json::{json, Value};

use cdc_verify::VerificationFlow;

use crate::types::{ActionDefinition, ServerResult};

pub fn definition() -> ActionDefinition {
    ActionDefinition {
        name: "init_session".to_string(),
        description: Some(
            "Load the search form and CAPTCHA; returns a session id for submit_search".to_string(),
        ),
        input_schema: json!({ "type": "object", "properties": {} }),
    }
}

pub async fn execute(_args: Value, flow: &VerificationFlow) -> ServerResult<Value> {
    let ticket = flow.init_session().await?;
    Ok(json!({
        "success": true,
        "sessionId": ticket.session_id,
        "captchaImage": ticket.captcha_image,
    }))
}
