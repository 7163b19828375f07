//! `fetch_captcha` action: load a captcha and return the raw cookie/CSRF state.

use serde_json::{json, Value};

use cdc_verify::VerificationFlow;

use crate::types::{ActionDefinition, ServerResult};

pub fn definition() -> ActionDefinition {
    ActionDefinition {
        name: "fetch_captcha".to_string(),
        description: Some(
            "Load the search form and CAPTCHA; returns cookies and CSRF token for submit_verification"
                .to_string(),
        ),
        input_schema: json!({ "type": "object", "properties": {} }),
    }
}

pub async fn execute(_args: Value, flow: &VerificationFlow) -> ServerResult<Value> {
    let challenge = flow.fetch_captcha().await?;
    Ok(json!({
        "success": true,
        "captchaImage": challenge.captcha_image,
        "csrfToken": challenge.state.csrf_token,
        "csrfName": challenge.state.csrf_name,
        "sessionCookies": challenge.state.cookies.header_value(),
    }))
}
