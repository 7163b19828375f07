//! `submit_verification` action: submit the search form with caller-held state.

use serde::Deserialize;
use serde_json::{json, Value};

use cdc_verify::{CookieJar, FlowState, SearchInput, VerificationFlow, DEFAULT_CSRF_NAME};

use crate::types::{ActionDefinition, ServerError, ServerResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitVerificationParams {
    #[serde(default)]
    cdc_number: String,
    #[serde(default)]
    dob: String,
    #[serde(default)]
    captcha: String,
    #[serde(default)]
    csrf_token: String,
    #[serde(default)]
    csrf_name: Option<String>,
    #[serde(default)]
    session_cookies: String,
}

pub fn definition() -> ActionDefinition {
    ActionDefinition {
        name: "submit_verification".to_string(),
        description: Some(
            "Submit the search form using cookies and CSRF token from fetch_captcha".to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "cdcNumber": { "type": "string" },
                "dob": { "type": "string" },
                "captcha": { "type": "string" },
                "csrfToken": { "type": "string" },
                "csrfName": { "type": "string", "default": DEFAULT_CSRF_NAME },
                "sessionCookies": { "type": "string", "description": "Cookie header value, e.g. a=1; b=2" }
            },
            "required": ["cdcNumber", "dob", "captcha", "csrfToken", "sessionCookies"]
        }),
    }
}

pub async fn execute(args: Value, flow: &VerificationFlow) -> ServerResult<Value> {
    let params: SubmitVerificationParams =
        serde_json::from_value(args).map_err(|e| ServerError::InvalidParams(e.to_string()))?;

    let csrf_name = params
        .csrf_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_CSRF_NAME.to_string());
    let state = FlowState {
        cookies: CookieJar::parse(&params.session_cookies),
        csrf_token: params.csrf_token,
        csrf_name,
    };
    let input = SearchInput {
        cdc_number: params.cdc_number,
        dob: params.dob,
        captcha: params.captcha,
    };
    let info = flow.submit_verification(state, &input).await?;

    Ok(json!({
        "success": true,
        "cdcInfo": serde_json::to_value(&info)?,
    }))
}
