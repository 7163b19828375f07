//! `submit_search` action: submit the search form using a parked session.

use serde::Deserialize;
use serde_json::{json, Value};

use cdc_verify::{SearchInput, VerificationFlow};

use crate::types::{ActionDefinition, ServerError, ServerResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitSearchParams {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    cdc_number: String,
    #[serde(default)]
    dob: String,
    #[serde(default)]
    captcha: String,
}

pub fn definition() -> ActionDefinition {
    ActionDefinition {
        name: "submit_search".to_string(),
        description: Some("Submit CDC number, date of birth and CAPTCHA answer".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string", "description": "Id returned by init_session" },
                "cdcNumber": { "type": "string" },
                "dob": { "type": "string", "description": "Date of birth as the site expects it" },
                "captcha": { "type": "string", "description": "CAPTCHA answer" }
            },
            "required": ["sessionId", "cdcNumber", "dob", "captcha"]
        }),
    }
}

pub async fn execute(args: Value, flow: &VerificationFlow) -> ServerResult<Value> {
    let params: SubmitSearchParams =
        serde_json::from_value(args).map_err(|e| ServerError::InvalidParams(e.to_string()))?;

    if params.session_id.trim().is_empty() {
        return Err(ServerError::InvalidParams("sessionId is required".to_string()));
    }

    let input = SearchInput {
        cdc_number: params.cdc_number,
        dob: params.dob,
        captcha: params.captcha,
    };
    let info = flow.submit_search(params.session_id.trim(), &input).await?;

    Ok(json!({
        "success": true,
        "cdcInfo": serde_json::to_value(&info)?,
    }))
}
