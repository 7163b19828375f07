//! `scrape_details` action: parse a details page URL the user pasted.

use serde::Deserialize;
use serde_json::{json, Value};

use cdc_verify::VerificationFlow;

use crate::types::{ActionDefinition, ServerError, ServerResult};

#[derive(Debug, Deserialize)]
struct ScrapeParams {
    #[serde(default)]
    url: String,
}

pub fn definition() -> ActionDefinition {
    ActionDefinition {
        name: "scrape_details".to_string(),
        description: Some("Fetch and parse a CDC details page by URL".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Details page URL on erp.gso.gov.bd" }
            },
            "required": ["url"]
        }),
    }
}

pub async fn execute(args: Value, flow: &VerificationFlow) -> ServerResult<Value> {
    let params: ScrapeParams =
        serde_json::from_value(args).map_err(|e| ServerError::InvalidParams(e.to_string()))?;

    let info = flow.scrape_details(&params.url).await?;

    Ok(json!({
        "success": true,
        "cdcInfo": serde_json::to_value(&info)?,
    }))
}
