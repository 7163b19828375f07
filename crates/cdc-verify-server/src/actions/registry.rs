//! Action registration and dispatch.

use serde_json::Value;

use cdc_verify::VerificationFlow;

use crate::types::{ActionDefinition, ServerError, ServerResult};

use super::{fetch_captcha, init_session, scrape_details, submit_search, submit_verification};

pub struct ActionRegistry;

impl ActionRegistry {
    pub fn list_actions() -> Vec<ActionDefinition> {
        vec![
            init_session::definition(),
            fetch_captcha::definition(),
            submit_search::definition(),
            submit_verification::definition(),
            scrape_details::definition(),
        ]
    }

    pub async fn call(name: &str, args: Value, flow: &VerificationFlow) -> ServerResult<Value> {
        match name {
            "init_session" => init_session::execute(args, flow).await,
            "fetch_captcha" => fetch_captcha::execute(args, flow).await,
            "submit_search" => submit_search::execute(args, flow).await,
            "submit_verification" => submit_verification::execute(args, flow).await,
            "scrape_details" => scrape_details::execute(args, flow).await,
            _ => Err(ServerError::UnknownAction(
                name.to_string(),
                Self::list_actions()
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }
}
