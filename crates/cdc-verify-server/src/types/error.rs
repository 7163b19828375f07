//! Error type and HTTP status mapping for the action server.

use serde_json::{json, Value};

use cdc_verify::VerifyError;

/// HTTP status codes the action endpoint answers with.
pub mod status_codes {
    /// Business outcomes (including failed verifications).
    pub const OK: u16 = 200;
    /// Malformed body, unknown action, missing or invalid fields.
    pub const BAD_REQUEST: u16 = 400;
    pub const INTERNAL_ERROR: u16 = 500;
    /// The records site failed or changed underneath us.
    pub const BAD_GATEWAY: u16 = 502;
}

/// All errors that can occur while handling an action.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unknown action: \"{0}\". Use one of: {1}")]
    UnknownAction(String, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// Machine-readable tag reported as `errorType`.
    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Verify(e) => e.error_type(),
            ServerError::InvalidParams(_)
            | ServerError::UnknownAction(..)
            | ServerError::Json(_) => "invalid_request",
            ServerError::Io(_) => "internal_error",
        }
    }

    pub fn status(&self) -> u16 {
        use status_codes::*;
        match self {
            ServerError::Verify(e) => match e {
                VerifyError::InvalidInput(_) => BAD_REQUEST,
                VerifyError::Transport(_)
                | VerifyError::UpstreamStatus { .. }
                | VerifyError::PageUnavailable { .. }
                | VerifyError::MarkupChanged(_) => BAD_GATEWAY,
                VerifyError::SessionExpired
                | VerifyError::CaptchaRejected(_)
                | VerifyError::NotFound
                | VerifyError::Unparseable(_) => OK,
            },
            ServerError::InvalidParams(_)
            | ServerError::UnknownAction(..)
            | ServerError::Json(_) => BAD_REQUEST,
            ServerError::Io(_) => INTERNAL_ERROR,
        }
    }

    /// Whether the caller can succeed by starting over or re-entering input.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServerError::Verify(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The `{ success: false, error, errorType, retryable }` envelope.
    pub fn to_body(&self) -> Value {
        json!({
            "success": false,
            "error": self.to_string(),
            "errorType": self.error_type(),
            "retryable": self.is_retryable(),
        })
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_outcomes_are_ok() {
        let err = ServerError::from(VerifyError::NotFound);
        assert_eq!(err.status(), 200);
        let body = err.to_body();
        assert_eq!(body["success"], false);
        assert_eq!(body["errorType"], "not_found");
        assert_eq!(
            body["error"],
            "No CDC records found for the given information."
        );

        assert_eq!(body["retryable"], false);

        let err = ServerError::from(VerifyError::CaptchaRejected("wrong code".into()));
        assert_eq!(err.status(), 200);
        assert_eq!(err.to_body()["error"], "wrong code");
        assert_eq!(err.to_body()["retryable"], true);
    }

    #[test]
    fn test_upstream_failures_are_bad_gateway() {
        let err = ServerError::from(VerifyError::UpstreamStatus {
            url: "https://erp.gso.gov.bd/cdc-search/".into(),
            status: 503,
        });
        assert_eq!(err.status(), 502);
        assert_eq!(err.error_type(), "transport_error");

        let err = ServerError::from(VerifyError::MarkupChanged("csrf".into()));
        assert_eq!(err.status(), 502);
    }

    #[test]
    fn test_request_errors_are_bad_request() {
        let err = ServerError::UnknownAction("nope".into(), "init_session".into());
        assert_eq!(err.status(), 400);
        assert_eq!(err.error_type(), "invalid_request");

        let err = ServerError::from(VerifyError::InvalidInput("url".into()));
        assert_eq!(err.status(), 400);
        assert_eq!(err.error_type(), "invalid_request");
    }
}
