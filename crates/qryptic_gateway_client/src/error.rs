use qryptic_common::auth::claims::TokenError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayClientError {
    /// Transport-level failure: DNS, connect, TLS or timeout.
    #[error("gateway unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    /// The gateway answered, but not with 200.
    #[error("gateway request failed with status {0}")]
    RequestFailed(StatusCode),
    #[error("gateway health check returned an empty body")]
    EmptyHealthResponse,
    #[error(transparent)]
    Token(#[from] TokenError),
}
