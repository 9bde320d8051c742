use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use qryptic_common::{auth::claims::TokenError, db::models::ip_pool::IpPoolError};
use qryptic_gateway_client::GatewayClientError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("access denied")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("no IP available, try clearing expired clients")]
    NoIpAvailable,
    #[error(transparent)]
    CidrTooSmall(#[from] IpPoolError),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("login using sso not allowed")]
    SsoLoginDisabled,
    #[error("login using email and password not allowed")]
    PasswordLoginDisabled,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Gateway(#[from] GatewayClientError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebError::BadRequest(_) | WebError::InvalidAction(_) | WebError::CidrTooSmall(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            WebError::Unauthorized(_)
            | WebError::SsoLoginDisabled
            | WebError::PasswordLoginDisabled => (StatusCode::UNAUTHORIZED, self.to_string()),
            // Verification failures never leak signing details.
            WebError::Token(ref err) => (StatusCode::UNAUTHORIZED, err.to_string()),
            WebError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            WebError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            WebError::Conflict(_) | WebError::NoIpAvailable => {
                (StatusCode::CONFLICT, self.to_string())
            }
            WebError::Gateway(ref err) => {
                error!("Gateway request failed: {err}");
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            WebError::Db(ref err) => {
                error!("Database error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
            WebError::Internal(ref msg) => {
                error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (WebError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                WebError::Unauthorized("nope".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (WebError::Token(TokenError::Expired), StatusCode::UNAUTHORIZED),
            (WebError::Forbidden, StatusCode::FORBIDDEN),
            (WebError::NotFound("gateway"), StatusCode::NOT_FOUND),
            (WebError::NoIpAvailable, StatusCode::CONFLICT),
            (
                WebError::InvalidAction("promote".into()),
                StatusCode::BAD_REQUEST,
            ),
            (WebError::SsoLoginDisabled, StatusCode::UNAUTHORIZED),
            (
                WebError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
