use std::str::FromStr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::WebError;

pub mod access;
pub mod auth;
pub mod client;
pub mod gateway;
pub mod group;
pub mod settings;
pub mod user;

/// GET /api/v1/health
pub(crate) async fn health_check() -> ApiResult {
    Ok(ApiResponse::ok(json!({ "success": true })))
}

/// Membership edits are parameterized by an `{action}` path segment;
/// anything but add/remove is rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MembershipAction {
    Add,
    Remove,
}

impl FromStr for MembershipAction {
    type Err = WebError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "add" => Ok(MembershipAction::Add),
            "remove" => Ok(MembershipAction::Remove),
            other => Err(WebError::InvalidAction(other.to_string())),
        }
    }
}

pub type ApiResult = Result<ApiResponse, WebError>;

/// JSON body + status, the uniform handler return shape.
pub struct ApiResponse {
    json: Value,
    status: StatusCode,
}

impl ApiResponse {
    pub fn json<T: Serialize>(data: T, status: StatusCode) -> Self {
        Self {
            json: serde_json::to_value(data).unwrap_or(Value::Null),
            status,
        }
    }

    pub fn ok<T: Serialize>(data: T) -> Self {
        Self::json(data, StatusCode::OK)
    }
}

impl Default for ApiResponse {
    fn default() -> Self {
        Self {
            json: Value::Null,
            status: StatusCode::OK,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.json)).into_response()
    }
}

/// Multi-value `?include=` query parameters, e.g.
/// `?include=users&include=groups`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct IncludeParams {
    #[serde(default)]
    pub include: Vec<String>,
}

impl IncludeParams {
    #[must_use]
    pub fn has(&self, relation: &str) -> bool {
        self.include.iter().any(|value| value == relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_action_parsing() {
        assert_eq!("add".parse::<MembershipAction>().unwrap(), MembershipAction::Add);
        assert_eq!(
            "remove".parse::<MembershipAction>().unwrap(),
            MembershipAction::Remove
        );
        assert!(matches!(
            "promote".parse::<MembershipAction>(),
            Err(WebError::InvalidAction(action)) if action == "promote"
        ));
    }

    #[test]
    fn include_params_matching() {
        let include = IncludeParams {
            include: vec!["users".into(), "ipPool".into()],
        };
        assert!(include.has("users"));
        assert!(include.has("ipPool"));
        assert!(!include.has("clients"));
    }
}
