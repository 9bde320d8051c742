use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{GATEWAY_TOKEN_AUDIENCE, TOKEN_ISSUER};

/// State tokens protect the native SSO round trip and are short-lived by
/// construction.
const SSO_STATE_TOKEN_TIMEOUT_MINUTES: i64 = 5;

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
    #[error("token signing failed")]
    Signing,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

/// Standard claims carried by user and gateway auth tokens. Signed HS256;
/// the secret selects the purpose (user tokens use the controller-wide
/// secret, gateway tokens the per-gateway one).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn new(sub: Uuid, aud: String, timeout: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub,
            iss: TOKEN_ISSUER.into(),
            aud,
            iat: now.timestamp(),
            exp: (now + timeout).timestamp(),
        }
    }

    /// Claims for an end-user session; the audience carries the role.
    #[must_use]
    pub fn user_auth(user_uuid: Uuid, role: &str, timeout: Duration) -> Self {
        Self::new(user_uuid, role.into(), timeout)
    }

    /// Claims the controller presents to a gateway (and a gateway presents
    /// back when pulling its configuration).
    #[must_use]
    pub fn gateway_auth(gateway_uuid: Uuid, timeout: Duration) -> Self {
        Self::new(gateway_uuid, GATEWAY_TOKEN_AUDIENCE.into(), timeout)
    }

    pub fn sign(&self, secret: &str) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|_| TokenError::Signing)
    }

    /// Verify signature, algorithm, issuer and expiry; returns the claims.
    pub fn verify(token: &str, secret: &str) -> Result<Self, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_issuer(&[TOKEN_ISSUER]);
        let data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

/// Claims of the signed `state` parameter in the native PKCE flow.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateClaims {
    pub code_challenge: String,
    pub redirect_url: String,
    pub state: String,
    pub iat: i64,
    pub exp: i64,
}

impl StateClaims {
    /// Fresh state claims with a random CSRF state string.
    #[must_use]
    pub fn new(code_challenge: String, redirect_url: String) -> Self {
        let now = Utc::now();
        Self {
            code_challenge,
            redirect_url,
            state: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(SSO_STATE_TOKEN_TIMEOUT_MINUTES)).timestamp(),
        }
    }

    pub fn sign(&self, secret: &str) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|_| TokenError::Signing)
    }

    pub fn verify(token: &str, secret: &str) -> Result<Self, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        let data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use claims::assert_ok;

    use super::*;

    static SECRET: &str = "yUmsmfM0EHIkPca6U2MF8zJgO8P5fTFH";

    #[test]
    fn user_token_round_trip() {
        let user_uuid = Uuid::new_v4();
        let claims = Claims::user_auth(user_uuid, "Admin", Duration::minutes(60));
        let token = assert_ok!(claims.sign(SECRET));

        let verified = assert_ok!(Claims::verify(&token, SECRET));
        assert_eq!(verified.sub, user_uuid);
        assert_eq!(verified.aud, "Admin");
        assert_eq!(verified.iss, TOKEN_ISSUER);
        assert_eq!(verified, claims);
    }

    #[test]
    fn gateway_token_audience() {
        let gateway_uuid = Uuid::new_v4();
        let claims = Claims::gateway_auth(gateway_uuid, Duration::minutes(60));
        let token = assert_ok!(claims.sign(SECRET));

        let verified = assert_ok!(Claims::verify(&token, SECRET));
        assert_eq!(verified.sub, gateway_uuid);
        assert_eq!(verified.aud, GATEWAY_TOKEN_AUDIENCE);
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = Claims::user_auth(Uuid::new_v4(), "User", Duration::minutes(60))
            .sign(SECRET)
            .unwrap();
        assert_eq!(
            Claims::verify(&token, "completely-different-secret"),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        // Outside the default leeway window.
        let token = Claims::user_auth(Uuid::new_v4(), "User", Duration::minutes(-5))
            .sign(SECRET)
            .unwrap();
        assert_eq!(Claims::verify(&token, SECRET), Err(TokenError::Expired));
    }

    #[test]
    fn foreign_algorithm_is_rejected() {
        let claims = Claims::user_auth(Uuid::new_v4(), "User", Duration::minutes(60));
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(Claims::verify(&token, SECRET), Err(TokenError::Invalid));
    }

    #[test]
    fn state_claims_round_trip() {
        let claims = StateClaims::new(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into(),
            "app://callback".into(),
        );
        let token = assert_ok!(claims.sign(SECRET));

        let verified = assert_ok!(StateClaims::verify(&token, SECRET));
        assert_eq!(verified, claims);
        assert!(!verified.state.is_empty());
    }

    #[test]
    fn state_claims_are_csrf_unique() {
        let first = StateClaims::new("challenge".into(), "app://callback".into());
        let second = StateClaims::new("challenge".into(), "app://callback".into());
        assert_ne!(first.state, second.state);
    }
}
