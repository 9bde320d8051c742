use std::sync::RwLock;

use chrono::{Duration, Utc};
use qryptic_common::{
    auth::{
        claims::{Claims, StateClaims},
        password::verify_password,
    },
    config::server_config,
    db::models::{AuthSession, NewAuthSession, Settings, SsoConfig, User},
    utils::base64url_no_pad,
};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WebError;

pub mod google;

/// Platform the web/browser SSO credentials are registered under.
pub const WEB_PLATFORM: &str = "Website";

/// Lifetime of one web SSO round trip.
const WEB_SESSION_TIMEOUT_MINUTES: i64 = 2;

static GOOGLE_PROVIDER: RwLock<Option<GoogleProvider>> = RwLock::new(None);

#[derive(Clone, Debug)]
pub struct GoogleProvider {
    pub client_id: String,
    pub client_secret: String,
}

/// Load the active web SSO credentials into the process-wide cache.
/// Called at startup and after every SSO config mutation.
pub async fn refresh_provider_cache(pool: &PgPool) -> Result<(), sqlx::Error> {
    let provider = SsoConfig::active_for_platform(pool, WEB_PLATFORM)
        .await?
        .map(|config| GoogleProvider {
            client_id: config.client_id,
            client_secret: config.client_secret,
        });
    if provider.is_some() {
        debug!("SSO provider credentials loaded");
    }
    *GOOGLE_PROVIDER
        .write()
        .expect("Failed to acquire lock on SSO provider cache.") = provider;

    Ok(())
}

fn google_provider() -> Result<GoogleProvider, WebError> {
    GOOGLE_PROVIDER
        .read()
        .expect("Failed to acquire lock on SSO provider cache.")
        .clone()
        .ok_or_else(|| WebError::Unauthorized("sso provider not configured".into()))
}

/// Only the `google` provider is supported, and only while SSO login is
/// switched on.
pub fn validate_provider(provider: &str) -> Result<(), WebError> {
    let settings = Settings::get_current_settings();
    if !settings.allow_sso_login {
        return Err(WebError::SsoLoginDisabled);
    }
    if provider != "google" {
        return Err(WebError::Unauthorized("sso provider not allowed".into()));
    }

    Ok(())
}

/// RFC 7636 S256: the challenge is the base64url-encoded SHA-256 of the
/// verifier.
#[must_use]
pub fn verify_code_verifier(code_verifier: &str, code_challenge: &str) -> bool {
    let digest = Sha256::digest(code_verifier.as_bytes());
    base64url_no_pad(&digest) == code_challenge
}

/// Mint a user auth token for a locally known identity.
fn mint_user_token(user: &User) -> Result<String, WebError> {
    let claims = Claims::user_auth(
        user.uuid,
        &user.role.to_string(),
        server_config().jwt_token_timeout(),
    );
    let settings = Settings::get_current_settings();
    Ok(claims.sign(&settings.user_auth_jwt_secret_key)?)
}

/// Bridge an externally authenticated email to a local user session.
pub async fn sso_login(pool: &PgPool, email: &str) -> Result<String, WebError> {
    let settings = Settings::get_current_settings();
    if !settings.allow_sso_login {
        return Err(WebError::SsoLoginDisabled);
    }
    let user = User::find_by_email(pool, email).await?.ok_or_else(|| {
        info!("SSO login for unknown email {email}");
        WebError::Unauthorized("email id not present".into())
    })?;

    info!("User {} logged in via SSO", user.email);
    mint_user_token(&user)
}

/// Email + password login.
pub async fn password_login(pool: &PgPool, email: &str, password: &str) -> Result<String, WebError> {
    let settings = Settings::get_current_settings();
    if !settings.allow_password_login {
        return Err(WebError::PasswordLoginDisabled);
    }
    let user = User::find_by_email(pool, email).await?.ok_or_else(|| {
        info!("Password login for unknown email {email}");
        WebError::Unauthorized("email id not present".into())
    })?;
    if !user.is_password_set {
        return Err(WebError::Unauthorized("password is not set".into()));
    }
    if verify_password(password, &user.password_hash).is_err() {
        info!("Failed password login for {email}");
        return Err(WebError::Unauthorized("invalid credentials".into()));
    }

    info!("User {} logged in with password", user.email);
    mint_user_token(&user)
}

/// Native PKCE flow, step 1: build the provider URL carrying a signed
/// state and the caller's code challenge. Native apps may bring their own
/// client id.
pub fn initiate_native_auth(
    client_id_override: Option<&str>,
    code_challenge: &str,
    redirect_uri: &str,
    code_challenge_method: &str,
) -> Result<String, WebError> {
    let client_id = match client_id_override {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => google_provider()?.client_id,
    };
    let settings = Settings::get_current_settings();
    let state_jwt = StateClaims::new(code_challenge.to_string(), redirect_uri.to_string())
        .sign(&settings.user_auth_sso_jwt_secret_key)?;

    Ok(google::auth_code_url(
        &client_id,
        redirect_uri,
        &state_jwt,
        &[
            ("code_challenge", code_challenge),
            ("code_challenge_method", code_challenge_method),
        ],
    ))
}

/// Native PKCE flow, step 2: state + verifier checks, code exchange,
/// identity bridge.
pub async fn native_auth_callback(
    pool: &PgPool,
    http: &reqwest::Client,
    code: &str,
    state_jwt: &str,
    code_verifier: &str,
) -> Result<String, WebError> {
    let settings = Settings::get_current_settings();
    let state = StateClaims::verify(state_jwt, &settings.user_auth_sso_jwt_secret_key)?;
    if !verify_code_verifier(code_verifier, &state.code_challenge) {
        info!("PKCE verifier mismatch in native SSO callback");
        return Err(WebError::Unauthorized("invalid code verifier".into()));
    }

    let provider = google_provider()?;
    let tokens = google::exchange_code(
        http,
        &provider.client_id,
        &provider.client_secret,
        code,
        Some(code_verifier),
        &state.redirect_url,
    )
    .await?;
    let userinfo = google::fetch_userinfo(http, &tokens.access_token).await?;

    sso_login(pool, &userinfo.email).await
}

/// ID-token shape: used by mobile apps that already hold a provider
/// token.
pub async fn id_token_login(
    pool: &PgPool,
    http: &reqwest::Client,
    id_token: &str,
) -> Result<String, WebError> {
    let provider = google_provider()?;
    let email = google::verify_id_token(http, &provider.client_id, id_token).await?;

    sso_login(pool, &email).await
}

/// Web polling flow, step 1: persist the pending session and build the
/// provider URL with a random state.
pub async fn web_login_initiate(pool: &PgPool, code_challenge: &str) -> Result<String, WebError> {
    let provider = google_provider()?;
    let oauth_state = Uuid::new_v4().to_string();
    let callback_url = server_config().sso_callback_url("google");

    NewAuthSession {
        provider: "google".into(),
        state: oauth_state.clone(),
        code_challenge: code_challenge.to_string(),
        expiry_time: (Utc::now() + Duration::minutes(WEB_SESSION_TIMEOUT_MINUTES)).naive_utc(),
    }
    .save(pool)
    .await?;

    Ok(google::auth_code_url(
        &provider.client_id,
        &callback_url,
        &oauth_state,
        &[],
    ))
}

/// Web polling flow, step 2 (browser redirect): exchange the code, attach
/// the provider identity to the still-open session.
pub async fn web_login_callback(
    pool: &PgPool,
    http: &reqwest::Client,
    oauth_state: &str,
    code: &str,
) -> Result<(), WebError> {
    let provider = google_provider()?;
    let callback_url = server_config().sso_callback_url("google");
    let tokens = google::exchange_code(
        http,
        &provider.client_id,
        &provider.client_secret,
        code,
        None,
        &callback_url,
    )
    .await?;

    let mut session = AuthSession::find_by_state(pool, oauth_state)
        .await?
        .ok_or_else(|| WebError::Unauthorized("unknown state".into()))?;
    let userinfo = google::fetch_userinfo(http, &tokens.access_token).await?;
    if session.is_expired() {
        info!("Web SSO callback for expired state {oauth_state}");
        return Err(WebError::Unauthorized("expired state".into()));
    }
    session.mark_authenticated(pool, &userinfo.email).await?;

    Ok(())
}

/// Outcome of one `/token` poll: either the browser round trip has not
/// landed yet, or the auth token is ready. Terminal failures are errors.
pub enum WebTokenPoll {
    Pending,
    Ready(String),
}

/// Web polling flow, step 3 (app poll).
pub async fn web_login_token(
    pool: &PgPool,
    code_verifier: &str,
    code_challenge: &str,
) -> Result<WebTokenPoll, WebError> {
    if !verify_code_verifier(code_verifier, code_challenge) {
        info!("PKCE verifier mismatch in web SSO poll");
        return Err(WebError::Unauthorized(
            "incorrect code_verifier and code_challenge pair".into(),
        ));
    }
    let session = AuthSession::latest_by_code_challenge(pool, code_challenge)
        .await?
        .ok_or_else(|| WebError::Unauthorized("unknown code challenge".into()))?;
    if session.is_expired() {
        return Err(WebError::Unauthorized("expired session".into()));
    }
    if !session.authenticated {
        return Ok(WebTokenPoll::Pending);
    }

    let token = sso_login(pool, &session.email).await?;
    Ok(WebTokenPoll::Ready(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_rfc7636_vector() {
        // Test vector from RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

        assert!(verify_code_verifier(verifier, challenge));
        assert!(!verify_code_verifier(verifier, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cN"));
        assert!(!verify_code_verifier("some-other-verifier", challenge));
        assert!(!verify_code_verifier(verifier, ""));
    }

    #[test]
    fn challenge_is_unpadded_base64url() {
        let digest = Sha256::digest(b"a verifier with length not divisible by three");
        let challenge = base64url_no_pad(&digest);
        assert!(!challenge.contains('='));
        assert!(!challenge.contains('+'));
        assert!(!challenge.contains('/'));
        assert_eq!(challenge.len(), 43);
    }
}
