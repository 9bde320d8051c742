use chrono::Utc;
use serde::Deserialize;

use crate::error::WebError;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

pub const GOOGLE_SCOPES: &str = "openid profile email";

#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    #[serde(default)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// tokeninfo reports numeric claims as strings.
#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    aud: String,
    email: String,
    exp: String,
}

/// The provider's auth-code URL with the given state and any extra query
/// parameters (PKCE challenge for the native flow).
#[must_use]
pub fn auth_code_url(
    client_id: &str,
    redirect_uri: &str,
    state: &str,
    extra_params: &[(&str, &str)],
) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", GOOGLE_SCOPES)
        .append_pair("access_type", "offline")
        .append_pair("state", state);
    for (key, value) in extra_params {
        serializer.append_pair(key, value);
    }

    format!("{GOOGLE_AUTH_URL}?{}", serializer.finish())
}

/// Exchange an authorization code at the provider's token endpoint.
pub async fn exchange_code(
    http: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    code: &str,
    code_verifier: Option<&str>,
    redirect_uri: &str,
) -> Result<GoogleTokenResponse, WebError> {
    let mut params = vec![
        ("code", code),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];
    if let Some(verifier) = code_verifier {
        params.push(("code_verifier", verifier));
    }

    let response = http
        .post(GOOGLE_TOKEN_URL)
        .form(&params)
        .send()
        .await
        .map_err(|err| WebError::Internal(format!("token endpoint unreachable: {err}")))?;
    if !response.status().is_success() {
        info!("Provider rejected the authorization code: {}", response.status());
        return Err(WebError::Unauthorized(
            "failed to exchange code for tokens".into(),
        ));
    }

    response
        .json()
        .await
        .map_err(|err| WebError::Internal(format!("malformed token response: {err}")))
}

/// Fetch the authenticated identity behind an access token.
pub async fn fetch_userinfo(
    http: &reqwest::Client,
    access_token: &str,
) -> Result<GoogleUserInfo, WebError> {
    let response = http
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|err| WebError::Internal(format!("userinfo endpoint unreachable: {err}")))?;
    if !response.status().is_success() {
        return Err(WebError::Unauthorized("failed to fetch user info".into()));
    }

    response
        .json()
        .await
        .map_err(|err| WebError::Internal(format!("malformed userinfo response: {err}")))
}

/// Validate a Google-issued ID token against tokeninfo: signature and
/// issuance are the provider's problem, audience and expiry are ours.
pub async fn verify_id_token(
    http: &reqwest::Client,
    client_id: &str,
    id_token: &str,
) -> Result<String, WebError> {
    let response = http
        .get(GOOGLE_TOKENINFO_URL)
        .query(&[("id_token", id_token)])
        .send()
        .await
        .map_err(|err| WebError::Internal(format!("tokeninfo endpoint unreachable: {err}")))?;
    if !response.status().is_success() {
        return Err(WebError::Unauthorized("invalid id token".into()));
    }

    let info: GoogleTokenInfo = response
        .json()
        .await
        .map_err(|_| WebError::Unauthorized("invalid id token".into()))?;
    if info.aud != client_id {
        info!("ID token audience mismatch");
        return Err(WebError::Unauthorized("invalid id token".into()));
    }
    let expires: i64 = info
        .exp
        .parse()
        .map_err(|_| WebError::Unauthorized("invalid id token".into()))?;
    if expires < Utc::now().timestamp() {
        return Err(WebError::Unauthorized("id token expired".into()));
    }

    Ok(info.email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_code_url_encodes_parameters() {
        let url = auth_code_url(
            "client-123.apps.googleusercontent.com",
            "https://app.example.com/callback?next=/home",
            "state-token",
            &[("code_challenge", "abc"), ("code_challenge_method", "S256")],
        );

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=client-123.apps.googleusercontent.com"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback%3Fnext%3D%2Fhome"));
        assert!(url.contains("scope=openid+profile+email"));
        assert!(url.contains("state=state-token"));
        assert!(url.contains("code_challenge=abc"));
        assert!(url.contains("code_challenge_method=S256"));
    }
}
