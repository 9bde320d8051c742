use std::sync::OnceLock;

use chrono::Duration;
use clap::{Parser, ValueEnum};

static SERVER_CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Environment {
    #[default]
    Production,
    Development,
    Local,
}

/// Controller configuration, read once at startup from the environment
/// (flags exist mostly for local runs).
#[derive(Clone, Debug, Parser)]
#[command(name = "qryptic-controller", version)]
pub struct Config {
    #[arg(long, env = "DBHost")]
    pub db_host: String,

    #[arg(long, env = "DBPort", default_value_t = 5432)]
    pub db_port: u16,

    #[arg(long, env = "DBUser")]
    pub db_user: String,

    #[arg(long, env = "DBPassword")]
    pub db_password: String,

    #[arg(long, env = "DBName")]
    pub db_name: String,

    #[arg(long, env = "DBSslMode", default_value = "prefer")]
    pub db_ssl_mode: String,

    /// Domain the gateways and SSO providers reach this controller on.
    #[arg(long, env = "ControllerDomain")]
    pub controller_domain: String,

    /// Domain of the web UI, if one is deployed in front of this API.
    #[arg(long, env = "WebDomain")]
    pub web_domain: Option<String>,

    #[arg(long, env = "Environment", value_enum, default_value = "production")]
    pub environment: Environment,

    /// User auth token lifetime in minutes. Environment-specific default
    /// when unset.
    #[arg(long, env = "JwtTokenTimeout")]
    pub jwt_token_timeout: Option<i64>,

    /// Client credential lifetime in minutes. Environment-specific default
    /// when unset.
    #[arg(long, env = "ClientExpiry")]
    pub client_expiry: Option<i64>,

    #[arg(long, env = "HttpPort", default_value_t = 8080)]
    pub http_port: u16,

    /// Image reference embedded into gateway deployment commands.
    #[arg(long, env = "GatewayImage", default_value = "ghcr.io/qryptic/gateway:latest")]
    pub gateway_image: String,

    /// Minutes between full peer-list re-pushes to the gateways.
    /// 0 disables the reconciliation sweep.
    #[arg(long, env = "ReconcileInterval", default_value_t = 5)]
    pub reconcile_interval: u64,
}

impl Config {
    /// Store the parsed configuration in the process-wide slot.
    pub fn init(self) -> &'static Config {
        SERVER_CONFIG.get_or_init(|| self)
    }

    pub fn jwt_token_timeout(&self) -> Duration {
        match (self.jwt_token_timeout, self.environment) {
            (Some(minutes), _) => Duration::minutes(minutes),
            (None, Environment::Local) => Duration::minutes(120),
            (None, _) => Duration::minutes(60),
        }
    }

    pub fn client_expiry(&self) -> Duration {
        match (self.client_expiry, self.environment) {
            (Some(minutes), _) => Duration::minutes(minutes),
            (None, Environment::Local) => Duration::minutes(10),
            (None, Environment::Development) => Duration::minutes(60),
            (None, Environment::Production) => Duration::minutes(240),
        }
    }

    /// Local deployments run behind plain http; everything else is https.
    pub fn http_scheme(&self) -> &'static str {
        if self.environment == Environment::Local {
            "http"
        } else {
            "https"
        }
    }

    /// Redirect URI registered with the SSO provider for the web flow.
    pub fn sso_callback_url(&self, provider: &str) -> String {
        format!(
            "{}://{}/api/v1/auth/{provider}/web/sso/callback",
            self.http_scheme(),
            self.controller_domain
        )
    }

    /// URL a gateway pulls its interface + peer configuration from.
    pub fn pull_config_url(&self) -> String {
        format!(
            "{}://{}/api/v1/gateway/get-gateway-config",
            self.http_scheme(),
            self.controller_domain
        )
    }
}

/// Runtime configuration accessor. Set once by `Config::init` during
/// startup, before anything else runs.
pub fn server_config() -> &'static Config {
    SERVER_CONFIG
        .get()
        .expect("server configuration accessed before initialization")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(environment: Environment) -> Config {
        Config {
            db_host: "localhost".into(),
            db_port: 5432,
            db_user: "qryptic".into(),
            db_password: "qryptic".into(),
            db_name: "qryptic".into(),
            db_ssl_mode: "prefer".into(),
            controller_domain: "controller.example.com".into(),
            web_domain: None,
            environment,
            jwt_token_timeout: None,
            client_expiry: None,
            http_port: 8080,
            gateway_image: "ghcr.io/qryptic/gateway:latest".into(),
            reconcile_interval: 5,
        }
    }

    #[test]
    fn environment_defaults() {
        let production = test_config(Environment::Production);
        assert_eq!(production.jwt_token_timeout(), Duration::minutes(60));
        assert_eq!(production.client_expiry(), Duration::minutes(240));
        assert_eq!(production.http_scheme(), "https");

        let local = test_config(Environment::Local);
        assert_eq!(local.jwt_token_timeout(), Duration::minutes(120));
        assert_eq!(local.client_expiry(), Duration::minutes(10));
        assert_eq!(
            local.sso_callback_url("google"),
            "http://controller.example.com/api/v1/auth/google/web/sso/callback"
        );

        let development = test_config(Environment::Development);
        assert_eq!(development.client_expiry(), Duration::minutes(60));
    }

    #[test]
    fn explicit_timeouts_win() {
        let mut config = test_config(Environment::Local);
        config.jwt_token_timeout = Some(15);
        config.client_expiry = Some(30);
        assert_eq!(config.jwt_token_timeout(), Duration::minutes(15));
        assert_eq!(config.client_expiry(), Duration::minutes(30));
    }

    #[test]
    fn pull_config_url_embeds_domain() {
        let config = test_config(Environment::Production);
        assert_eq!(
            config.pull_config_url(),
            "https://controller.example.com/api/v1/gateway/get-gateway-config"
        );
    }
}
