use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{debug, warn};

use crate::config::Config;

pub mod models;

/// Primary key type shared by all tables. External identities are UUIDs;
/// `Id` stays internal to the store.
pub type Id = i64;

fn parse_ssl_mode(mode: &str) -> PgSslMode {
    match mode {
        "disable" => PgSslMode::Disable,
        "allow" => PgSslMode::Allow,
        "prefer" => PgSslMode::Prefer,
        "require" => PgSslMode::Require,
        "verify-ca" => PgSslMode::VerifyCa,
        "verify-full" => PgSslMode::VerifyFull,
        other => {
            warn!("Unknown DBSslMode {other:?}, falling back to \"prefer\"");
            PgSslMode::Prefer
        }
    }
}

/// Open the connection pool described by the server configuration.
pub async fn init_db_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    debug!(
        "Connecting to database {} at {}:{}",
        config.db_name, config.db_host, config.db_port
    );
    let options = PgConnectOptions::new()
        .host(&config.db_host)
        .port(config.db_port)
        .username(&config.db_user)
        .password(&config.db_password)
        .database(&config.db_name)
        .ssl_mode(parse_ssl_mode(&config.db_ssl_mode));

    PgPoolOptions::new().connect_with(options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssl_mode_parsing() {
        assert!(matches!(parse_ssl_mode("disable"), PgSslMode::Disable));
        assert!(matches!(parse_ssl_mode("verify-full"), PgSslMode::VerifyFull));
        assert!(matches!(parse_ssl_mode("bogus"), PgSslMode::Prefer));
    }
}
