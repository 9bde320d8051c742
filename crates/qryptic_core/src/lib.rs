use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use qryptic_common::{
    auth::password::hash_password,
    config::server_config,
    db::models::{NewUser, Settings, UserRole},
    utils::random_alphanumeric,
};
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::appstate::AppState;

#[macro_use]
extern crate tracing;

pub mod appstate;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod provisioning;
pub mod sso;

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    debug!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await
}

async fn create_temp_admin_user(pool: &PgPool) -> anyhow::Result<()> {
    let email = format!("{}@qryptic.com", random_alphanumeric(10).to_lowercase());
    let password = format!(
        "{}@{}#{}",
        random_alphanumeric(5),
        random_alphanumeric(5),
        random_alphanumeric(5)
    );
    let password_hash = hash_password(&password)?;
    NewUser {
        name: "Temporary Admin".into(),
        email: email.clone(),
        is_password_set: true,
        password_hash,
        role: UserRole::Admin,
    }
    .save(pool)
    .await?;
    // Printed exactly once; rotate or delete this account after setup.
    info!("Temporary admin created; email: {email} password: {password}");

    Ok(())
}

/// One-time and every-start initialization: ensure the settings row
/// exists (with secrets), bootstrap the temporary admin, publish the
/// settings and SSO provider caches.
pub async fn initialize_controller(pool: &PgPool) -> anyhow::Result<()> {
    let mut settings = match Settings::get(pool).await? {
        Some(settings) => {
            debug!("Controller settings already present");
            settings
        }
        None => Settings::create_defaults(pool).await?,
    };

    if settings.user_auth_sso_jwt_secret_key.is_empty() {
        settings.user_auth_sso_jwt_secret_key = random_alphanumeric(32);
        settings.save(pool).await?;
    }
    if !settings.temp_user_created {
        create_temp_admin_user(pool).await?;
        settings.temp_user_created = true;
        settings.temp_user_active = true;
        settings.save(pool).await?;
    } else if settings.temp_user_active {
        warn!("Temporary admin account is still active");
    }

    Settings::set_current_settings(settings);
    sso::refresh_provider_cache(pool).await?;

    Ok(())
}

/// The full `/api/v1` route table. Admin routes are gated per-handler by
/// the `AdminRole` extractor, gateway pulls by `GatewayAuth`.
pub fn build_webapp(appstate: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .route("/api/v1/sso-config", get(handlers::settings::public_sso_config))
        // authentication
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route(
            "/api/v1/auth/{provider}/sso/initiate",
            get(handlers::auth::initiate_sso_auth),
        )
        .route(
            "/api/v1/auth/{provider}/sso/callback",
            get(handlers::auth::sso_callback),
        )
        .route(
            "/api/v1/auth/{provider}/sso/token",
            get(handlers::auth::verify_sso_token),
        )
        .route(
            "/api/v1/auth/{provider}/web/sso/initiate",
            get(handlers::auth::web_sso_initiate),
        )
        .route(
            "/api/v1/auth/{provider}/web/sso/callback",
            get(handlers::auth::web_sso_callback),
        )
        .route(
            "/api/v1/auth/{provider}/web/sso/token",
            get(handlers::auth::web_sso_token),
        )
        // gateway-facing
        .route(
            "/api/v1/gateway/get-gateway-config",
            get(handlers::gateway::pull_gateway_config),
        )
        // end-user
        .route(
            "/api/v1/gateway/list",
            get(handlers::gateway::list_accessible_gateways),
        )
        .route(
            "/api/v1/gateway/{id}/health",
            get(handlers::gateway::gateway_health),
        )
        .route(
            "/api/v1/gateway/{id}/client",
            get(handlers::client::issue_client_config),
        )
        .route("/api/v1/client/{id}", delete(handlers::client::revoke_own_client))
        // admin: access graph
        .route(
            "/api/v1/admin/access/gateway/{id}/{action}/users",
            put(handlers::access::update_gateway_users),
        )
        .route(
            "/api/v1/admin/access/gateway/{id}/{action}/groups",
            put(handlers::access::update_gateway_groups),
        )
        .route(
            "/api/v1/admin/access/user/{id}/gateways",
            get(handlers::access::list_user_gateways),
        )
        .route(
            "/api/v1/admin/access/group/{id}/gateways",
            get(handlers::access::list_group_gateways),
        )
        // admin: clients
        .route(
            "/api/v1/admin/client/expired",
            delete(handlers::client::reap_expired),
        )
        .route(
            "/api/v1/admin/client/{id}",
            delete(handlers::client::revoke_client_admin),
        )
        // admin: configuration
        .route("/api/v1/admin/config", get(handlers::settings::get_admin_config))
        .route(
            "/api/v1/admin/config/sso",
            post(handlers::settings::add_sso_config),
        )
        .route(
            "/api/v1/admin/config/sso/{id}",
            delete(handlers::settings::delete_sso_config),
        )
        .route(
            "/api/v1/admin/config/password-login",
            put(handlers::settings::update_password_login),
        )
        .route(
            "/api/v1/admin/config/sso-login",
            put(handlers::settings::update_sso_login),
        )
        // admin: gateways
        .route("/api/v1/admin/gateway", post(handlers::gateway::create_gateway))
        .route(
            "/api/v1/admin/gateway/list",
            get(handlers::gateway::list_gateways),
        )
        .route(
            "/api/v1/admin/gateway/{id}",
            get(handlers::gateway::get_gateway)
                .put(handlers::gateway::update_gateway)
                .delete(handlers::gateway::delete_gateway),
        )
        .route(
            "/api/v1/admin/gateway/{id}/reset",
            delete(handlers::gateway::reset_gateway),
        )
        .route(
            "/api/v1/admin/gateway/{id}/deployment-config",
            get(handlers::gateway::deployment_config),
        )
        // admin: groups
        .route("/api/v1/admin/group", post(handlers::group::create_group))
        .route("/api/v1/admin/group/list", get(handlers::group::list_groups))
        .route(
            "/api/v1/admin/group/{id}",
            get(handlers::group::get_group)
                .put(handlers::group::update_group)
                .delete(handlers::group::delete_group),
        )
        .route(
            "/api/v1/admin/group/{id}/{action}/users",
            put(handlers::group::update_group_users),
        )
        // admin: users
        .route("/api/v1/admin/user", post(handlers::user::register_user))
        .route("/api/v1/admin/user/list", get(handlers::user::list_users))
        .route(
            "/api/v1/admin/user/{id}",
            get(handlers::user::get_user)
                .put(handlers::user::update_user)
                .delete(handlers::user::delete_user),
        )
        .with_state(appstate)
}

pub async fn run_web_server(appstate: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], server_config().http_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Controller API listening on {addr}");
    axum::serve(listener, build_webapp(appstate)).await?;

    Ok(())
}
