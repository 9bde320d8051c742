use std::time::Duration;

use clap::Parser;
use qryptic_common::{
    config::Config,
    db::{init_db_pool, models::AuthSession},
};
use qryptic_core::{appstate::AppState, initialize_controller, provisioning, run_migrations, run_web_server};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    if dotenv_loaded {
        info!("Loaded environment from .env");
    }

    let config = Config::parse().init();
    info!(
        "Starting qryptic controller v{} ({:?})",
        qryptic_common::VERSION,
        config.environment
    );

    let pool = init_db_pool(config).await?;
    run_migrations(&pool).await?;
    initialize_controller(&pool).await?;

    let appstate = AppState::new(pool.clone())?;

    // Periodic full peer-list re-push; keeps gateways that missed a delta
    // converged. Expired-session rows are swept opportunistically here too.
    if config.reconcile_interval > 0 {
        let reconcile_state = appstate.clone();
        let mut interval =
            tokio::time::interval(Duration::from_secs(config.reconcile_interval * 60));
        tokio::spawn(async move {
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(err) = provisioning::reconcile_gateways(&reconcile_state).await {
                    warn!("Gateway reconciliation sweep failed: {err}");
                }
                if let Err(err) = AuthSession::purge_expired(&reconcile_state.pool).await {
                    warn!("Auth session purge failed: {err}");
                }
            }
        });
    }

    if let Err(err) = run_web_server(appstate).await {
        error!("Controller API terminated: {err}");
        return Err(err);
    }

    Ok(())
}
