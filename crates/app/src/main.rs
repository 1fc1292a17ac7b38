mod auth;
mod delivery;
mod error;
mod groups;
mod invitations;
mod params;
mod problem;
mod router;
mod service;
mod sessions;
mod telemetry;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;

use tracing::info;

use onboard_mailer::MailerClient;
use onboard_storage::Database;
use onboard_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    database.verify_schema().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    let mailer = match &config.mailer {
        Some(mailer) => Some(MailerClient::from_config(
            &mailer.base_url,
            mailer.api_key.clone(),
            reqwest::Client::new(),
        )?),
        None => {
            info!(stage = "delivery", "APP_MAILER_URL not set, invitation links will be logged");
            None
        }
    };
    delivery::DeliveryWorker::new(
        database.clone(),
        mailer,
        config.public_url.clone(),
        config.delivery_interval,
    )
    .spawn();

    let sessions = auth::SessionTokens::new(&config.session_secret, config.session_ttl);
    let state = router::AppState::new(metrics, database, sessions);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
