use std::sync::Arc;

use anyhow::Context;

use polywatch::config::{AppConfig, MonitorSettings};
use polywatch::db::JsonFileStore;
use polywatch::polymarket::{DataClient, GammaClient, HttpClient};
use polywatch::services::{run_poll_loop, Monitor, Notifier, ProfileResolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            init_tracing(false);
            tracing::error!(error = %format!("{e:#}"), "Configuration error");
            return Err(e);
        }
    };
    init_tracing(config.log_json);

    let settings = MonitorSettings::load(&config.settings_path)?;

    if let Some(addr) = config.metrics_addr {
        polywatch::metrics::init_metrics(addr)?;
    }

    let http = HttpClient::new().context("Failed to build HTTP client")?;
    let notifier = Arc::new(Notifier::new(
        http.clone(),
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
    ));

    let monitor = Monitor::new(
        Arc::new(ProfileResolver::new(GammaClient::new(http.clone()))),
        Arc::new(DataClient::new(http)),
        Arc::new(JsonFileStore::new(&config.state_path)),
        notifier.clone(),
    );

    tracing::info!(
        interval_secs = settings.polling_interval_seconds,
        users = settings.monitored_users.len(),
        state_path = %config.state_path.display(),
        "Polymarket position monitor starting"
    );

    notifier
        .send_startup_message(&settings.monitored_users, settings.polling_interval_seconds)
        .await;

    run_poll_loop(
        &monitor,
        Some(config.settings_path.as_path()),
        settings,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        },
    )
    .await;

    notifier.send_shutdown_message().await;
    tracing::info!("Shut down");
    Ok(())
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
