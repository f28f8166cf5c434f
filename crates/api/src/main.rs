//! LinkBio API server entry point

use std::sync::Arc;
use std::time::Duration;

use linkbio_api::{routes::create_router, AppState, Config};
use linkbio_billing::{Billing, BillingEmailService, TrialReminderService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,linkbio_api=debug,linkbio_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = linkbio_shared::create_pool(
        &config.database_url,
        config.database_max_connections,
    )
    .await?;
    linkbio_shared::run_migrations(&pool).await?;

    let billing = Billing::from_env(pool.clone())?;
    let state = AppState::new(pool, config.clone(), billing);

    spawn_background_tasks(&state);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "LinkBio API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodic tasks: trial ending reminders and rate limiter cleanup.
fn spawn_background_tasks(state: &AppState) {
    let reminder = TrialReminderService::new(
        Arc::new(linkbio_billing::PgSubscriptionStore::new(state.pool.clone())),
        BillingEmailService::from_env(),
    );
    let interval_hours = state.config.trial_reminder_interval_hours;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_hours * 3600));
        loop {
            ticker.tick().await;
            if let Err(e) = reminder.run_once().await {
                tracing::error!(error = %e, "Trial reminder run failed");
            }
        }
    });

    let rate_limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            rate_limiter.cleanup().await;
        }
    });
}
