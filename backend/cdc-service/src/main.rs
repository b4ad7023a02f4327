use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdc_service::config::CdcConfig;
use cdc_service::repositories::{
    MobilityStationRepository, MobilityStationSink, PgCatalog, PgTicketDirectory,
    TruckPositionSink, TruckRepository,
};
use cdc_service::services::broker::BrokerConfig;
use cdc_service::services::change_streams::{ChangeStreamWatcher, PgChangeSource};
use cdc_service::services::listeners::event_changes::event_change_listener;
use cdc_service::services::listeners::place_changes::place_change_listener;
use cdc_service::services::listeners::telemetry::{truck_listener, GlobalCdcListener};
use cdc_service::services::notifications::{
    EventNotificationService, SmtpConfig, SmtpEmailSender,
};
use cdc_service::services::publisher::EventPublisher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rdkafka=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CDC service");

    let config = CdcConfig::from_env();
    let broker = BrokerConfig {
        brokers: config.brokers.clone(),
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Successfully connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;

    let catalog = Arc::new(PgCatalog::new(pool.clone()));
    let trucks: Arc<dyn TruckPositionSink> = Arc::new(TruckRepository::new(pool.clone()));
    let stations: Arc<dyn MobilityStationSink> =
        Arc::new(MobilityStationRepository::new(pool.clone()));
    let tickets = Arc::new(PgTicketDirectory::new(pool.clone()));

    // Every role below degrades independently: a role that fails to start is
    // logged and skipped, the rest of the service keeps running.

    match EventPublisher::new(&broker) {
        Ok(publisher) => {
            let reader = Arc::clone(&catalog);
            let database_url = config.database_url.clone();
            tokio::spawn(async move {
                match PgChangeSource::connect(&database_url).await {
                    Ok(source) => {
                        ChangeStreamWatcher::new(reader, publisher).run(source).await;
                    }
                    Err(e) => {
                        tracing::error!("Change stream watcher not started: {}", e);
                    }
                }
            });
        }
        Err(e) => tracing::error!("Event publisher not started: {}", e),
    }

    match place_change_listener(&broker, Arc::clone(&catalog) as _, config.closure_window) {
        Ok(listener) => {
            tokio::spawn(listener.run());
        }
        Err(e) => tracing::error!("Cultural-place listener not started: {}", e),
    }

    let email_sender = match SmtpEmailSender::new(&SmtpConfig::from_env()) {
        Ok(sender) => Some(Arc::new(sender)),
        Err(e) => {
            tracing::error!("SMTP transport not available, event notifications disabled: {}", e);
            None
        }
    };
    if let Some(sender) = email_sender {
        let notifier = Arc::new(EventNotificationService::new(tickets, sender as _));
        match event_change_listener(&broker, notifier) {
            Ok(listener) => {
                tokio::spawn(listener.run());
            }
            Err(e) => tracing::error!("Event-change listener not started: {}", e),
        }
    }

    match truck_listener(&broker, Arc::clone(&trucks)) {
        Ok(listener) => {
            tokio::spawn(listener.run());
        }
        Err(e) => tracing::error!("Truck telemetry listener not started: {}", e),
    }

    match GlobalCdcListener::new(&broker, trucks, stations) {
        Ok(listener) => {
            tokio::spawn(listener.run());
        }
        Err(e) => tracing::error!("Global CDC listener not started: {}", e),
    }

    tracing::info!("CDC service running, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, exiting");

    Ok(())
}
