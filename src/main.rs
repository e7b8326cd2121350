use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use tokio::{signal, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use whatsapp_service::{
    api::run_api_server,
    clients::{
        database::DatabaseClient,
        evolution::EvolutionClient,
        health::HealthChecker,
        rbmq::{RabbitMqClient, deliveries},
    },
    config::{Config, FlowConfig},
    pipeline::{dispatcher::Dispatcher, worker::WorkerPool},
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "whatsapp_service=info".into()),
        )
        .json()
        .init();

    let config = Config::load()?;

    info!(environment = %config.environment, "Configuration loaded");

    let afrus_db = Arc::new(DatabaseClient::connect("afrus", &config.afrus_database_url, &config).await?);
    let events_db = Arc::new(DatabaseClient::connect("events", &config.events_database_url, &config).await?);
    let broker = Arc::new(RabbitMqClient::connect_with_retry(&config).await?);
    let gateway = Arc::new(EvolutionClient::new(&config)?);

    let shutdown = CancellationToken::new();
    let mut workers = JoinSet::new();

    for flow in [config.autoresponder_flow(), config.blast_flow()] {
        let dispatcher = Arc::new(Dispatcher::new(
            flow.clone(),
            afrus_db.clone(),
            events_db.clone(),
            broker.clone(),
            gateway.clone(),
        ));
        let pool = WorkerPool::new(
            dispatcher,
            broker.clone(),
            config.worker_concurrency,
            Duration::from_secs(config.shutdown_timeout_seconds),
        );

        let consumer = broker
            .create_consumer(&flow.queue_name, &consumer_tag(&flow))
            .await?;
        let token = shutdown.clone();

        workers.spawn(async move { pool.run(deliveries(consumer), token).await });
    }

    let health_checker = HealthChecker::new(afrus_db.clone(), events_db.clone(), broker.clone());
    let api_shutdown = shutdown.clone();
    let port = config.server_port;
    let api = tokio::spawn(async move {
        if let Err(e) = run_api_server(port, health_checker, api_shutdown).await {
            error!(error = %e, "Health check server exited with error");
        }
    });

    info!(concurrency = config.worker_concurrency, "Workers started");

    wait_for_shutdown_signal().await;
    info!("Received shutdown signal, stopping gracefully");
    shutdown.cancel();

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Worker pool task failed");
        }
    }
    if let Err(e) = api.await {
        error!(error = %e, "Health check server task failed");
    }

    if let Err(e) = broker.close().await {
        error!(error = %e, "Failed to close broker connection");
    }
    afrus_db.close().await;
    events_db.close().await;

    info!("WhatsApp service stopped");

    Ok(())
}

fn consumer_tag(flow: &FlowConfig) -> String {
    format!("{}-consumer", flow.queue_name)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
