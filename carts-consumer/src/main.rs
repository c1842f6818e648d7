//! Consume cart events from the bus and stream them to the warehouse.
use std::future::ready;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use carts_consumer::config::Config;
use carts_consumer::consumer::CartsConsumer;
use carts_consumer::subscriber::Subscriber;
use health::HealthRegistry;
use store_common::metrics::{serve, setup_metrics_routes};
use store_common::warehouse::{BigQuerySink, PrintSink, WarehouseSink};

async fn index() -> &'static str {
    "carts consumer"
}

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env().expect("invalid configuration:");

    let registry = HealthRegistry::new("liveness");
    let liveness = registry.register("consumer", chrono::Duration::seconds(60));

    let router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(move || ready(registry.get_status())));
    let router = setup_metrics_routes(router);
    let bind = config.bind();
    tokio::task::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    let subscriber = Subscriber::new(&config.kafka)?;

    let warehouse: Arc<dyn WarehouseSink> = if config.print_sink {
        Arc::new(PrintSink)
    } else {
        Arc::new(BigQuerySink::new(&config.warehouse).await?)
    };

    CartsConsumer::new(subscriber, warehouse, config.max_in_flight, liveness)
        .run(shutdown())
        .await;

    Ok(())
}
