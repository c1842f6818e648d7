//! Poll the store API for carts and publish new ones to the bus.
use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;
use std::future::ready;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use carts_poller::config::Config;
use carts_poller::poller::CartsPoller;
use carts_poller::tracker::InMemoryTracker;
use health::HealthRegistry;
use store_common::api::StoreApiClient;
use store_common::metrics::{serve, setup_metrics_routes};
use store_common::sink::{KafkaSink, PrintSink};

async fn index() -> &'static str {
    "carts poller"
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
    // Three missed cycles before the probe goes red
    let deadline = chrono::Duration::seconds(config.poll_interval.0.as_secs() as i64 * 3);
    let liveness = registry.register("poller", deadline);

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

    let source = StoreApiClient::new(&config.api_base_url, config.api_request_timeout.0)?;
    let tracker = InMemoryTracker::default();

    if config.print_sink {
        CartsPoller::new(
            source,
            PrintSink,
            tracker,
            config.poll_interval.0,
            config.mark_policy,
            liveness,
        )
        .run(shutdown())
        .await;
    } else {
        let sink = KafkaSink::new(&config.kafka)?;
        CartsPoller::new(
            source,
            sink,
            tracker,
            config.poll_interval.0,
            config.mark_policy,
            liveness,
        )
        .run(shutdown())
        .await;
    }

    Ok(())
}
