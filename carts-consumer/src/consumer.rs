use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use store_common::event::CartEvent;
use store_common::warehouse::WarehouseSink;

use crate::subscriber::BusSubscriber;

/// How a handled message is settled with the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    Nack,
}

/// Decode a message payload and write it to the warehouse.
///
/// Ack if and only if the insert came back with zero row errors. A payload
/// that does not parse as a cart event is nacked without touching the
/// warehouse; redelivery and dead-lettering stay with the bus.
pub async fn process(payload: &[u8], warehouse: &dyn WarehouseSink) -> Outcome {
    let event: CartEvent = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(e) => {
            metrics::counter!("carts_events_parse_failures_total").increment(1);
            error!("failed to parse cart event payload: {}", e);
            return Outcome::Nack;
        }
    };

    match warehouse.insert_row(&event).await {
        Ok(errors) if errors.is_empty() => {
            metrics::counter!("warehouse_rows_inserted_total").increment(1);
            info!(cart_id = event.cart_id, "streamed cart event to warehouse");
            Outcome::Ack
        }
        Ok(errors) => {
            metrics::counter!("warehouse_rows_rejected_total").increment(1);
            error!(
                cart_id = event.cart_id,
                "warehouse rejected row: {:?}", errors
            );
            Outcome::Nack
        }
        Err(e) => {
            metrics::counter!("warehouse_insert_failures_total").increment(1);
            error!(cart_id = event.cart_id, "warehouse insert failed: {}", e);
            Outcome::Nack
        }
    }
}

/// Consumes cart events from the bus and streams them to the warehouse,
/// handling up to `max_in_flight` messages concurrently.
pub struct CartsConsumer<Sub> {
    subscriber: Sub,
    warehouse: Arc<dyn WarehouseSink>,
    max_in_flight: usize,
    liveness: HealthHandle,
    liveness_tick: Duration,
}

impl<Sub: BusSubscriber> CartsConsumer<Sub> {
    pub fn new(
        subscriber: Sub,
        warehouse: Arc<dyn WarehouseSink>,
        max_in_flight: usize,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            subscriber,
            warehouse,
            max_in_flight,
            liveness,
            liveness_tick: Duration::from_secs(10),
        }
    }

    /// How often the run loop wakes up to report liveness when no messages
    /// arrive. Must be shorter than the component's health deadline.
    pub fn with_liveness_tick(mut self, tick: Duration) -> Self {
        self.liveness_tick = tick;
        self
    }

    /// Receive and handle messages until `shutdown` resolves, then let the
    /// in-flight handlers finish before returning.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        info!(
            max_in_flight = self.max_in_flight,
            "starting carts consumer"
        );
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        tokio::pin!(shutdown);

        loop {
            self.liveness.report_healthy();

            let delivery = tokio::select! {
                _ = &mut shutdown => break,
                // Wake up on an idle subscription so liveness stays fresh
                _ = tokio::time::sleep(self.liveness_tick) => continue,
                received = self.subscriber.recv() => match received {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        // Transient bus errors should not kill the loop
                        warn!("failed to receive from the bus: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
            };

            metrics::counter!("carts_events_received_total").increment(1);

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore has been closed");
            let warehouse = self.warehouse.clone();

            tokio::spawn(async move {
                match process(delivery.payload(), warehouse.as_ref()).await {
                    Outcome::Ack => delivery.ack(),
                    Outcome::Nack => delivery.nack(),
                }
                drop(permit);
            });
        }

        info!("shutdown signal received, draining in-flight messages");
        let _drain = semaphore
            .acquire_many(self.max_in_flight as u32)
            .await
            .expect("semaphore has been closed");
        info!("carts consumer stopped");
    }
}
