use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use health::HealthHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use store_common::api::{ApiError, CartsSource};
use store_common::event::CartEvent;
use store_common::sink::CartEventSink;

use crate::tracker::CartTracker;

/// When a cart id is recorded in the tracker relative to its publish
/// attempt.
///
/// `BeforePublish` keeps the original fire-and-forget behavior: a failed
/// publish leaves the cart marked as seen, permanently dropping it for this
/// process's lifetime. `AfterPublish` marks only on success, so a failed
/// publish is retried on the next cycle (at the cost of possible duplicate
/// publishes if the failure was on the ack path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPolicy {
    BeforePublish,
    AfterPublish,
}

#[derive(Debug)]
pub struct ParseMarkPolicyError(String);

impl FromStr for MarkPolicy {
    type Err = ParseMarkPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before_publish" => Ok(MarkPolicy::BeforePublish),
            "after_publish" => Ok(MarkPolicy::AfterPublish),
            other => Err(ParseMarkPolicyError(other.to_owned())),
        }
    }
}

/// Counts for one poll cycle, for logging and metrics.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollStats {
    pub fetched: usize,
    pub new: usize,
    pub published: usize,
    pub failed: usize,
}

/// Bridges the pull-based store API to the push-based bus: fetch all carts,
/// drop the ones already published, publish an event per new cart.
pub struct CartsPoller<Source, Sink, Tracker> {
    source: Source,
    sink: Sink,
    tracker: Tracker,
    poll_interval: Duration,
    mark_policy: MarkPolicy,
    liveness: HealthHandle,
}

impl<Source, Sink, Tracker> CartsPoller<Source, Sink, Tracker>
where
    Source: CartsSource,
    Sink: CartEventSink,
    Tracker: CartTracker,
{
    pub fn new(
        source: Source,
        sink: Sink,
        tracker: Tracker,
        poll_interval: Duration,
        mark_policy: MarkPolicy,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            source,
            sink,
            tracker,
            poll_interval,
            mark_policy,
            liveness,
        }
    }

    /// One fetch-filter-publish cycle. Fetch failures propagate to the run
    /// loop; publish failures are contained to their cart so the rest of the
    /// cycle still goes out.
    pub async fn poll_once(&mut self) -> Result<PollStats, ApiError> {
        let carts = self.source.get_carts().await?;
        let extracted_at = Utc::now();

        let mut stats = PollStats {
            fetched: carts.len(),
            ..Default::default()
        };

        for cart in carts {
            if self.tracker.seen(cart.id) {
                continue;
            }
            stats.new += 1;

            if self.mark_policy == MarkPolicy::BeforePublish {
                self.tracker.mark_seen(cart.id);
            }

            let event = CartEvent::from_cart(&cart, extracted_at);
            match self.sink.send(event).await {
                Ok(()) => {
                    if self.mark_policy == MarkPolicy::AfterPublish {
                        self.tracker.mark_seen(cart.id);
                    }
                    stats.published += 1;
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(cart_id = cart.id, "failed to publish cart: {}", e);
                }
            }
        }

        metrics::counter!("carts_poll_cycles_total").increment(1);
        metrics::counter!("carts_poll_new_total").increment(stats.new as u64);

        Ok(stats)
    }

    /// Poll on a fixed interval until `shutdown` resolves. Cycle time is
    /// subtracted from the sleep so the cadence does not drift; an overrun
    /// cycle starts the next one immediately.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        info!(
            "starting carts poller, polling every {:?}",
            self.poll_interval
        );
        tokio::pin!(shutdown);

        loop {
            self.liveness.report_healthy();
            let cycle_start = Instant::now();

            match self.poll_once().await {
                Ok(stats) => info!(
                    fetched = stats.fetched,
                    new = stats.new,
                    published = stats.published,
                    failed = stats.failed,
                    "poll cycle complete"
                ),
                Err(e) => {
                    metrics::counter!("carts_poll_fetch_failures_total").increment(1);
                    error!("poll cycle failed, will retry next interval: {}", e);
                }
            }

            let elapsed = cycle_start.elapsed();
            let sleep_for = remaining_sleep(self.poll_interval, elapsed);
            if sleep_for.is_zero() {
                warn!(
                    ?elapsed,
                    interval = ?self.poll_interval,
                    "poll cycle overran the interval, starting next cycle immediately"
                );
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, stopping carts poller");
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}

/// Time left to sleep after a cycle. Saturates at zero: an overrun never
/// produces a negative sleep or accumulates debt.
pub fn remaining_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}
