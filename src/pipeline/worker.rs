use std::{fmt::Display, sync::Arc, time::Duration};

use futures_util::{Stream, StreamExt};
use tokio::{sync::Semaphore, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    models::status::DeliveryDecision,
    pipeline::{dispatcher::Dispatcher, ports::DeliveryAcker},
};

/// One raw queue item, detached from the broker client type.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub data: Vec<u8>,
}

pub struct WorkerPool {
    dispatcher: Arc<Dispatcher>,
    acker: Arc<dyn DeliveryAcker>,
    permits: Arc<Semaphore>,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        acker: Arc<dyn DeliveryAcker>,
        concurrency: usize,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            acker,
            permits: Arc::new(Semaphore::new(concurrency)),
            shutdown_timeout,
        }
    }

    /// Pulls deliveries until the stream ends or `shutdown` fires, keeping at
    /// most `concurrency` items in flight. Returns once in-flight items have
    /// finished or the shutdown timeout has passed.
    pub async fn run<S, E>(&self, deliveries: S, shutdown: CancellationToken)
    where
        S: Stream<Item = Result<Delivery, E>> + Unpin,
        E: Display,
    {
        let flow = self.dispatcher.flow().kind;
        let tracker = TaskTracker::new();
        let mut deliveries = deliveries;

        info!(%flow, queue = %self.dispatcher.flow().queue_name, "Worker pool started");

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(%flow, error = %e, "Consumer failed, stopping intake");
                    break;
                }
                None => {
                    warn!(%flow, "Delivery stream closed");
                    break;
                }
            };

            let dispatcher = self.dispatcher.clone();
            let acker = self.acker.clone();

            tracker.spawn(async move {
                process_delivery(&dispatcher, acker.as_ref(), delivery).await;
                drop(permit);
            });
        }

        tracker.close();
        info!(%flow, in_flight = tracker.len(), "Worker pool draining");

        if timeout(self.shutdown_timeout, tracker.wait()).await.is_err() {
            warn!(
                %flow,
                in_flight = tracker.len(),
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Shutdown timeout reached with work still in flight"
            );
        } else {
            info!(%flow, "Worker pool stopped");
        }
    }
}

/// Dispatches one delivery and settles it with the broker.
pub async fn process_delivery(
    dispatcher: &Dispatcher,
    acker: &dyn DeliveryAcker,
    delivery: Delivery,
) -> DeliveryDecision {
    let trace_id = Uuid::new_v4();
    let span = info_span!(
        "delivery",
        %trace_id,
        flow = %dispatcher.flow().kind,
        delivery_tag = delivery.delivery_tag,
    );

    async move {
        debug!(bytes = delivery.data.len(), "Processing delivery");

        let decision = match dispatcher.dispatch(&delivery.data).await {
            Ok(_) => DeliveryDecision::Ack,
            Err(e) if e.is_throttle() => {
                warn!(error = %e, "Delivery throttled");
                DeliveryDecision::Reject
            }
            Err(e) => {
                error!(error = %e, "Delivery failed");
                DeliveryDecision::Reject
            }
        };

        let settled = match decision {
            DeliveryDecision::Ack => acker.acknowledge(delivery.delivery_tag).await,
            DeliveryDecision::Reject => acker.reject(delivery.delivery_tag, false).await,
        };

        if let Err(e) = settled {
            error!(error = %e, ?decision, "Failed to settle delivery");
        }

        decision
    }
    .instrument(span)
    .await
}
