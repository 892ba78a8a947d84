use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{Ack, Broker, DomainEvent, Headers, OutboundMessage, PublishError, Result, RoutingTable};

/// Default time to wait for a broker acknowledgement.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Default value of the `source` header.
pub const DEFAULT_SOURCE: &str = "fulfillment.api";

/// What happened to a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered(Ack),
    /// The broker did not answer in time; the event may or may not be queued.
    TimedOut,
    /// The broker rejected the message or was unreachable.
    Failed,
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered(_))
    }
}

/// Best-effort event publisher.
///
/// Resolves each event's destination through the [`RoutingTable`] and hands
/// it to the broker under a timeout. Broker failures are logged and reported
/// as a [`PublishOutcome`], never as an error, so a committed write is never
/// undone by a flaky broker. Timestamps are clamped to be non-decreasing
/// across everything one publisher (and its clones) sends.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    routes: RoutingTable,
    timeout: Duration,
    source: String,
    last_occurred_at: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl EventPublisher {
    /// Creates a publisher with the baseline routes.
    pub fn new(broker: impl Broker + 'static) -> Self {
        Self::from_arc(Arc::new(broker))
    }

    pub fn from_arc(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            routes: RoutingTable::baseline(),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
            source: DEFAULT_SOURCE.to_owned(),
            last_occurred_at: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_routes(mut self, routes: RoutingTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Publishes one event.
    ///
    /// Only fails if the event cannot be serialized.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id(), kind = %event.kind()))]
    pub async fn publish(&self, event: DomainEvent) -> Result<PublishOutcome> {
        let occurred_at = self.stamp(event.occurred_at());
        let event = event.with_occurred_at(occurred_at);

        let destination = self.routes.resolve(event.kind());
        let message = OutboundMessage {
            exchange: destination.exchange.to_owned(),
            exchange_kind: destination.kind,
            routing_key: destination.routing_key.to_owned(),
            headers: self.headers(&event),
            payload: event.to_json()?,
        };

        let outcome = match tokio::time::timeout(self.timeout, self.broker.publish(message)).await {
            Ok(Ok(ack)) => {
                tracing::info!(
                    exchange = destination.exchange,
                    routing_key = destination.routing_key,
                    queues = ack.queues.len(),
                    "event published"
                );
                PublishOutcome::Delivered(ack)
            }
            Ok(Err(e)) => {
                tracing::error!(exchange = destination.exchange, error = %e, "failed to publish event");
                PublishOutcome::Failed
            }
            Err(_) => {
                let e = PublishError::Timeout(self.timeout);
                tracing::error!(exchange = destination.exchange, error = %e, "failed to publish event");
                PublishOutcome::TimedOut
            }
        };

        Ok(outcome)
    }

    fn headers(&self, event: &DomainEvent) -> Headers {
        Headers::from([
            ("event-type".to_owned(), event.kind().type_name().to_owned()),
            ("message-id".to_owned(), event.id().to_string()),
            ("timestamp".to_owned(), event.occurred_at().to_rfc3339()),
            ("source".to_owned(), self.source.clone()),
            ("level".to_owned(), "info".to_owned()),
            ("content-type".to_owned(), "application/json".to_owned()),
        ])
    }

    /// Returns `occurred_at`, or the last stamped time if that is later.
    fn stamp(&self, occurred_at: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self
            .last_occurred_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stamped = match *last {
            Some(previous) if previous > occurred_at => previous,
            _ => occurred_at,
        };
        *last = Some(stamped);
        stamped
    }
}
