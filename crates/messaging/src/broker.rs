//! Broker seam and an in-memory AMQP-style broker.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{ExchangeKind, PublishError, Result};

/// Messages a queue holds before the oldest are dropped.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 10_000;

/// Message headers. Ordered so logs and assertions are stable.
pub type Headers = BTreeMap<String, String>;

/// A message ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub exchange_kind: ExchangeKind,
    pub routing_key: String,
    pub headers: Headers,
    pub payload: Vec<u8>,
}

/// Broker acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ack {
    /// Queues the message was delivered to. Empty when nothing was bound.
    pub queues: Vec<String>,
}

/// Message broker transport.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes one message, declaring the exchange if it does not exist.
    ///
    /// Fails with [`PublishError::ExchangeKindMismatch`] if the exchange
    /// already exists with a different kind.
    async fn publish(&self, message: OutboundMessage) -> Result<Ack>;
}

/// How a headers binding compares its headers with a message's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMatch {
    /// `x-match: all`
    All,
    /// `x-match: any`
    Any,
}

#[derive(Debug, Clone)]
enum BindingRule {
    RoutingKey(String),
    Headers { mode: HeaderMatch, headers: Headers },
}

#[derive(Debug, Clone)]
struct Binding {
    queue: String,
    rule: BindingRule,
}

#[derive(Debug, Clone)]
struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<Binding>,
}

/// A message sitting in a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub headers: Headers,
    pub payload: Vec<u8>,
}

impl Delivery {
    /// Parses the payload as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug)]
struct Topology {
    exchanges: HashMap<String, Exchange>,
    queues: BTreeMap<String, VecDeque<Delivery>>,
    max_depth: usize,
    dropped: u64,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchanges: HashMap::new(),
            queues: BTreeMap::new(),
            max_depth: DEFAULT_MAX_QUEUE_DEPTH,
            dropped: 0,
        }
    }
}

impl Topology {
    fn declare_exchange(&mut self, name: &str, kind: ExchangeKind) -> Result<()> {
        match self.exchanges.get(name) {
            Some(existing) if existing.kind != kind => Err(PublishError::ExchangeKindMismatch {
                exchange: name.to_owned(),
                declared: existing.kind,
                requested: kind,
            }),
            Some(_) => Ok(()),
            None => {
                self.exchanges.insert(
                    name.to_owned(),
                    Exchange {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    /// Drops the oldest messages of every queue past `max_depth`.
    fn trim(&mut self) {
        let max_depth = self.max_depth;
        let mut dropped = 0;
        for messages in self.queues.values_mut() {
            while messages.len() > max_depth {
                messages.pop_front();
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, max_depth, "queue depth exceeded, dropped oldest messages");
            self.dropped += dropped;
        }
    }

    fn bind(&mut self, queue: &str, exchange: &str, rule: BindingRule) -> Result<()> {
        if !self.queues.contains_key(queue) {
            return Err(PublishError::UnknownQueue(queue.to_owned()));
        }
        let exchange = self
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| PublishError::UnknownExchange(exchange.to_owned()))?;
        exchange.bindings.push(Binding {
            queue: queue.to_owned(),
            rule,
        });
        Ok(())
    }
}

/// In-memory broker with RabbitMQ exchange semantics.
///
/// Exchanges route to named queues through bindings; queues keep delivered
/// messages until drained, up to [`DEFAULT_MAX_QUEUE_DEPTH`] each, after
/// which the oldest are dropped. Used in tests and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topology: Arc<RwLock<Topology>>,
    unavailable: Arc<AtomicBool>,
    latency: Arc<std::sync::Mutex<Option<Duration>>>,
}

impl InMemoryBroker {
    /// Creates a broker with no exchanges or queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker with the standard store topology declared.
    pub async fn with_default_topology() -> Result<Self> {
        let broker = Self::new();
        broker.declare_default_topology().await?;
        Ok(broker)
    }

    /// Declares the exchanges, queues and bindings the store's consumers use.
    pub async fn declare_default_topology(&self) -> Result<()> {
        // Orders: direct routing by event.
        self.declare_exchange("orders.exchange", ExchangeKind::Direct).await?;
        for (queue, key) in [
            ("orders.created.queue", "orders.created"),
            ("orders.cancelled.queue", "orders.cancelled"),
        ] {
            self.declare_queue(queue).await;
            self.bind(queue, "orders.exchange", key).await?;
        }

        // Products: every consumer sees every stock change.
        self.declare_exchange("products.exchange", ExchangeKind::Fanout).await?;
        for queue in ["products.inventory.queue", "products.notifications.queue"] {
            self.declare_queue(queue).await;
            self.bind(queue, "products.exchange", "").await?;
        }

        // Notifications: topic routing by channel.
        self.declare_exchange("notifications.exchange", ExchangeKind::Topic)
            .await?;
        for (queue, pattern) in [
            ("notifications.email.queue", "notification.email.*"),
            ("notifications.sms.queue", "notification.sms.*"),
        ] {
            self.declare_queue(queue).await;
            self.bind(queue, "notifications.exchange", pattern).await?;
        }

        // Logs: routed by the `level` header.
        self.declare_exchange("logs.exchange", ExchangeKind::Headers).await?;
        for (queue, level) in [("logs.error.queue", "error"), ("logs.info.queue", "info")] {
            self.declare_queue(queue).await;
            let headers = Headers::from([("level".to_owned(), level.to_owned())]);
            self.bind_headers(queue, "logs.exchange", HeaderMatch::All, headers)
                .await?;
        }

        Ok(())
    }

    pub async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<()> {
        self.topology.write().await.declare_exchange(name, kind)
    }

    /// Declares a queue. Redeclaring keeps its messages.
    pub async fn declare_queue(&self, name: &str) {
        self.topology
            .write()
            .await
            .queues
            .entry(name.to_owned())
            .or_default();
    }

    /// Binds a queue with a routing key (direct and topic exchanges; ignored
    /// by fanout).
    pub async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.topology.write().await.bind(
            queue,
            exchange,
            BindingRule::RoutingKey(routing_key.to_owned()),
        )
    }

    /// Binds a queue to a headers exchange.
    pub async fn bind_headers(
        &self,
        queue: &str,
        exchange: &str,
        mode: HeaderMatch,
        headers: Headers,
    ) -> Result<()> {
        self.topology
            .write()
            .await
            .bind(queue, exchange, BindingRule::Headers { mode, headers })
    }

    /// Caps every queue at `depth` messages, dropping the oldest first.
    pub async fn set_max_queue_depth(&self, depth: usize) {
        let mut topology = self.topology.write().await;
        topology.max_depth = depth.max(1);
        topology.trim();
    }

    /// Messages dropped so far because a queue was full.
    pub async fn dropped_messages(&self) -> u64 {
        self.topology.read().await.dropped
    }

    /// Messages currently in `queue`, oldest first.
    pub async fn messages(&self, queue: &str) -> Vec<Delivery> {
        self.topology
            .read()
            .await
            .queues
            .get(queue)
            .map(|messages| messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes and returns every message in `queue`.
    pub async fn drain(&self, queue: &str) -> Vec<Delivery> {
        self.topology
            .write()
            .await
            .queues
            .get_mut(queue)
            .map(|messages| Vec::from(std::mem::take(messages)))
            .unwrap_or_default()
    }

    /// Total number of messages across all queues.
    pub async fn total_messages(&self) -> usize {
        self.topology
            .read()
            .await
            .queues
            .values()
            .map(VecDeque::len)
            .sum()
    }

    /// Makes every publish fail with a transport error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every publish by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self
            .latency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = latency;
    }

    fn current_latency(&self) -> Option<Duration> {
        *self
            .latency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, message: OutboundMessage) -> Result<Ack> {
        if let Some(latency) = self.current_latency() {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PublishError::Transport("broker unavailable".into()));
        }

        let mut topology = self.topology.write().await;
        topology.declare_exchange(&message.exchange, message.exchange_kind)?;

        let exchange = topology
            .exchanges
            .get(&message.exchange)
            .ok_or_else(|| PublishError::UnknownExchange(message.exchange.clone()))?;
        let targets: BTreeSet<String> = exchange
            .bindings
            .iter()
            .filter(|b| routes_to(exchange.kind, &b.rule, &message))
            .map(|b| b.queue.clone())
            .collect();

        for queue in &targets {
            if let Some(messages) = topology.queues.get_mut(queue) {
                messages.push_back(Delivery {
                    exchange: message.exchange.clone(),
                    routing_key: message.routing_key.clone(),
                    headers: message.headers.clone(),
                    payload: message.payload.clone(),
                });
            }
        }
        topology.trim();

        Ok(Ack {
            queues: targets.into_iter().collect(),
        })
    }
}

fn routes_to(kind: ExchangeKind, rule: &BindingRule, message: &OutboundMessage) -> bool {
    match (kind, rule) {
        (ExchangeKind::Fanout, _) => true,
        (ExchangeKind::Direct, BindingRule::RoutingKey(key)) => *key == message.routing_key,
        (ExchangeKind::Topic, BindingRule::RoutingKey(pattern)) => {
            topic_matches(pattern, &message.routing_key)
        }
        (ExchangeKind::Headers, BindingRule::Headers { mode, headers }) => {
            let mut pairs = headers
                .iter()
                .map(|(name, value)| message.headers.get(name) == Some(value));
            match mode {
                HeaderMatch::All => pairs.all(|matched| matched),
                HeaderMatch::Any => pairs.any(|matched| matched),
            }
        }
        _ => false,
    }
}

/// AMQP topic matching: words split on `.`, `*` is exactly one word and `#`
/// is zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match pattern.split_first() {
            None => key.is_empty(),
            Some((&"#", rest)) => (0..=key.len()).any(|skip| matches(rest, &key[skip..])),
            Some((&"*", rest)) => !key.is_empty() && matches(rest, &key[1..]),
            Some((word, rest)) => key.first() == Some(word) && matches(rest, &key[1..]),
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    matches(&pattern, &key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(exchange: &str, kind: ExchangeKind, routing_key: &str) -> OutboundMessage {
        OutboundMessage {
            exchange: exchange.into(),
            exchange_kind: kind,
            routing_key: routing_key.into(),
            headers: Headers::from([("level".to_owned(), "info".to_owned())]),
            payload: br#"{"ok":true}"#.to_vec(),
        }
    }

    #[test]
    fn topic_patterns() {
        assert!(topic_matches("notification.email.*", "notification.email.welcome"));
        assert!(!topic_matches("notification.email.*", "notification.email"));
        assert!(!topic_matches("notification.email.*", "notification.email.a.b"));
        assert!(topic_matches("notification.#", "notification"));
        assert!(topic_matches("notification.#", "notification.sms.alert"));
        assert!(topic_matches("#", ""));
        assert!(topic_matches("*.created", "orders.created"));
        assert!(!topic_matches("*.created", "orders.cancelled"));
    }

    #[tokio::test]
    async fn direct_delivers_on_exact_key_only() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();

        let ack = broker
            .publish(message("orders.exchange", ExchangeKind::Direct, "orders.created"))
            .await
            .unwrap();

        assert_eq!(ack.queues, vec!["orders.created.queue".to_owned()]);
        assert_eq!(broker.messages("orders.created.queue").await.len(), 1);
        assert!(broker.messages("orders.cancelled.queue").await.is_empty());
    }

    #[tokio::test]
    async fn fanout_reaches_every_bound_queue() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();

        let ack = broker
            .publish(message("products.exchange", ExchangeKind::Fanout, "ignored"))
            .await
            .unwrap();

        assert_eq!(ack.queues.len(), 2);
        assert_eq!(broker.messages("products.inventory.queue").await.len(), 1);
        assert_eq!(broker.messages("products.notifications.queue").await.len(), 1);
    }

    #[tokio::test]
    async fn topic_routes_by_pattern() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();

        broker
            .publish(message(
                "notifications.exchange",
                ExchangeKind::Topic,
                "notification.sms.shipped",
            ))
            .await
            .unwrap();

        assert_eq!(broker.messages("notifications.sms.queue").await.len(), 1);
        assert!(broker.messages("notifications.email.queue").await.is_empty());
    }

    #[tokio::test]
    async fn headers_exchange_matches_level() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();

        broker
            .publish(message("logs.exchange", ExchangeKind::Headers, ""))
            .await
            .unwrap();

        assert_eq!(broker.messages("logs.info.queue").await.len(), 1);
        assert!(broker.messages("logs.error.queue").await.is_empty());
    }

    #[tokio::test]
    async fn headers_any_needs_one_match() {
        let broker = InMemoryBroker::new();
        broker
            .declare_exchange("audit", ExchangeKind::Headers)
            .await
            .unwrap();
        broker.declare_queue("audit.queue").await;
        let wanted = Headers::from([
            ("level".to_owned(), "error".to_owned()),
            ("source".to_owned(), "api".to_owned()),
        ]);
        broker
            .bind_headers("audit.queue", "audit", HeaderMatch::Any, wanted)
            .await
            .unwrap();

        let mut msg = message("audit", ExchangeKind::Headers, "");
        msg.headers.insert("source".into(), "api".into());
        broker.publish(msg).await.unwrap();

        assert_eq!(broker.messages("audit.queue").await.len(), 1);
    }

    #[tokio::test]
    async fn kind_mismatch_is_rejected() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();

        let result = broker
            .publish(message("orders.exchange", ExchangeKind::Fanout, "orders.created"))
            .await;

        assert!(matches!(
            result,
            Err(PublishError::ExchangeKindMismatch { .. })
        ));
        assert_eq!(broker.total_messages().await, 0);
    }

    #[tokio::test]
    async fn unknown_exchange_is_declared_on_publish() {
        let broker = InMemoryBroker::new();

        let ack = broker
            .publish(message("default.exchange", ExchangeKind::Direct, "x"))
            .await
            .unwrap();

        assert!(ack.queues.is_empty());
        broker.declare_queue("x.queue").await;
        broker.bind("x.queue", "default.exchange", "x").await.unwrap();
    }

    #[tokio::test]
    async fn binding_requires_declared_queue() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();
        let result = broker.bind("missing", "orders.exchange", "k").await;
        assert!(matches!(result, Err(PublishError::UnknownQueue(_))));
    }

    #[tokio::test]
    async fn drain_empties_the_queue() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();
        broker
            .publish(message("orders.exchange", ExchangeKind::Direct, "orders.created"))
            .await
            .unwrap();

        assert_eq!(broker.drain("orders.created.queue").await.len(), 1);
        assert!(broker.messages("orders.created.queue").await.is_empty());
    }

    #[tokio::test]
    async fn full_queues_drop_the_oldest_messages() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();
        broker.set_max_queue_depth(2).await;

        for key in ["first", "second", "third"] {
            let mut msg = message("orders.exchange", ExchangeKind::Direct, "orders.created");
            msg.payload = key.as_bytes().to_vec();
            broker.publish(msg).await.unwrap();
        }

        let kept: Vec<Vec<u8>> = broker
            .messages("orders.created.queue")
            .await
            .into_iter()
            .map(|d| d.payload)
            .collect();
        assert_eq!(kept, vec![b"second".to_vec(), b"third".to_vec()]);
        assert_eq!(broker.dropped_messages().await, 1);
    }

    #[tokio::test]
    async fn lowering_the_depth_trims_existing_queues() {
        let broker = InMemoryBroker::with_default_topology().await.unwrap();
        for _ in 0..3 {
            broker
                .publish(message("products.exchange", ExchangeKind::Fanout, ""))
                .await
                .unwrap();
        }

        broker.set_max_queue_depth(1).await;

        assert_eq!(broker.total_messages().await, 2);
        assert_eq!(broker.dropped_messages().await, 4);
    }
}
