//! # Integration Test Flows
//!
//! Tests that the transport, bus, rpc, queue, and stream crates work
//! together over one shared in-memory broker.
//!
//! ## Flows Tested
//!
//! 1. **Discovery**: instances announce themselves and detect name
//!    collisions across connections.
//! 2. **Events**: an emitter's envelopes reach a listening service on
//!    another connection, validated and filtered.
//! 3. **Queries**: correlated request/response between two instances.
//! 4. **Queue**: tasks put before any consumer exists survive and drain
//!    in FIFO order once one starts.
//! 5. **Stream**: a packet run arrives ordered with its end marker.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    use courier_bus::{emit, EventFilter, ListeningService, ServiceRegistry};
    use courier_queue::{NoopSleeper, QueueConfig, QueueEvent, QueueService};
    use courier_rpc::{listen as listen_queries, query, QueryInbound};
    use courier_stream::{emit as emit_stream, listen as listen_stream, StreamEvent};
    use courier_transport::{ConnectConfig, Connection, DiscoveryOutcome, MemoryBroker};
    use courier_types::{DecodeOutcome, EventSet, Schema, SerializationError, TypedSchema};

    use crate::init_tracing;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        sku: String,
        count: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum ShopEvents {
        Placed(Order),
    }

    impl EventSet for ShopEvents {
        fn event_names() -> &'static [&'static str] {
            &["placed"]
        }

        fn event_name(&self) -> &'static str {
            match self {
                Self::Placed(_) => "placed",
            }
        }

        fn decode(event: &str, data: &Value) -> DecodeOutcome<Self> {
            match event {
                "placed" => match TypedSchema::<Order>::new().validate(data) {
                    Ok(order) => DecodeOutcome::Event(Self::Placed(order)),
                    Err(e) => DecodeOutcome::Invalid(e),
                },
                _ => DecodeOutcome::UnknownEvent,
            }
        }

        fn encode(&self) -> Result<(&'static str, Value), SerializationError> {
            match self {
                Self::Placed(order) => Ok(("placed", serde_json::to_value(order)?)),
            }
        }
    }

    async fn connect(broker: &MemoryBroker, name: &str) -> Arc<Connection> {
        Connection::connect(Arc::new(broker.clone()), name, ConnectConfig::default())
            .await
            .unwrap()
    }

    fn order(sku: &str, count: u32) -> Order {
        Order {
            sku: sku.to_string(),
            count,
        }
    }

    // =========================================================================
    // DISCOVERY
    // =========================================================================

    #[tokio::test]
    async fn distinct_instances_discover_cleanly() {
        init_tracing();
        let broker = MemoryBroker::new();
        let shop = connect(&broker, "shop").await;
        let billing = connect(&broker, "billing").await;

        assert!(shop.is_open());
        assert!(billing.is_open());
        assert_eq!(shop.discovery(), Some(DiscoveryOutcome::SelfEcho));
        assert!(!shop.duplicate_name_flagged());
        assert!(!billing.duplicate_name_flagged());
        assert_ne!(shop.client_id(), billing.client_id());
    }

    #[tokio::test]
    async fn second_instance_with_same_name_is_flagged() {
        init_tracing();
        let broker = MemoryBroker::new();
        let incumbent = connect(&broker, "shop").await;
        let intruder = connect(&broker, "shop").await;

        // The intruder announces the shared name; the incumbent's persistent
        // listener hears the announce and flags the collision.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while !incumbent.duplicate_name_flagged() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "duplicate name never flagged"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(intruder.is_open(), "collision never refuses a connect");
    }

    // =========================================================================
    // EVENTS ACROSS CONNECTIONS
    // =========================================================================

    #[tokio::test]
    async fn emitted_events_reach_listening_service() {
        init_tracing();
        let broker = MemoryBroker::new();
        let shop = connect(&broker, "shop").await;
        let hub = connect(&broker, "hub").await;

        let registry = ServiceRegistry::new();
        let service = ListeningService::<ShopEvents>::create(&hub, &registry, "shop")
            .await
            .unwrap();
        let mut listener = service.listen(EventFilter::all());

        emit(&shop, &ShopEvents::Placed(order("widget", 2)))
            .await
            .unwrap();

        let delivery = timeout(Duration::from_secs(1), listener.recv())
            .await
            .expect("timed out")
            .expect("delivery");
        assert_eq!(delivery.event, ShopEvents::Placed(order("widget", 2)));
    }

    #[tokio::test]
    async fn registries_are_per_context() {
        init_tracing();
        let broker = MemoryBroker::new();
        let hub_a = connect(&broker, "hub-a").await;
        let hub_b = connect(&broker, "hub-b").await;

        // Each context has its own registry, so both can host a service
        // named "shop" without colliding.
        let registry_a = ServiceRegistry::new();
        let registry_b = ServiceRegistry::new();
        let _a = ListeningService::<ShopEvents>::new(&hub_a, &registry_a, "shop")
            .await
            .unwrap();
        let _b = ListeningService::<ShopEvents>::new(&hub_b, &registry_b, "shop")
            .await
            .unwrap();
        assert_eq!(registry_a.len(), 1);
        assert_eq!(registry_b.len(), 1);
    }

    // =========================================================================
    // QUERIES ACROSS CONNECTIONS
    // =========================================================================

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PriceRequest {
        sku: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PriceReply {
        cents: u64,
    }

    #[tokio::test]
    async fn query_round_trips_between_instances() {
        init_tracing();
        let broker = MemoryBroker::new();
        let billing = connect(&broker, "billing").await;
        let shop = connect(&broker, "shop").await;

        let _listener = listen_queries(
            &billing,
            "billing",
            "price",
            TypedSchema::<PriceRequest>::new(),
            |inbound: QueryInbound<PriceRequest>| async move {
                let cents = if inbound.data.sku == "widget" { 250 } else { 0 };
                Ok(PriceReply { cents })
            },
        )
        .await
        .unwrap();

        let reply = query(
            &shop,
            "billing",
            "price",
            &PriceRequest {
                sku: "widget".to_string(),
            },
            &TypedSchema::<PriceReply>::new(),
        )
        .await
        .unwrap();
        assert_eq!(reply, PriceReply { cents: 250 });
    }

    // =========================================================================
    // QUEUE ACROSS CONNECTIONS
    // =========================================================================

    fn fast_queue(conn: Arc<Connection>, name: &str) -> QueueService<TypedSchema<Order>> {
        QueueService::with_config(
            conn,
            name,
            TypedSchema::<Order>::new(),
            QueueConfig {
                pop_timeout: Duration::from_millis(10),
                idle_delay: Duration::ZERO,
                loop_delay: Duration::ZERO,
            },
            Arc::new(NoopSleeper),
        )
    }

    #[tokio::test]
    async fn queue_backlog_survives_until_a_consumer_starts() {
        init_tracing();
        let broker = MemoryBroker::new();
        let producer = connect(&broker, "shop").await;
        let consumer = connect(&broker, "worker").await;

        // Produce with nobody consuming.
        let outbox = fast_queue(Arc::clone(&producer), "fulfilment");
        outbox.put(&order("widget", 1), false).await.unwrap();
        outbox.put(&order("gadget", 2), false).await.unwrap();
        assert_eq!(outbox.len().await.unwrap(), 2);

        // A consumer started later drains the backlog in FIFO order.
        let inbox = fast_queue(consumer, "fulfilment");
        let mut observer = inbox.observe();
        let _stop = inbox.start();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            let event = timeout(Duration::from_secs(2), observer.recv())
                .await
                .expect("timed out")
                .expect("queue gone");
            if let QueueEvent::Data(task) = event {
                seen.push(task);
            }
        }
        assert_eq!(seen, vec![order("widget", 1), order("gadget", 2)]);
    }

    #[tokio::test]
    async fn queue_notify_hint_reaches_subscribers() {
        init_tracing();
        let broker = MemoryBroker::new();
        let producer = connect(&broker, "shop").await;
        let watcher = connect(&broker, "watcher").await;

        let mut hint = watcher
            .subscriber()
            .unwrap()
            .subscribe("queue:fulfilment")
            .await
            .unwrap();

        let outbox = fast_queue(producer, "fulfilment");
        outbox.put(&order("widget", 1), true).await.unwrap();

        let payload = timeout(Duration::from_secs(1), hint.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        let hinted: Order = serde_json::from_str(&payload).unwrap();
        assert_eq!(hinted, order("widget", 1));
        assert_eq!(outbox.len().await.unwrap(), 1, "the durable copy stays queued");
    }

    // =========================================================================
    // STREAMS ACROSS CONNECTIONS
    // =========================================================================

    #[tokio::test]
    async fn stream_run_arrives_ordered_with_end_marker() {
        init_tracing();
        let broker = MemoryBroker::new();
        let producer = connect(&broker, "export").await;
        let consumer = connect(&broker, "report").await;

        let mut listener = listen_stream(&consumer, "orders", TypedSchema::<Order>::new())
            .await
            .unwrap();

        let source = tokio_stream::iter([order("a", 1), order("b", 2), order("c", 3)]);
        let run_id = emit_stream(&producer, "orders", source).await.unwrap();

        for expected_packet in 0..3u64 {
            match timeout(Duration::from_secs(1), listener.recv())
                .await
                .expect("timed out")
                .expect("listener closed")
            {
                StreamEvent::Data { packet, id, .. } => {
                    assert_eq!(packet, expected_packet);
                    assert_eq!(id, run_id);
                }
                StreamEvent::End { .. } => panic!("premature end marker"),
            }
        }
        assert!(matches!(
            timeout(Duration::from_secs(1), listener.recv())
                .await
                .expect("timed out")
                .expect("listener closed"),
            StreamEvent::End { id, .. } if id == run_id
        ));
    }

    // =========================================================================
    // JSON WIRE SHAPE
    // =========================================================================

    #[tokio::test]
    async fn emitted_envelope_uses_the_wire_field_names() {
        init_tracing();
        let broker = MemoryBroker::new();
        let shop = connect(&broker, "shop").await;
        let watcher = connect(&broker, "watcher").await;

        let mut raw = watcher
            .subscriber()
            .unwrap()
            .subscribe("channel:shop")
            .await
            .unwrap();
        emit(&shop, &ShopEvents::Placed(order("widget", 1)))
            .await
            .unwrap();

        let payload = timeout(Duration::from_secs(1), raw.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["event"], json!("placed"));
        assert_eq!(value["data"], json!({"sku": "widget", "count": 1}));
        assert!(value["date"].is_string());
        assert!(value["id"].is_i64());
    }
}
