//! # End-to-End Choreography Tests
//!
//! Tests a complete order-processing scenario across four instances on
//! one broker:
//!
//! ```text
//! [shop] ──placed event──→ channel:shop ──→ [audit] (listening service)
//!   │
//!   ├──price query──→ query:billing:price ──→ [billing] (query listener)
//!   │                                              │
//!   │        response:billing:<requestId> ←────────┘
//!   │
//!   └──fulfilment task──→ queue:fulfilment ──→ [worker] (queue consumer)
//!                                                   │
//!            stream:shipments ←── packet run ←──────┘
//!                  │
//!                  └──→ [audit] (stream listener)
//! ```
//!
//! ## Test Categories
//!
//! 1. **Happy Path**: the full pipeline, every hop observed.
//! 2. **Lifecycle**: disconnect and reconnect mid-scenario.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use courier_bus::{emit, EventFilter, ListeningService, ServiceRegistry};
    use courier_queue::{NoopSleeper, QueueConfig, QueueEvent, QueueService};
    use courier_rpc::{listen as listen_queries, query, QueryInbound};
    use courier_stream::{emit as emit_stream, listen as listen_stream, StreamEvent};
    use courier_transport::{
        ConnectConfig, Connection, LifecycleFilter, LifecycleKind, MemoryBroker, Side,
        TransportError,
    };
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

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PriceRequest {
        sku: String,
        count: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        total_cents: u64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shipment {
        sku: String,
        leg: String,
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

    // =========================================================================
    // HAPPY PATH
    // =========================================================================

    #[tokio::test]
    async fn full_order_pipeline() {
        init_tracing();
        let broker = MemoryBroker::new();
        let shop = connect(&broker, "shop").await;
        let billing = connect(&broker, "billing").await;
        let worker = connect(&broker, "worker").await;
        let audit = connect(&broker, "audit").await;

        // Audit watches shop events.
        let registry = ServiceRegistry::new();
        let shop_feed = ListeningService::<ShopEvents>::create(&audit, &registry, "shop")
            .await
            .unwrap();
        let mut audit_events = shop_feed.listen(EventFilter::all());

        // Billing answers price queries.
        let _billing_listener = listen_queries(
            &billing,
            "billing",
            "price",
            TypedSchema::<PriceRequest>::new(),
            |inbound: QueryInbound<PriceRequest>| async move {
                Ok(Invoice {
                    total_cents: 250 * u64::from(inbound.data.count),
                })
            },
        )
        .await
        .unwrap();

        // Worker consumes the fulfilment queue.
        let fulfilment = QueueService::with_config(
            Arc::clone(&worker),
            "fulfilment",
            TypedSchema::<Order>::new(),
            QueueConfig {
                pop_timeout: Duration::from_millis(10),
                idle_delay: Duration::ZERO,
                loop_delay: Duration::ZERO,
            },
            Arc::new(NoopSleeper),
        );
        let mut tasks = fulfilment.observe();
        let _stop = fulfilment.start();

        // Audit also watches the shipment stream.
        let mut shipments = listen_stream(&audit, "shipments", TypedSchema::<Shipment>::new())
            .await
            .unwrap();

        // 1. The shop announces the order.
        let order = Order {
            sku: "widget".to_string(),
            count: 4,
        };
        emit(&shop, &ShopEvents::Placed(order.clone())).await.unwrap();
        let delivery = timeout(Duration::from_secs(1), audit_events.recv())
            .await
            .expect("timed out")
            .expect("delivery");
        assert_eq!(delivery.event, ShopEvents::Placed(order.clone()));

        // 2. The shop prices it through billing.
        let invoice = query(
            &shop,
            "billing",
            "price",
            &PriceRequest {
                sku: order.sku.clone(),
                count: order.count,
            },
            &TypedSchema::<Invoice>::new(),
        )
        .await
        .unwrap();
        assert_eq!(invoice, Invoice { total_cents: 1000 });

        // 3. The shop hands the order to fulfilment.
        let outbox = QueueService::new(
            Arc::clone(&shop),
            "fulfilment",
            TypedSchema::<Order>::new(),
        );
        outbox.put(&order, false).await.unwrap();
        let picked = loop {
            match timeout(Duration::from_secs(2), tasks.recv())
                .await
                .expect("timed out")
                .expect("queue gone")
            {
                QueueEvent::Data(task) => break task,
                QueueEvent::Started => continue,
                other => panic!("unexpected queue event: {other:?}"),
            }
        };
        assert_eq!(picked, order);

        // 4. The worker streams shipment progress back.
        let legs = tokio_stream::iter([
            Shipment {
                sku: order.sku.clone(),
                leg: "packed".to_string(),
            },
            Shipment {
                sku: order.sku.clone(),
                leg: "shipped".to_string(),
            },
        ]);
        let run_id = emit_stream(&worker, "shipments", legs).await.unwrap();

        let mut seen_legs = Vec::new();
        loop {
            match timeout(Duration::from_secs(1), shipments.recv())
                .await
                .expect("timed out")
                .expect("listener closed")
            {
                StreamEvent::Data { data, id, .. } => {
                    assert_eq!(id, run_id);
                    seen_legs.push(data.leg);
                }
                StreamEvent::End { id, .. } => {
                    assert_eq!(id, run_id);
                    break;
                }
            }
        }
        assert_eq!(seen_legs, vec!["packed", "shipped"]);
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    #[tokio::test]
    async fn disconnect_then_reconnect_restores_messaging() {
        init_tracing();
        let broker = MemoryBroker::new();
        let shop = connect(&broker, "shop").await;
        let audit = connect(&broker, "audit").await;

        // One side only, so each transition shows up exactly once.
        let mut lifecycle = shop.lifecycle().observe(
            LifecycleFilter::kinds(vec![
                LifecycleKind::Disconnected,
                LifecycleKind::Reconnected,
            ])
            .side(Side::Publisher),
        );

        shop.disconnect().await;
        assert!(!shop.is_open());
        assert!(matches!(
            shop.publisher(),
            Err(TransportError::NotConnected)
        ));
        let event = timeout(Duration::from_secs(1), lifecycle.recv())
            .await
            .expect("timed out")
            .expect("hub closed");
        assert_eq!(event.kind(), LifecycleKind::Disconnected);

        shop.reconnect().await.unwrap();
        assert!(shop.is_open());
        let event = timeout(Duration::from_secs(1), lifecycle.recv())
            .await
            .expect("timed out")
            .expect("hub closed");
        assert_eq!(event.kind(), LifecycleKind::Reconnected);

        // Messaging works again end to end.
        let registry = ServiceRegistry::new();
        let feed = ListeningService::<ShopEvents>::create(&audit, &registry, "shop")
            .await
            .unwrap();
        let mut listener = feed.listen(EventFilter::all());
        emit(
            &shop,
            &ShopEvents::Placed(Order {
                sku: "widget".to_string(),
                count: 1,
            }),
        )
        .await
        .unwrap();
        let delivery = timeout(Duration::from_secs(1), listener.recv())
            .await
            .expect("timed out")
            .expect("delivery");
        assert!(matches!(delivery.event, ShopEvents::Placed(_)));
    }
}
