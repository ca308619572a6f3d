//! Wires the Courier crates together and exercises command, query, event,
//! outbox, and inbox flows end to end, mirroring how `bin/fc-dev` bundles a
//! whole FlowCatalyst deployment into one runnable process.

mod domain;
mod wiring;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use courier_common::{Clock, CorrelationContext, SystemClock};
use courier_dispatch::{CommandProcessor, DashMapRegistry, EventBus, QueryProcessor};
use courier_inbox::{InboxOptions, InboxProcessor, InboxProcessorConfig, InMemoryInboxStorage};
use courier_outbox::{InMemoryOutboxStorage, OutboxOptions, OutboxProcessor, OutboxProcessorConfig};
use courier_pipeline::ExponentialBackoff;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;

use domain::{
    CreateOrder, CreateOrderHandler, CreateOrderValidator, GetOrderStatus, GetOrderStatusHandler, LogOrderCreatedHandler,
    NotifyWarehouseHandler, OrderBook, OrderCreated,
};
use wiring::{CommandOutboxDispatcher, EventInboxDispatcher};

#[derive(Clone)]
struct AppState {
    prometheus: Arc<metrics_exporter_prometheus::PrometheusHandle>,
}

async fn health() -> impl IntoResponse {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    state.prometheus.render()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courier_common::logging::init_logging("courier-demo");

    let prometheus = PrometheusBuilder::new().install_recorder().expect("prometheus recorder installs once at startup");
    let prometheus = Arc::new(prometheus);

    let registry = Arc::new(DashMapRegistry::new());
    let book = OrderBook::new();

    registry.register_command::<CreateOrder>(Arc::new(CreateOrderHandler { book: book.clone() }));
    registry.register_query::<GetOrderStatus>(Arc::new(GetOrderStatusHandler { book: book.clone() }));
    registry.register_event::<OrderCreated>(Arc::new(LogOrderCreatedHandler));
    registry.register_event::<OrderCreated>(Arc::new(NotifyWarehouseHandler {
        client: reqwest::Client::new(),
        health_check_url: std::env::var("WAREHOUSE_HEALTH_URL").ok(),
    }));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let validator: Arc<dyn courier_common::Validator<CreateOrder>> = Arc::new(CreateOrderValidator);
    let retry_policy: Arc<dyn courier_pipeline::RetryPolicy> = Arc::new(ExponentialBackoff::default_policy());

    let create_order = Arc::new(CommandProcessor::<CreateOrder, DashMapRegistry>::with_pipeline(
        registry.clone(),
        move |builder| builder.use_validation(validator.clone()).use_correlation().use_retry(retry_policy.clone(), clock.clone()),
    ));
    let get_order_status = Arc::new(QueryProcessor::<GetOrderStatus, DashMapRegistry>::new(registry.clone()));
    let event_bus = Arc::new(EventBus::new(registry.clone()));

    let cancel = CancellationToken::new();

    let outbox_storage = Arc::new(InMemoryOutboxStorage::new());
    let outbox_dispatcher = Arc::new(CommandOutboxDispatcher { create_order: create_order.clone() });
    let outbox = Arc::new(OutboxProcessor::new(outbox_storage, outbox_dispatcher, OutboxProcessorConfig::default()));
    outbox.start(cancel.clone());

    let inbox_storage = Arc::new(InMemoryInboxStorage::new());
    let inbox_dispatcher = Arc::new(EventInboxDispatcher { event_bus: event_bus.clone() });
    let inbox = Arc::new(InboxProcessor::new(inbox_storage, inbox_dispatcher, InboxProcessorConfig::default()));
    inbox.start(cancel.clone());

    let demo_correlation = CorrelationContext { correlation_id: uuid::Uuid::new_v4().to_string(), message_id: uuid::Uuid::new_v4().to_string() };
    courier_common::correlation::scope(demo_correlation, || async {
        tracing::info!("publishing CreateOrder ORD-001 through the outbox");
        outbox
            .publish_to_outbox(
                "CreateOrder",
                &CreateOrder { id: "ORD-001".to_string(), amount: 99.99 },
                Some(OutboxOptions::new(9, 3).with_destination("orders.created")),
            )
            .await
            .expect("outbox publish should succeed");

        tokio::time::sleep(Duration::from_millis(200)).await;

        match get_order_status.send(Some(GetOrderStatus { id: "ORD-001".to_string() }), &cancel).await {
            Ok(status) => tracing::info!(status = %status, "queried order status"),
            Err(err) => tracing::warn!(error = %err, "order not yet visible to query processor"),
        }

        tracing::info!("accepting OrderCreated ORD-001 through the inbox");
        inbox
            .process_incoming("evt-ORD-001", "OrderCreated", &OrderCreated { id: "ORD-001".to_string() }, Some(InboxOptions::default()))
            .await
            .expect("inbox acceptance should succeed");
    })
    .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    tracing::info!(
        orders_created = book.orders_created(),
        command_processed = create_order.processed_count(),
        events_published = event_bus.published_count(),
        outbox_processed = outbox.processed_messages(),
        inbox_processed = inbox.processed_messages(),
        "seed scenario complete"
    );

    let state = AppState { prometheus: prometheus.clone() };
    let app = Router::new().route("/health", get(health)).route("/metrics", get(metrics_endpoint)).with_state(state);

    let addr: SocketAddr = std::env::var("COURIER_DEMO_ADDR").ok().and_then(|s| s.parse().ok()).unwrap_or_else(|| ([127, 0, 0, 1], 8089).into());
    tracing::info!(%addr, "serving health and metrics endpoints");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve = axum::serve(listener, app);

    tokio::select! {
        result = serve => result.map_err(anyhow::Error::from)?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    cancel.cancel();
    outbox.stop().await;
    inbox.stop().await;

    Ok(())
}
