//! Example commands, queries, and events the demo dispatches through the
//! runtime, plus their handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{Command, CourierError, Event, Query, ValidationResult, Validator};
use courier_dispatch::{CommandHandler, EventHandler, QueryHandler};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateOrder {
    pub id: String,
    pub amount: f64,
}

impl Command for CreateOrder {
    type Response = String;

    fn type_name() -> &'static str {
        "CreateOrder"
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GetOrderStatus {
    pub id: String,
}

impl Query for GetOrderStatus {
    type Response = String;

    fn type_name() -> &'static str {
        "GetOrderStatus"
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrderCreated {
    pub id: String,
}

impl Event for OrderCreated {
    fn type_name() -> &'static str {
        "OrderCreated"
    }
}

/// Rejects orders with a non-positive amount or an empty id, the validation
/// decorator's one concrete example in this demo.
pub struct CreateOrderValidator;

#[async_trait]
impl Validator<CreateOrder> for CreateOrderValidator {
    async fn validate(&self, command: &CreateOrder, _cancel: &CancellationToken) -> ValidationResult {
        let mut errors = Vec::new();
        if command.id.is_empty() {
            errors.push("id must not be empty".to_string());
        }
        if command.amount <= 0.0 {
            errors.push("amount must be positive".to_string());
        }
        if errors.is_empty() {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(errors)
        }
    }
}

/// An in-memory order book the command/query handlers below share, standing
/// in for the real persistence a production order service would use.
#[derive(Default)]
pub struct OrderBook {
    statuses: DashMap<String, String>,
    orders_created: AtomicU64,
}

impl OrderBook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn orders_created(&self) -> u64 {
        self.orders_created.load(Ordering::Relaxed)
    }
}

pub struct CreateOrderHandler {
    pub book: Arc<OrderBook>,
}

#[async_trait]
impl CommandHandler<CreateOrder> for CreateOrderHandler {
    async fn handle(&self, command: CreateOrder, _cancel: &CancellationToken) -> Result<String, CourierError> {
        self.book.statuses.insert(command.id.clone(), "created".to_string());
        self.book.orders_created.fetch_add(1, Ordering::Relaxed);
        Ok(format!("order {} accepted", command.id))
    }
}

pub struct GetOrderStatusHandler {
    pub book: Arc<OrderBook>,
}

#[async_trait]
impl QueryHandler<GetOrderStatus> for GetOrderStatusHandler {
    async fn handle(&self, query: GetOrderStatus, _cancel: &CancellationToken) -> Result<String, CourierError> {
        self.book
            .statuses
            .get(&query.id)
            .map(|status| status.clone())
            .ok_or_else(|| CourierError::HandlerError(format!("no such order: {}", query.id)))
    }
}

/// Logs receipt of the event. A second handler (`NotifyWarehouseHandler`)
/// below is registered alongside this one purely to exercise the event bus'
/// fan-out to more than one handler per event type.
pub struct LogOrderCreatedHandler;

#[async_trait]
impl EventHandler<OrderCreated> for LogOrderCreatedHandler {
    async fn handle(&self, event: OrderCreated, _cancel: &CancellationToken) -> Result<(), CourierError> {
        tracing::info!(order_id = %event.id, "order created event observed by audit log handler");
        Ok(())
    }
}

/// Checks an external service's health over HTTP before acknowledging the
/// event, the ambient stack's example of an HTTP-mediated handler. The
/// target URL is configurable so the demo doesn't depend on network access
/// by default.
pub struct NotifyWarehouseHandler {
    pub client: reqwest::Client,
    pub health_check_url: Option<String>,
}

#[async_trait]
impl EventHandler<OrderCreated> for NotifyWarehouseHandler {
    async fn handle(&self, event: OrderCreated, _cancel: &CancellationToken) -> Result<(), CourierError> {
        let Some(url) = &self.health_check_url else {
            tracing::debug!(order_id = %event.id, "no warehouse endpoint configured, skipping notification");
            return Ok(());
        };

        match self.client.get(url).send().await {
            Ok(response) => {
                tracing::info!(order_id = %event.id, status = %response.status(), "notified warehouse");
                Ok(())
            }
            Err(err) => Err(CourierError::TransientError(format!("warehouse notification Timeout: {err}"))),
        }
    }
}
