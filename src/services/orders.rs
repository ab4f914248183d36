use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::broker::EventBroker;
use crate::domain::aggregates::{Order, OrderError, OrderStatus, Product};
use crate::store::Store;
use crate::{Result, ShopError};

/// Admin order listing, with the catalog keyed by id so line items can be
/// shown by name.
#[derive(Debug, Serialize)]
pub struct OrdersOverview {
    pub orders: Vec<Order>,
    pub products: BTreeMap<String, Product>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    broker: EventBroker,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, broker: EventBroker) -> Self { Self { store, broker } }

    pub async fn overview(&self) -> Result<OrdersOverview> {
        let orders = self.store.list_orders().await?;
        let products = self.store.list_products().await?.into_iter().map(|p| (p.id.clone(), p)).collect();
        Ok(OrdersOverview { orders, products })
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: &str, status: &str) -> Result<Order> {
        let next: OrderStatus = status.parse().map_err(|e: OrderError| ShopError::Validation(e.to_string()))?;

        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(id).await?.ok_or_else(|| ShopError::OrderNotFound(id.to_string()))?;
        let event = order.transition_to(next).map_err(|e| match e {
            OrderError::ForbiddenTransition { from, to } => ShopError::InvalidTransition { from: from.to_string(), to: to.to_string() },
            other => ShopError::Validation(other.to_string()),
        })?;
        tx.set_order_status(&order.id, order.status).await?;
        tx.commit().await?;

        info!(status = %order.status, "order status updated");
        self.broker.publish(&[event]).await;
        Ok(order)
    }
}
