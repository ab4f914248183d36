//! Domain events
use crate::domain::aggregates::PaymentMethod;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    StockDecremented { product_id: String, quantity: u32, remaining: i32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, method: PaymentMethod, total: Decimal },
    Paid { order_id: String },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::StockDecremented { .. }) => "shop.product.stock_decremented",
            Self::Order(OrderEvent::Placed { .. }) => "shop.order.placed",
            Self::Order(OrderEvent::Paid { .. }) => "shop.order.paid",
        }
    }
}
