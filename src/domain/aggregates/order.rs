//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Price, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub date: DateTime<Utc>,
    pub items: LineItems,
    pub total: Price,
    pub method: PaymentMethod,
    pub status: OrderStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { Card, Cash }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { PendingPayment, Paid }

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str { match self { Self::Card => "card", Self::Cash => "cash" } }
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str { match self { Self::PendingPayment => "pending_payment", Self::Paid => "paid" } }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentMethod {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" | "stripe" => Ok(Self::Card),
            "cash" => Ok(Self::Cash),
            other => Err(OrderError::UnknownMethod(other.to_string())),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// One purchased product and its quantity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(alias = "id")]
    pub product_id: String,
    pub quantity: Quantity,
}

/// Canonical item list: one entry per product, ordered by product id.
///
/// Deserializes from either a `{"productId": quantity}` map or a list of
/// line objects; always serializes as the list form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LineItems(Vec<LineItem>);

impl LineItems {
    pub fn from_lines(lines: impl IntoIterator<Item = LineItem>) -> Self {
        let mut merged: BTreeMap<String, Quantity> = BTreeMap::new();
        for line in lines {
            merged.entry(line.product_id)
                .and_modify(|q| *q = q.add(line.quantity))
                .or_insert(line.quantity);
        }
        Self::from_map(merged)
    }

    pub fn from_map(map: BTreeMap<String, Quantity>) -> Self {
        Self(map.into_iter().map(|(product_id, quantity)| LineItem { product_id, quantity }).collect())
    }

    pub fn to_map(&self) -> BTreeMap<String, Quantity> {
        self.0.iter().map(|l| (l.product_id.clone(), l.quantity)).collect()
    }

    pub fn lines(&self) -> &[LineItem] { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
}

impl<'de> Deserialize<'de> for LineItems {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Map(BTreeMap<String, Quantity>),
            List(Vec<LineItem>),
        }
        Ok(match Shape::deserialize(deserializer)? {
            Shape::Map(map) => LineItems::from_map(map),
            Shape::List(lines) => LineItems::from_lines(lines),
        })
    }
}

impl Order {
    /// Card orders are keyed by the provider session and created already paid.
    pub fn card(session_id: impl Into<String>, items: LineItems, total: Price) -> Self {
        Self { id: session_id.into(), date: Utc::now(), items, total, method: PaymentMethod::Card, status: OrderStatus::Paid }
    }

    pub fn cash(items: LineItems, total: Price) -> Self {
        Self {
            id: format!("cash-{}", Uuid::now_v7()), date: Utc::now(), items, total,
            method: PaymentMethod::Cash, status: OrderStatus::PendingPayment,
        }
    }

    /// The only permitted transition: a cash order moving from pending to paid.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<DomainEvent, OrderError> {
        match (self.method, self.status, next) {
            (PaymentMethod::Cash, OrderStatus::PendingPayment, OrderStatus::Paid) => {
                self.status = OrderStatus::Paid;
                Ok(DomainEvent::Order(OrderEvent::Paid { order_id: self.id.clone() }))
            }
            (_, from, to) => Err(OrderError::ForbiddenTransition { from, to }),
        }
    }

    pub fn placed_event(&self) -> DomainEvent {
        DomainEvent::Order(OrderEvent::Placed {
            order_id: self.id.clone(), method: self.method, total: self.total.amount(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    UnknownStatus(String),
    UnknownMethod(String),
    ForbiddenTransition { from: OrderStatus, to: OrderStatus },
}
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStatus(s) => write!(f, "Unknown order status '{s}'"),
            Self::UnknownMethod(s) => write!(f, "Unknown payment method '{s}'"),
            Self::ForbiddenTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
        }
    }
}
