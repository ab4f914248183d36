//! Order settlement: verified payment intent → exactly one stock decrement
//! and exactly one order record.
//!
//! Card settlement replays safely: the order id is the provider session id
//! and is checked under a lock before anything is written. Cash settlement
//! validates every line before touching stock. Both run inside one store
//! transaction, so an error at any step leaves stock and orders untouched.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::broker::EventBroker;
use crate::domain::aggregates::{Cart, CartItem, LineItems, Order, Product};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::{Price, Quantity};
use crate::payments::{PaymentGateway, ITEMS_METADATA_KEY};
use crate::services::settings::SettingsService;
use crate::store::{Store, StoreError};
use crate::{Result, ShopError};

#[derive(Clone, Debug, PartialEq)]
pub enum CardSettlement {
    /// Stock decremented and the paid order recorded.
    Settled(Order),
    /// An earlier confirmation already recorded this session.
    AlreadySettled(String),
    /// The session carried no purchasable items.
    NothingToFulfil,
}

impl CardSettlement {
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::Settled(order) => Some(&order.id),
            Self::AlreadySettled(id) => Some(id),
            Self::NothingToFulfil => None,
        }
    }
}

#[derive(Clone)]
pub struct SettlementService {
    store: Arc<dyn Store>,
    settings: SettingsService,
    gateway: Arc<dyn PaymentGateway>,
    broker: EventBroker,
}

impl SettlementService {
    pub fn new(store: Arc<dyn Store>, settings: SettingsService, gateway: Arc<dyn PaymentGateway>, broker: EventBroker) -> Self {
        Self { store, settings, gateway, broker }
    }

    #[instrument(skip(self))]
    pub async fn settle_card(&self, session_id: &str) -> Result<CardSettlement> {
        validate_session_id(session_id)?;
        let settings = self.settings.effective().await?;
        let secret_key = settings.secret_key()?;

        let session = self.gateway.retrieve_checkout_session(secret_key, session_id).await?;
        if !session.is_paid() {
            info!(payment_status = %session.payment_status, "session not paid");
            return Err(ShopError::PaymentNotCompleted);
        }
        let Some(raw_items) = session.metadata.get(ITEMS_METADATA_KEY) else {
            return Ok(CardSettlement::NothingToFulfil);
        };
        let items: LineItems = serde_json::from_str(raw_items)
            .map_err(|e| ShopError::Validation(format!("Malformed session items: {e}")))?;
        if items.is_empty() {
            return Ok(CardSettlement::NothingToFulfil);
        }
        let total = Price::from_minor_units(session.amount_total.unwrap_or(0))
            .map_err(|e| ShopError::PaymentProvider(format!("session amount: {e}")))?;

        let mut tx = self.store.begin().await?;
        if tx.lock_order(&session.id).await?.is_some() {
            info!(order_id = %session.id, "session already settled");
            return Ok(CardSettlement::AlreadySettled(session.id));
        }

        let mut events = Vec::with_capacity(items.len() + 1);
        for line in items.lines() {
            let Some(mut product) = tx.lock_product(&line.product_id).await? else {
                warn!(product_id = %line.product_id, "paid item no longer in catalog, skipping");
                continue;
            };
            let decrement = product.remove_stock_clamped(line.quantity);
            if decrement.shortfall > 0 {
                warn!(product_id = %product.id, shortfall = decrement.shortfall, "card payment oversold stock");
            }
            tx.set_stock(&product.id, product.stock).await?;
            events.push(stock_event(&product, decrement.applied));
        }

        let order = Order::card(session.id, items, total);
        match tx.insert_order(&order).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => return Ok(CardSettlement::AlreadySettled(order.id)),
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        info!(order_id = %order.id, total = %order.total, "card order settled");
        events.insert(0, order.placed_event());
        self.broker.publish(&events).await;
        Ok(CardSettlement::Settled(order))
    }

    /// `client_total`, when given, must match the catalog price of the cart.
    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn settle_cash(&self, items: Vec<CartItem>, client_total: Option<Price>) -> Result<Order> {
        let cart = Cart::new(items).map_err(|e| ShopError::Validation(e.to_string()))?;
        let lines = cart.line_items();

        let mut tx = self.store.begin().await?;
        let mut reserved: Vec<(Product, Quantity)> = Vec::with_capacity(lines.len());
        for line in lines.lines() {
            let product = tx.lock_product(&line.product_id).await?
                .ok_or_else(|| ShopError::ProductNotFound(line.product_id.clone()))?;
            if !product.can_supply(line.quantity) {
                info!(product_id = %product.id, stock = product.stock, requested = line.quantity.value(), "insufficient stock");
                return Err(ShopError::InsufficientStock { product: product.id });
            }
            reserved.push((product, line.quantity));
        }

        let total = reserved.iter()
            .try_fold(Price::ZERO, |acc, (p, q)| acc.plus(p.price.times(*q)?))
            .map_err(|e| ShopError::Validation(format!("Order total: {e}")))?;
        if let Some(client_total) = client_total {
            if client_total.differs_from(total) {
                return Err(ShopError::Validation(format!("Order total {client_total} does not match current prices ({total})")));
            }
        }

        let mut events = Vec::with_capacity(reserved.len() + 1);
        for (product, qty) in &mut reserved {
            product.remove_stock(*qty).map_err(|_| ShopError::InsufficientStock { product: product.id.clone() })?;
            tx.set_stock(&product.id, product.stock).await?;
            events.push(stock_event(product, qty.value()));
        }

        let order = Order::cash(lines, total);
        tx.insert_order(&order).await?;
        tx.commit().await?;

        info!(order_id = %order.id, total = %order.total, "cash order recorded");
        events.insert(0, order.placed_event());
        self.broker.publish(&events).await;
        Ok(order)
    }
}

fn stock_event(product: &Product, applied: u32) -> DomainEvent {
    DomainEvent::Product(ProductEvent::StockDecremented {
        product_id: product.id.clone(), quantity: applied, remaining: product.stock,
    })
}

/// Session ids are interpolated into the provider URL.
fn validate_session_id(id: &str) -> Result<()> {
    let ok = !id.is_empty() && id.len() <= 255 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok { Ok(()) } else { Err(ShopError::Validation("Invalid session id".to_string())) }
}
