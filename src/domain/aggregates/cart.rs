//! Cart Aggregate

use serde::{Deserialize, Serialize};
use crate::domain::aggregates::order::{LineItem, LineItems};
use crate::domain::value_objects::{Price, PriceError, Quantity};

/// A cart line as submitted by the storefront, price snapshot included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(alias = "productId")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub price: Price,
    pub quantity: Quantity,
    #[serde(default)]
    pub image: Option<String>,
}

impl CartItem {
    pub fn line_total(&self) -> Result<Price, PriceError> { self.price.times(self.quantity) }
}

#[derive(Clone, Debug)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new(items: Vec<CartItem>) -> Result<Self, CartError> {
        if items.is_empty() { return Err(CartError::Empty); }
        let mut cart = Self { items: Vec::with_capacity(items.len()) };
        for item in items {
            if item.id.trim().is_empty() { return Err(CartError::MissingProductId); }
            cart.add_item(item);
        }
        Ok(cart)
    }

    pub fn items(&self) -> &[CartItem] { &self.items }

    pub fn subtotal(&self) -> Result<Price, PriceError> {
        self.items.iter().try_fold(Price::ZERO, |acc, i| acc.plus(i.line_total()?))
    }

    /// Canonical product → quantity lines, merged and ordered by product id.
    pub fn line_items(&self) -> LineItems {
        LineItems::from_lines(self.items.iter().map(|i| LineItem { product_id: i.id.clone(), quantity: i.quantity }))
    }

    fn add_item(&mut self, item: CartItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.id == item.id) {
            existing.quantity = existing.quantity.add(item.quantity);
        } else {
            self.items.push(item);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { Empty, MissingProductId }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::Empty => write!(f, "No items in cart"), Self::MissingProductId => write!(f, "Cart item without product id") }
    }
}
