//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::value_objects::{Price, Quantity};

/// Language code → translated text.
pub type Translations = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub name_i18n: Translations,
    #[serde(default)]
    pub description_i18n: Translations,
    pub price: Price,
    pub stock: i32,
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool { true }

/// Outcome of a clamped stock decrement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decrement {
    pub applied: u32,
    pub shortfall: u32,
}

impl Product {
    pub fn create(name: impl Into<String>, price: Price, stock: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(), name: name.into(), description: String::new(),
            name_i18n: Translations::new(), description_i18n: Translations::new(),
            price, stock: stock.max(0), image: String::new(), is_active: true,
            created_at: now, updated_at: now,
        }
    }

    pub fn can_supply(&self, qty: Quantity) -> bool { i64::from(self.stock) >= i64::from(qty.value()) }

    /// Floors stock read from outside files at zero. Returns the dropped deficit.
    pub fn clamp_stock(&mut self) -> Option<i32> {
        (self.stock < 0).then(|| std::mem::replace(&mut self.stock, 0))
    }

    /// Strict decrement used by cash settlement.
    pub fn remove_stock(&mut self, qty: Quantity) -> Result<(), ProductError> {
        if !self.can_supply(qty) { return Err(ProductError::InsufficientStock); }
        self.stock -= qty.value() as i32;
        self.touch();
        Ok(())
    }

    /// Decrement floored at zero, reporting what could not be covered.
    pub fn remove_stock_clamped(&mut self, qty: Quantity) -> Decrement {
        let wanted = i64::from(qty.value());
        let have = i64::from(self.stock.max(0));
        let applied = wanted.min(have);
        self.stock = (have - applied) as i32;
        self.touch();
        Decrement { applied: applied as u32, shortfall: (wanted - applied) as u32 }
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { InsufficientStock }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Insufficient stock") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn widget(stock: i32) -> Product { Product::create("Widget", Price::new(dec!(10)).unwrap(), stock) }

    #[test]
    fn test_strict_decrement() {
        let mut p = widget(3);
        p.remove_stock(Quantity::new(2).unwrap()).unwrap();
        assert_eq!(p.stock, 1);
        assert_eq!(p.remove_stock(Quantity::new(2).unwrap()), Err(ProductError::InsufficientStock));
        assert_eq!(p.stock, 1);
    }

    #[test]
    fn test_clamped_decrement_never_negative() {
        let mut p = widget(1);
        let d = p.remove_stock_clamped(Quantity::new(4).unwrap());
        assert_eq!(d, Decrement { applied: 1, shortfall: 3 });
        assert_eq!(p.stock, 0);
    }

    #[test]
    fn test_clamp_stock_floors_negative_values() {
        let mut p = widget(3);
        assert_eq!(p.clamp_stock(), None);
        p.stock = -5;
        assert_eq!(p.clamp_stock(), Some(-5));
        assert_eq!(p.stock, 0);
    }

    #[test]
    fn test_deserialize_defaults() {
        let p: Product = serde_json::from_str(r#"{"id":"p1","name":"Jam","price":4.5,"stock":2}"#).unwrap();
        assert!(p.is_active);
        assert!(p.image.is_empty());
        assert_eq!(p.price.amount(), dec!(4.5));
    }
}
