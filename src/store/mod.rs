//! Persistence for products, orders and the settings singleton.
//!
//! Two backends implement [`Store`]: PostgreSQL through `sqlx`, and a
//! flat-file JSON store for single-process deployments. Settlement never
//! touches stock or orders outside a [`StoreTx`]; a transaction dropped
//! without [`StoreTx::commit`] leaves no trace.

pub mod file;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::aggregates::{Order, OrderStatus, Product};
use crate::settings::StoredSettings;

pub use file::FileStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Record {0} not found")]
    NotFound(String),

    #[error("Duplicate key {0}")]
    Duplicate(String),

    #[error("Store is read-only")]
    ReadOnly,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a transaction scoped to a single settlement or admin mutation.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError>;
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;
    /// Last write wins against concurrent settlements.
    async fn update_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn delete_product(&self, id: &str) -> Result<bool, StoreError>;

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;

    async fn load_settings(&self) -> Result<Option<StoredSettings>, StoreError>;
    async fn save_settings(&self, settings: &StoredSettings) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Reads a product and holds it exclusively until the transaction ends.
    async fn lock_product(&mut self, id: &str) -> Result<Option<Product>, StoreError>;
    async fn set_stock(&mut self, id: &str, stock: i32) -> Result<(), StoreError>;

    /// Reads an order, serializing against any other transaction that asks
    /// for the same id, whether or not the order exists yet.
    async fn lock_order(&mut self, id: &str) -> Result<Option<Order>, StoreError>;
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;
    async fn set_order_status(&mut self, id: &str, status: OrderStatus) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Newest products first, the admin listing order.
pub(crate) fn newest_first(products: &mut [Product]) {
    products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
