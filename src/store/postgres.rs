//! PostgreSQL store.
//!
//! Stock rows are locked with `SELECT … FOR UPDATE`; the order idempotency
//! guard takes a transaction-scoped advisory lock on the order id, so it also
//! serializes callers racing to create an order that does not exist yet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};

use super::{Store, StoreError, StoreTx};
use crate::domain::aggregates::{LineItems, Order, OrderStatus, PaymentMethod, Product, Translations};
use crate::domain::value_objects::Price;
use crate::settings::{Mode, StoredSettings, SETTINGS_ID};

const UNIQUE_VIOLATION: &str = "23505";
const READ_ONLY_SQL_TRANSACTION: &str = "25006";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    description: String,
    name_i18n: Json<Translations>,
    description_i18n: Json<Translations>,
    price: Decimal,
    stock: i32,
    image: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        let price = Price::new(r.price).map_err(|e| StoreError::Corrupt(format!("product {}: {e}", r.id)))?;
        Ok(Product {
            id: r.id, name: r.name, description: r.description,
            name_i18n: r.name_i18n.0, description_i18n: r.description_i18n.0,
            price, stock: r.stock, image: r.image, is_active: r.is_active,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    created_at: DateTime<Utc>,
    items: Json<LineItems>,
    total: Decimal,
    method: String,
    status: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |what: String| StoreError::Corrupt(format!("order {}: {what}", r.id));
        let total = Price::new(r.total).map_err(|e| corrupt(e.to_string()))?;
        let method: PaymentMethod = r.method.parse().map_err(|e: crate::domain::aggregates::OrderError| corrupt(e.to_string()))?;
        let status: OrderStatus = r.status.parse().map_err(|e: crate::domain::aggregates::OrderError| corrupt(e.to_string()))?;
        Ok(Order { id: r.id, date: r.created_at, items: r.items.0, total, method, status })
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    mode: String,
    test_pk: Option<String>,
    test_sk: Option<String>,
    prod_pk: Option<String>,
    prod_sk: Option<String>,
    admin_password: String,
    contact_handle: Option<String>,
}

impl From<SettingsRow> for StoredSettings {
    fn from(r: SettingsRow) -> Self {
        let mode = r.mode.parse::<Mode>().unwrap_or_else(|_| {
            warn!(mode = %r.mode, "unknown stored mode, using test");
            Mode::Test
        });
        StoredSettings {
            mode, test_pk: r.test_pk, test_sk: r.test_sk, prod_pk: r.prod_pk, prod_sk: r.prod_sk,
            admin_password: r.admin_password, contact_handle: r.contact_handle,
        }
    }
}

fn map_db(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        match db.code().as_deref() {
            Some(READ_ONLY_SQL_TRANSACTION) => return StoreError::ReadOnly,
            Some(UNIQUE_VIOLATION) => return StoreError::Duplicate(db.constraint().unwrap_or("primary key").to_string()),
            _ => {}
        }
    }
    StoreError::Database(e)
}

const PRODUCT_COLUMNS: &str =
    "id, name, description, name_i18n, description_i18n, price, stock, image, is_active, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, created_at, items, total, method, status";

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(map_db)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id"))
            .fetch_all(&self.pool).await.map_err(map_db)?
            .into_iter().map(Product::try_from).collect()
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await.map_err(map_db)?
            .map(Product::try_from).transpose()
    }

    async fn insert_product(&self, p: &Product) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO products (id, name, description, name_i18n, description_i18n, price, stock, image, is_active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
            .bind(&p.id).bind(&p.name).bind(&p.description).bind(Json(&p.name_i18n)).bind(Json(&p.description_i18n))
            .bind(p.price.amount()).bind(p.stock).bind(&p.image).bind(p.is_active).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await.map_err(map_db)?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE products SET name = $2, description = $3, name_i18n = $4, description_i18n = $5, price = $6, stock = $7, image = $8, is_active = $9, updated_at = $10 WHERE id = $1")
            .bind(&p.id).bind(&p.name).bind(&p.description).bind(Json(&p.name_i18n)).bind(Json(&p.description_i18n))
            .bind(p.price.amount()).bind(p.stock).bind(&p.image).bind(p.is_active).bind(p.updated_at)
            .execute(&self.pool).await.map_err(map_db)?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(p.id.clone())); }
        Ok(())
    }

    async fn delete_product(&self, id: &str) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await.map_err(map_db)?;
        Ok(done.rows_affected() > 0)
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"))
            .fetch_all(&self.pool).await.map_err(map_db)?
            .into_iter().map(Order::try_from).collect()
    }

    async fn load_settings(&self) -> Result<Option<StoredSettings>, StoreError> {
        let row = sqlx::query_as::<_, SettingsRow>("SELECT mode, test_pk, test_sk, prod_pk, prod_sk, admin_password, contact_handle FROM settings WHERE id = $1")
            .bind(SETTINGS_ID).fetch_optional(&self.pool).await.map_err(map_db)?;
        Ok(row.map(StoredSettings::from))
    }

    async fn save_settings(&self, s: &StoredSettings) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO settings (id, mode, test_pk, test_sk, prod_pk, prod_sk, admin_password, contact_handle) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                     ON CONFLICT (id) DO UPDATE SET mode = EXCLUDED.mode, test_pk = EXCLUDED.test_pk, test_sk = EXCLUDED.test_sk, prod_pk = EXCLUDED.prod_pk, \
                     prod_sk = EXCLUDED.prod_sk, admin_password = EXCLUDED.admin_password, contact_handle = EXCLUDED.contact_handle")
            .bind(SETTINGS_ID).bind(s.mode.as_str()).bind(&s.test_pk).bind(&s.test_sk).bind(&s.prod_pk).bind(&s.prod_sk)
            .bind(&s.admin_password).bind(&s.contact_handle)
            .execute(&self.pool).await.map_err(map_db)?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_product(&mut self, id: &str) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"))
            .bind(id).fetch_optional(&mut *self.tx).await.map_err(map_db)?
            .map(Product::try_from).transpose()
    }

    async fn set_stock(&mut self, id: &str, stock: i32) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(id).bind(stock).execute(&mut *self.tx).await.map_err(map_db)?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(id.to_string())); }
        Ok(())
    }

    async fn lock_order(&mut self, id: &str) -> Result<Option<Order>, StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(id).execute(&mut *self.tx).await.map_err(map_db)?;
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(id).fetch_optional(&mut *self.tx).await.map_err(map_db)?
            .map(Order::try_from).transpose()
    }

    async fn insert_order(&mut self, o: &Order) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO orders (id, created_at, items, total, method, status) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(&o.id).bind(o.date).bind(Json(&o.items)).bind(o.total.amount())
            .bind(o.method.as_str()).bind(o.status.as_str())
            .execute(&mut *self.tx).await.map_err(map_db)?;
        Ok(())
    }

    async fn set_order_status(&mut self, id: &str, status: OrderStatus) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id).bind(status.as_str()).execute(&mut *self.tx).await.map_err(map_db)?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(id.to_string())); }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_db)
    }
}

/// These run against a live database and return early when `DATABASE_URL` is unset.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Quantity;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    async fn test_store() -> Option<PgStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = PgStore::connect(&url, 5).await.unwrap();
        store.migrate().await.unwrap();
        Some(store)
    }

    fn product(stock: i32) -> Product {
        Product::create("Pg test", Price::new(Decimal::ONE).unwrap(), stock)
    }

    #[tokio::test]
    async fn test_duplicate_keys_map_to_duplicate() {
        let Some(store) = test_store().await else { return };
        let p = product(3);
        store.insert_product(&p).await.unwrap();
        assert!(matches!(store.insert_product(&p).await, Err(StoreError::Duplicate(_))));

        let items = LineItems::from_map(BTreeMap::from([(p.id.clone(), Quantity::new(1).unwrap())]));
        let order = Order::card(format!("cs_pg_{}", Uuid::now_v7().simple()), items, Price::new(Decimal::ONE).unwrap());
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.insert_order(&order).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_read_only_transaction_maps_to_read_only() {
        let Some(store) = test_store().await else { return };
        let mut tx = store.pool.begin().await.unwrap();
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await.unwrap();
        let err = sqlx::query("DELETE FROM products WHERE id = $1").bind("absent").execute(&mut *tx).await.unwrap_err();
        assert!(matches!(map_db(err), StoreError::ReadOnly));
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_leaves_no_trace() {
        let Some(store) = test_store().await else { return };
        let p = product(4);
        store.insert_product(&p).await.unwrap();
        {
            let mut tx = store.begin().await.unwrap();
            assert_eq!(tx.lock_product(&p.id).await.unwrap().unwrap().stock, 4);
            tx.set_stock(&p.id, 0).await.unwrap();
        }
        assert_eq!(store.get_product(&p.id).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_order_lock_serializes_before_the_row_exists() {
        let Some(store) = test_store().await else { return };
        let id = format!("cs_pg_{}", Uuid::now_v7().simple());
        let mut first = store.begin().await.unwrap();
        assert!(first.lock_order(&id).await.unwrap().is_none());

        let waiter = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                second.lock_order(&id).await.unwrap().map(|o| o.id)
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        first.insert_order(&Order::card(id.clone(), LineItems::default(), Price::ZERO)).await.unwrap();
        first.commit().await.unwrap();
        assert_eq!(waiter.await.unwrap(), Some(id));
    }
}
