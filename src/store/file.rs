//! Flat-file JSON store.
//!
//! Products and orders live together in `shop.json` so a settlement commits
//! with a single rename; settings live in `settings.json` so that file alone
//! can be mounted read-only. One async mutex arbitrates every writer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{newest_first, Store, StoreError, StoreTx};
use crate::domain::aggregates::{Order, OrderStatus, Product};
use crate::settings::StoredSettings;

const SHOP_FILE: &str = "shop.json";
const SETTINGS_FILE: &str = "settings.json";
/// Catalog file of older deployments, imported once when `shop.json` is absent.
const LEGACY_PRODUCTS_FILE: &str = "products.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ShopData {
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    orders: Vec<Order>,
}

pub struct FileStore {
    shop_path: PathBuf,
    settings_path: PathBuf,
    data: Arc<Mutex<ShopData>>,
    settings_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await.map_err(classify_io)?;
        let shop_path = dir.join(SHOP_FILE);
        let mut data = match read_json::<ShopData>(&shop_path).await? {
            Some(data) => data,
            None => {
                let products = read_json::<Vec<Product>>(&dir.join(LEGACY_PRODUCTS_FILE)).await?.unwrap_or_default();
                if !products.is_empty() {
                    info!(count = products.len(), "importing legacy products.json");
                }
                ShopData { products, orders: Vec::new() }
            }
        };
        for product in &mut data.products {
            if let Some(stock) = product.clamp_stock() {
                warn!(product_id = %product.id, stock, "negative stock on disk, using 0");
            }
        }
        info!(path = %dir.display(), products = data.products.len(), orders = data.orders.len(), "opened file store");
        Ok(Self {
            shop_path,
            settings_path: dir.join(SETTINGS_FILE),
            data: Arc::new(Mutex::new(data)),
            settings_lock: Mutex::new(()),
        })
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut ShopData) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut guard = self.data.lock().await;
        let mut working = guard.clone();
        let out = f(&mut working)?;
        write_json(&self.shop_path, &working).await?;
        *guard = working;
        Ok(out)
    }
}

#[async_trait]
impl Store for FileStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = Arc::clone(&self.data).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(FileTx { guard, working, path: self.shop_path.clone() }))
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products = self.data.lock().await.products.clone();
        newest_first(&mut products);
        Ok(products)
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.data.lock().await.products.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.mutate(|data| {
            if data.products.iter().any(|p| p.id == product.id) {
                return Err(StoreError::Duplicate(product.id.clone()));
            }
            data.products.push(product.clone());
            Ok(())
        }).await
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        self.mutate(|data| {
            let slot = data.products.iter_mut().find(|p| p.id == product.id)
                .ok_or_else(|| StoreError::NotFound(product.id.clone()))?;
            *slot = product.clone();
            Ok(())
        }).await
    }

    async fn delete_product(&self, id: &str) -> Result<bool, StoreError> {
        self.mutate(|data| {
            let before = data.products.len();
            data.products.retain(|p| p.id != id);
            Ok(data.products.len() != before)
        }).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders = self.data.lock().await.orders.clone();
        orders.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(orders)
    }

    async fn load_settings(&self) -> Result<Option<StoredSettings>, StoreError> {
        read_json(&self.settings_path).await
    }

    async fn save_settings(&self, settings: &StoredSettings) -> Result<(), StoreError> {
        let _guard = self.settings_lock.lock().await;
        write_json(&self.settings_path, settings).await
    }
}

struct FileTx {
    guard: OwnedMutexGuard<ShopData>,
    working: ShopData,
    path: PathBuf,
}

#[async_trait]
impl StoreTx for FileTx {
    async fn lock_product(&mut self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.iter().find(|p| p.id == id).cloned())
    }

    async fn set_stock(&mut self, id: &str, stock: i32) -> Result<(), StoreError> {
        let product = self.working.products.iter_mut().find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        product.stock = stock;
        product.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn lock_order(&mut self, id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.working.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.working.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::Duplicate(order.id.clone()));
        }
        self.working.orders.push(order.clone());
        Ok(())
    }

    async fn set_order_status(&mut self, id: &str, status: OrderStatus) -> Result<(), StoreError> {
        let order = self.working.orders.iter_mut().find(|o| o.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        order.status = status;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let FileTx { mut guard, working, path } = *self;
        write_json(&path, &working).await?;
        *guard = working;
        debug!("file transaction committed");
        Ok(())
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(classify_io(e)),
    }
}

/// Write to a sibling temp file, then rename over the target.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await.map_err(classify_io)?;
    tokio::fs::rename(&tmp, path).await.map_err(classify_io)
}

pub(crate) fn classify_io(e: std::io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => StoreError::ReadOnly,
        _ => StoreError::Io(e),
    }
}
