//! Boot-time catalog seeding from a JSON product list.

use std::path::Path;
use tracing::{info, instrument, warn};

use crate::domain::aggregates::Product;
use crate::store::{Store, StoreError};

/// Inserts every product from `path` whose id is not yet in the store.
/// Returns how many were inserted.
#[instrument(skip(store), fields(path = %path.display()))]
pub async fn seed_products(store: &dyn Store, path: &Path) -> Result<usize, StoreError> {
    let raw = tokio::fs::read(path).await?;
    let mut products: Vec<Product> = serde_json::from_slice(&raw)?;
    for product in &mut products {
        if let Some(stock) = product.clamp_stock() {
            warn!(product_id = %product.id, stock, "negative stock in seed file, using 0");
        }
    }
    let mut inserted = 0;
    for product in &products {
        if store.get_product(&product.id).await?.is_some() {
            continue;
        }
        match store.insert_product(product).await {
            Ok(()) => inserted += 1,
            Err(StoreError::Duplicate(_)) => {}
            Err(e) => return Err(e),
        }
    }
    info!(inserted, total = products.len(), "seeded products");
    Ok(inserted)
}
