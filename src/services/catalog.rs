use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::domain::aggregates::{Product, Translations};
use crate::domain::value_objects::Price;
use crate::store::{newest_first, Store, StoreError};
use crate::{Result, ShopError};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[serde(default)]
    pub name_i18n: Translations,
    #[serde(default)]
    pub description_i18n: Translations,
    pub price: Price,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[serde(default)]
    pub image: String,
    pub is_active: Option<bool>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub name_i18n: Option<Translations>,
    pub description_i18n: Option<Translations>,
    pub price: Option<Price>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub image: Option<String>,
    pub is_active: Option<bool>,
}

impl ProductInput {
    fn apply(self, product: &mut Product) {
        product.name = self.name.trim().to_string();
        product.description = self.description;
        product.name_i18n = self.name_i18n;
        product.description_i18n = self.description_i18n;
        product.price = self.price;
        product.stock = self.stock;
        product.image = self.image;
        if let Some(active) = self.is_active { product.is_active = active; }
    }
}

impl ProductPatch {
    fn apply(self, product: &mut Product) {
        if let Some(name) = self.name { product.name = name.trim().to_string(); }
        if let Some(description) = self.description { product.description = description; }
        if let Some(i18n) = self.name_i18n { product.name_i18n = i18n; }
        if let Some(i18n) = self.description_i18n { product.description_i18n = i18n; }
        if let Some(price) = self.price { product.price = price; }
        if let Some(stock) = self.stock { product.stock = stock; }
        if let Some(image) = self.image { product.image = image; }
        if let Some(active) = self.is_active { product.is_active = active; }
    }
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Storefront listing: active products, cheapest first.
    pub async fn list_public(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.store.list_products().await?.into_iter().filter(|p| p.is_active).collect();
        products.sort_by(|a, b| a.price.amount().cmp(&b.price.amount()).then_with(|| a.id.cmp(&b.id)));
        Ok(products)
    }

    pub async fn list_all(&self) -> Result<Vec<Product>> {
        let mut products = self.store.list_products().await?;
        newest_first(&mut products);
        Ok(products)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: ProductInput) -> Result<Product> {
        input.validate()?;
        let mut product = Product::create(input.name.clone(), input.price, input.stock);
        input.apply(&mut product);
        self.store.insert_product(&product).await?;
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn replace(&self, id: &str, input: ProductInput) -> Result<Product> {
        input.validate()?;
        let mut product = self.existing(id).await?;
        input.apply(&mut product);
        self.save(product).await
    }

    #[instrument(skip(self, patch))]
    pub async fn patch(&self, id: &str, patch: ProductPatch) -> Result<Product> {
        patch.validate()?;
        let mut product = self.existing(id).await?;
        patch.apply(&mut product);
        self.save(product).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.store.delete_product(id).await? {
            return Err(ShopError::ProductNotFound(id.to_string()));
        }
        info!("product deleted");
        Ok(())
    }

    async fn existing(&self, id: &str) -> Result<Product> {
        self.store.get_product(id).await?.ok_or_else(|| ShopError::ProductNotFound(id.to_string()))
    }

    async fn save(&self, mut product: Product) -> Result<Product> {
        product.updated_at = Utc::now();
        match self.store.update_product(&product).await {
            Ok(()) => Ok(product),
            Err(StoreError::NotFound(id)) => Err(ShopError::ProductNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}
