use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::aggregates::{Cart, CartItem};
use crate::payments::{NewCheckoutSession, PaymentGateway, SessionLine, ITEMS_METADATA_KEY};
use crate::services::settings::SettingsService;
use crate::{Result, ShopError};

/// Where to send the shopper once the provider session exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub url: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    settings: SettingsService,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl CheckoutService {
    pub fn new(settings: SettingsService, gateway: Arc<dyn PaymentGateway>, currency: impl Into<String>) -> Self {
        Self { settings, gateway, currency: currency.into() }
    }

    /// Creates a hosted checkout session. Stock is untouched until the
    /// session is confirmed through settlement.
    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn start(&self, items: Vec<CartItem>, origin: &str) -> Result<CheckoutRedirect> {
        let cart = Cart::new(items).map_err(|e| ShopError::Validation(e.to_string()))?;
        let subtotal = cart.subtotal().map_err(|e| ShopError::Validation(format!("Cart total: {e}")))?;
        let request = self.session_request(&cart, origin)?;

        let settings = self.settings.effective().await?;
        let secret_key = settings.secret_key()?;
        let session = self.gateway.create_checkout_session(secret_key, &request).await?;
        let url = session.url.ok_or_else(|| ShopError::PaymentProvider("session has no redirect url".to_string()))?;

        info!(session_id = %session.id, provider = self.gateway.name(), %subtotal, "checkout session created");
        Ok(CheckoutRedirect { session_id: session.id, url })
    }

    fn session_request(&self, cart: &Cart, origin: &str) -> Result<NewCheckoutSession> {
        let origin = origin.trim_end_matches('/');
        let lines = cart.items().iter()
            .map(|item| {
                let unit_amount = item.price.to_minor_units().map_err(|e| ShopError::Validation(format!("{}: {e}", item.id)))?;
                Ok(SessionLine {
                    name: if item.name.trim().is_empty() { item.id.clone() } else { item.name.clone() },
                    unit_amount,
                    quantity: item.quantity.value(),
                    image: item.image.as_deref().and_then(|image| absolute_image_url(origin, image)),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let merged = cart.line_items();
        let quantities: BTreeMap<&str, u32> = merged.lines().iter()
            .map(|l| (l.product_id.as_str(), l.quantity.value()))
            .collect();
        let encoded = serde_json::to_string(&quantities).map_err(|e| ShopError::Validation(e.to_string()))?;
        if encoded.len() > 500 {
            return Err(ShopError::Validation("Too many distinct items for one checkout".to_string()));
        }

        Ok(NewCheckoutSession {
            currency: self.currency.clone(),
            lines,
            metadata: BTreeMap::from([(ITEMS_METADATA_KEY.to_string(), encoded)]),
            success_url: format!("{origin}/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{origin}/"),
        })
    }
}

/// The provider only accepts absolute image URLs.
fn absolute_image_url(origin: &str, image: &str) -> Option<String> {
    let image = image.trim();
    if image.is_empty() {
        None
    } else if image.starts_with("http://") || image.starts_with("https://") {
        Some(image.to_string())
    } else {
        Some(format!("{origin}/{}", image.trim_start_matches('/')))
    }
}
