//! Stripe Checkout over the REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{CheckoutSession, GatewayError, NewCheckoutSession, PaymentGateway};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    api_base: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    // Every provider call is bounded by `timeout`; a timeout surfaces as GatewayError::Http.
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        Ok(Self { http, api_base: api_base.into().trim_end_matches('/').to_string() })
    }

    async fn parse(resp: reqwest::Response) -> Result<CheckoutSession, GatewayError> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| GatewayError::Http(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(body);
            return Err(GatewayError::Rejected { status: status.as_u16(), message });
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

/// Stripe's bracketed form encoding for a checkout session.
pub fn session_form(request: &NewCheckoutSession) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    for (i, line) in request.lines.iter().enumerate() {
        let p = format!("line_items[{i}]");
        form.push((format!("{p}[price_data][currency]"), request.currency.clone()));
        form.push((format!("{p}[price_data][product_data][name]"), line.name.clone()));
        if let Some(image) = &line.image {
            form.push((format!("{p}[price_data][product_data][images][0]"), image.clone()));
        }
        form.push((format!("{p}[price_data][unit_amount]"), line.unit_amount.to_string()));
        form.push((format!("{p}[quantity]"), line.quantity.to_string()));
    }
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str { "stripe" }

    #[instrument(skip_all, fields(lines = request.lines.len()))]
    async fn create_checkout_session(&self, secret_key: &str, request: &NewCheckoutSession) -> Result<CheckoutSession, GatewayError> {
        let resp = self.http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(secret_key)
            .form(&session_form(request))
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        let session = Self::parse(resp).await?;
        debug!(session_id = %session.id, "checkout session created");
        Ok(session)
    }

    #[instrument(skip(self, secret_key))]
    async fn retrieve_checkout_session(&self, secret_key: &str, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        let resp = self.http
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        Self::parse(resp).await
    }
}
