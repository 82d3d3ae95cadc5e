//! Payment provider checkout sessions

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::PaymentsConfig;
use crate::error::{Error, Result};

/// What the customer is about to pay for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutRequest {
    /// Paid tour
    pub tour_id: String,
    /// Tour name shown on the payment page
    pub tour_name: String,
    /// Tour summary shown on the payment page
    pub description: String,
    /// Price in major currency units
    pub price: f64,
    /// Customer email
    pub customer_email: String,
    /// Redirect after payment
    pub success_url: String,
    /// Redirect after cancellation
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Price in minor units (cents)
    pub fn amount_minor(&self) -> i64 {
        (self.price * 100.0).round() as i64
    }
}

/// A session created by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider session id
    pub id: String,
    /// Hosted payment page
    #[serde(default)]
    pub url: Option<String>,
}

/// Creates checkout sessions
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;
}

/// Stripe-compatible checkout API over HTTPS
pub struct StripeGateway {
    http_client: HttpClient,
    api_url: String,
    secret_key: String,
    currency: String,
}

impl StripeGateway {
    /// Build from configuration
    pub fn new(config: &PaymentsConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("tourbook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            currency: config.currency.clone(),
        })
    }

    fn form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("customer_email", request.customer_email.clone()),
            ("client_reference_id", request.tour_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", self.currency.clone()),
            ("line_items[0][price_data][unit_amount]", request.amount_minor().to_string()),
            ("line_items[0][price_data][product_data][name]", format!("{} Tour", request.tour_name)),
            ("line_items[0][price_data][product_data][description]", request.description.clone()),
        ]
    }
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_url", &self.api_url)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let response = self
            .http_client
            .post(format!("{}/checkout/sessions", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&self.form(request))
            .send()
            .await
            .map_err(|e| Error::External(format!("Checkout session request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "Checkout session request failed: {} - {}",
                status, body
            )));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Invalid checkout session response: {}", e)))?;
        tracing::info!(session = %session.id, tour = %request.tour_id, "Checkout session created");
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Returns a fixed session for every request
    #[derive(Debug, Default)]
    pub(crate) struct FixedGateway;

    #[async_trait]
    impl PaymentGateway for FixedGateway {
        async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
            Ok(CheckoutSession {
                id: format!("cs_test_{}", request.tour_id),
                url: Some(format!("https://pay.example/{}", request.amount_minor())),
            })
        }
    }
}
