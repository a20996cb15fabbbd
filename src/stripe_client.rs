use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use stripe::Client;

/// Configuration for Stripe integration
#[derive(Clone)]
pub struct StripeConfig {
    pub client: Client,
    pub webhook_secret: String,
    /// Platform fee as a decimal rate (e.g., 0.03 = 3%)
    pub platform_fee_rate: Decimal,
    /// Base URL used for onboarding refresh/return and dashboard redirects
    pub base_url: String,
}

impl StripeConfig {
    /// Initialize Stripe configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key =
            std::env::var("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY must be set")?;
        let webhook_secret =
            std::env::var("STRIPE_WEBHOOK_SECRET").context("STRIPE_WEBHOOK_SECRET must be set")?;
        let platform_fee_rate = Decimal::from_str(
            &std::env::var("PLATFORM_FEE_RATE").unwrap_or_else(|_| "0.03".to_string()),
        )
        .context("PLATFORM_FEE_RATE must be a valid decimal rate")?;
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let client = Client::new(secret_key);

        Ok(Self {
            client,
            webhook_secret,
            platform_fee_rate,
            base_url,
        })
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("webhook_secret", &"[REDACTED]")
            .field("platform_fee_rate", &self.platform_fee_rate)
            .field("base_url", &self.base_url)
            .finish()
    }
}
