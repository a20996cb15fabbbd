use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::connect::CapabilityFlags;

/// Errors surfaced by a payment processor backend.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The referenced object does not exist at the processor
    /// (Stripe's `resource_missing` class of error).
    #[error("{0}")]
    ResourceMissing(String),
    /// The processor rejected the request (validation, rate limit) or the
    /// transport failed.
    #[error("{0}")]
    Api(String),
}

/// Fresh snapshot of a connected account as reported by the processor.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub id: String,
    pub flags: CapabilityFlags,
    pub business_name: Option<String>,
    pub requirements_due: Vec<String>,
}

/// Minor-unit payment-intent request handed to the processor. Amounts are
/// already converted; this layer does no money arithmetic.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    /// Platform fee in minor units; present only for destination charges.
    pub application_fee_minor: Option<i64>,
    /// Destination account for the transfer. Determines who settles the
    /// base charge versus who receives the net; the processor call fails
    /// closed when the fee is set without a destination.
    pub destination_account_id: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Caller-supplied token making client retries safe.
    pub idempotency_key: Option<String>,
}

/// Short-lived handle for a created payment intent. Not persisted by this
/// service.
#[derive(Debug, Clone)]
pub struct IntentHandle {
    pub payment_intent_id: String,
    pub client_secret: String,
}

/// Injected processor boundary. Handlers take this instead of a module
/// global so tests can substitute an in-memory double.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Fetch a fresh account snapshot; never served from a cache.
    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot, ProcessorError>;

    /// Create a new Express-style connected account, returning its id.
    async fn create_account(&self) -> Result<String, ProcessorError>;

    /// Mint an onboarding link for an account.
    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String, ProcessorError>;

    /// Mint an Express dashboard login link for an onboarded account.
    async fn create_login_link(
        &self,
        account_id: &str,
        redirect_url: &str,
    ) -> Result<String, ProcessorError>;

    async fn create_payment_intent(
        &self,
        request: IntentRequest,
    ) -> Result<IntentHandle, ProcessorError>;

    /// Delete a connected account, echoing the deleted id.
    async fn delete_account(&self, account_id: &str) -> Result<String, ProcessorError>;
}
