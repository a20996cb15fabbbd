use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::fees::{FeeError, compute_split, to_minor_units};
use crate::payment_processor::{IntentRequest, PaymentProcessor, ProcessorError};

/// Discriminant for the two payment paths. Omitting the field in a request
/// selects the standard path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentIntentKind {
    #[default]
    Standard,
    Connect,
}

/// Raw request body for payment-intent creation. Everything is optional so
/// that missing fields surface as 400 validation errors in the order the
/// preconditions are checked, rather than as deserialization failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    #[serde(rename = "type", default)]
    pub kind: PaymentIntentKind,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub connect_account_id: Option<String>,
    pub bar_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

/// Validated payment-intent specification.
#[derive(Debug, Clone)]
pub enum PaymentIntentSpec {
    Standard {
        amount: Decimal,
        currency: String,
        metadata: HashMap<String, String>,
        idempotency_key: Option<String>,
    },
    Connect {
        amount: Decimal,
        currency: String,
        destination_account_id: String,
        bar_id: Uuid,
        owner_id: Uuid,
        metadata: HashMap<String, String>,
        idempotency_key: Option<String>,
    },
}

impl CreatePaymentIntentRequest {
    /// Validate against the path selected by the `type` discriminant.
    pub fn validate(self) -> Result<PaymentIntentSpec, ApiError> {
        match self.kind {
            PaymentIntentKind::Standard => {
                let (amount, currency) = self.amount_and_currency()?;
                Ok(PaymentIntentSpec::Standard {
                    amount,
                    currency,
                    metadata: self.metadata,
                    idempotency_key: self.idempotency_key,
                })
            }
            PaymentIntentKind::Connect => self.validate_connect(),
        }
    }

    /// Validate as a Connect destination charge regardless of the
    /// discriminant. Preconditions are checked in order; each failure
    /// short-circuits with its own message.
    pub fn validate_connect(self) -> Result<PaymentIntentSpec, ApiError> {
        let (amount, currency) = self.amount_and_currency()?;
        let destination_account_id = self
            .connect_account_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Validation("connectAccountId is required".to_string()))?;
        let bar_id = self
            .bar_id
            .ok_or_else(|| ApiError::Validation("barId is required".to_string()))?;
        let owner_id = self
            .owner_id
            .ok_or_else(|| ApiError::Validation("ownerId is required".to_string()))?;

        Ok(PaymentIntentSpec::Connect {
            amount,
            currency,
            destination_account_id,
            bar_id,
            owner_id,
            metadata: self.metadata,
            idempotency_key: self.idempotency_key,
        })
    }

    fn amount_and_currency(&self) -> Result<(Decimal, String), ApiError> {
        let amount = self
            .amount
            .ok_or_else(|| ApiError::Validation("amount is required".to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(ApiError::Validation(
                "amount must be greater than 0".to_string(),
            ));
        }
        let currency = self
            .currency
            .clone()
            .filter(|currency| !currency.is_empty())
            .ok_or_else(|| ApiError::Validation("currency is required".to_string()))?;
        Ok((amount, currency.to_lowercase()))
    }
}

/// Result returned to the caller. The orchestrator does not persist this;
/// booking and order records are the booking service's concern.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResult {
    #[serde(rename = "type")]
    pub kind: PaymentIntentKind,
    pub client_secret: String,
    pub payment_intent_id: String,
    pub platform_fee: Decimal,
    pub owner_amount: Decimal,
}

/// Create a payment intent at the processor for a validated spec.
///
/// The Connect path fetches the destination account fresh and refuses to
/// proceed unless charges are enabled, then passes the minor-unit fee,
/// transfer destination, and audit metadata through to the processor. No
/// automatic retries; a caller-supplied idempotency key makes client
/// retries safe.
pub async fn create_payment_intent(
    processor: &dyn PaymentProcessor,
    fee_rate: Decimal,
    spec: PaymentIntentSpec,
) -> Result<PaymentIntentResult, ApiError> {
    match spec {
        PaymentIntentSpec::Standard {
            amount,
            currency,
            metadata,
            idempotency_key,
        } => {
            let request = IntentRequest {
                amount_minor: minor_units(amount)?,
                currency,
                application_fee_minor: None,
                destination_account_id: None,
                metadata,
                idempotency_key,
            };

            let handle = processor
                .create_payment_intent(request)
                .await
                .map_err(intent_creation_failed)?;

            Ok(PaymentIntentResult {
                kind: PaymentIntentKind::Standard,
                client_secret: handle.client_secret,
                payment_intent_id: handle.payment_intent_id,
                platform_fee: Decimal::ZERO,
                owner_amount: amount,
            })
        }
        PaymentIntentSpec::Connect {
            amount,
            currency,
            destination_account_id,
            bar_id,
            owner_id,
            mut metadata,
            idempotency_key,
        } => {
            let account = match processor.retrieve_account(&destination_account_id).await {
                Ok(account) => account,
                Err(ProcessorError::ResourceMissing(_)) => {
                    // A bar can be left referencing an account deleted at
                    // the processor; treat it as not ready rather than as a
                    // server failure.
                    return Err(ApiError::UpstreamNotReady(
                        "The bar's payment account no longer exists. The owner must reconnect payments.".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(ApiError::Upstream {
                        message: "Failed to look up the bar's payment account".to_string(),
                        details: e.to_string(),
                    });
                }
            };

            if !account.flags.charges_enabled {
                return Err(ApiError::UpstreamNotReady(
                    "The bar's payment account cannot accept charges yet. The owner must complete onboarding first.".to_string(),
                ));
            }

            let split = compute_split(amount, fee_rate)
                .map_err(|e| ApiError::Validation(e.to_string()))?;

            metadata.insert("barId".to_string(), bar_id.to_string());
            metadata.insert("ownerId".to_string(), owner_id.to_string());
            metadata.insert("platformFee".to_string(), split.platform_fee.to_string());
            metadata.insert("ownerAmount".to_string(), split.owner_amount.to_string());

            let request = IntentRequest {
                amount_minor: minor_units(amount)?,
                currency,
                application_fee_minor: Some(minor_units(split.platform_fee)?),
                destination_account_id: Some(destination_account_id),
                metadata,
                idempotency_key,
            };

            let handle = processor
                .create_payment_intent(request)
                .await
                .map_err(intent_creation_failed)?;

            Ok(PaymentIntentResult {
                kind: PaymentIntentKind::Connect,
                client_secret: handle.client_secret,
                payment_intent_id: handle.payment_intent_id,
                platform_fee: split.platform_fee,
                owner_amount: split.owner_amount,
            })
        }
    }
}

/// Delete a connected account at the processor. An account that is already
/// absent counts as deleted, so retrying a disconnect is safe.
pub async fn disconnect_account(
    processor: &dyn PaymentProcessor,
    account_id: &str,
) -> Result<String, ApiError> {
    match processor.delete_account(account_id).await {
        Ok(deleted_id) => Ok(deleted_id),
        Err(ProcessorError::ResourceMissing(_)) => Ok(account_id.to_string()),
        Err(e) => Err(ApiError::Upstream {
            message: "Failed to disconnect the payment account".to_string(),
            details: e.to_string(),
        }),
    }
}

fn intent_creation_failed(e: ProcessorError) -> ApiError {
    ApiError::Upstream {
        message: "Failed to create the payment intent".to_string(),
        details: e.to_string(),
    }
}

fn minor_units(amount: Decimal) -> Result<i64, ApiError> {
    to_minor_units(amount).map_err(|e| match e {
        FeeError::AmountOutOfRange => ApiError::Validation("amount is out of range".to_string()),
        FeeError::InvalidAmount => ApiError::Validation("amount must be greater than 0".to_string()),
    })
}
