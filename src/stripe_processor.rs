use async_trait::async_trait;
use stripe::{
    Account, AccountId, AccountLink, AccountLinkType, AccountType, Client, CreateAccount,
    CreateAccountLink, CreatePaymentIntent, CreatePaymentIntentAutomaticPaymentMethods,
    CreatePaymentIntentTransferData, Currency, ErrorCode, LoginLink, PaymentIntent,
    RequestStrategy, StripeError,
};

use crate::connect::CapabilityFlags;
use crate::payment_processor::{
    AccountSnapshot, IntentHandle, IntentRequest, PaymentProcessor, ProcessorError,
};

/// Production processor backed by the Stripe API.
#[derive(Clone)]
pub struct StripeProcessor {
    client: Client,
}

impl StripeProcessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn parse_account_id(account_id: &str) -> Result<AccountId, ProcessorError> {
        account_id
            .parse()
            .map_err(|_| ProcessorError::Api(format!("invalid account id: {account_id}")))
    }
}

fn map_stripe_error(e: StripeError) -> ProcessorError {
    match &e {
        StripeError::Stripe(request_error)
            if request_error.code == Some(ErrorCode::ResourceMissing) =>
        {
            ProcessorError::ResourceMissing(
                request_error
                    .message
                    .clone()
                    .unwrap_or_else(|| "resource missing".to_string()),
            )
        }
        _ => ProcessorError::Api(e.to_string()),
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot, ProcessorError> {
        let id = Self::parse_account_id(account_id)?;
        let account = Account::retrieve(&self.client, &id, &[])
            .await
            .map_err(map_stripe_error)?;

        Ok(AccountSnapshot {
            id: account.id.to_string(),
            flags: CapabilityFlags {
                charges_enabled: account.charges_enabled.unwrap_or(false),
                payouts_enabled: account.payouts_enabled.unwrap_or(false),
                details_submitted: account.details_submitted.unwrap_or(false),
            },
            business_name: account.business_profile.and_then(|profile| profile.name),
            requirements_due: account
                .requirements
                .and_then(|requirements| requirements.currently_due)
                .unwrap_or_default(),
        })
    }

    async fn create_account(&self) -> Result<String, ProcessorError> {
        let mut params = CreateAccount::new();
        params.type_ = Some(AccountType::Express);

        let account = Account::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(account.id.to_string())
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String, ProcessorError> {
        let id = Self::parse_account_id(account_id)?;

        let mut params = CreateAccountLink::new(id, AccountLinkType::AccountOnboarding);
        params.refresh_url = Some(refresh_url);
        params.return_url = Some(return_url);

        let link = AccountLink::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(link.url)
    }

    async fn create_login_link(
        &self,
        account_id: &str,
        redirect_url: &str,
    ) -> Result<String, ProcessorError> {
        let id = Self::parse_account_id(account_id)?;

        let link = LoginLink::create(&self.client, &id, redirect_url)
            .await
            .map_err(map_stripe_error)?;

        Ok(link.url)
    }

    async fn create_payment_intent(
        &self,
        request: IntentRequest,
    ) -> Result<IntentHandle, ProcessorError> {
        let currency: Currency = request
            .currency
            .parse()
            .map_err(|_| ProcessorError::Api(format!("invalid currency: {}", request.currency)))?;

        let mut params = CreatePaymentIntent::new(request.amount_minor, currency);
        params.metadata = Some(request.metadata.clone());
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            allow_redirects: None,
            enabled: true,
        });
        params.application_fee_amount = request.application_fee_minor;
        if let Some(destination) = &request.destination_account_id {
            // Destination charge executed in the connected account's
            // context: the platform settles the base charge and the
            // connected account receives the net transfer.
            params.transfer_data = Some(CreatePaymentIntentTransferData {
                amount: None,
                destination: destination.clone(),
            });
            params.on_behalf_of = Some(destination.as_str());
        }

        let client = match &request.idempotency_key {
            Some(key) => self
                .client
                .clone()
                .with_strategy(RequestStrategy::Idempotent(key.clone())),
            None => self.client.clone(),
        };

        let intent = PaymentIntent::create(&client, params)
            .await
            .map_err(map_stripe_error)?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| ProcessorError::Api("payment intent has no client secret".to_string()))?;

        Ok(IntentHandle {
            payment_intent_id: intent.id.to_string(),
            client_secret,
        })
    }

    async fn delete_account(&self, account_id: &str) -> Result<String, ProcessorError> {
        let id = Self::parse_account_id(account_id)?;

        let deleted = Account::delete(&self.client, &id)
            .await
            .map_err(map_stripe_error)?;

        Ok(deleted.id.to_string())
    }
}
