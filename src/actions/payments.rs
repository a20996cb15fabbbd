use axum::extract::State;
use axum::response::Json;
use tracing::error;

use crate::errors::ApiError;
use crate::payment_intents::{
    self, CreatePaymentIntentRequest, PaymentIntentResult,
};
use crate::web::AppState;

use super::DataResponse;

/// POST /payments/intent
/// Create a payment intent; the `type` discriminant selects the standard
/// or Connect path, defaulting to standard when absent.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<DataResponse<PaymentIntentResult>>, ApiError> {
    let (processor, config) = state.payments()?;
    let spec = request.validate()?;

    create_intent(processor.as_ref(), config.platform_fee_rate, spec).await
}

/// POST /payments/connect-intent
/// Create a Connect destination charge with the platform fee split out.
pub async fn create_connect_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<DataResponse<PaymentIntentResult>>, ApiError> {
    let (processor, config) = state.payments()?;
    let spec = request.validate_connect()?;

    create_intent(processor.as_ref(), config.platform_fee_rate, spec).await
}

async fn create_intent(
    processor: &dyn crate::payment_processor::PaymentProcessor,
    fee_rate: rust_decimal::Decimal,
    spec: payment_intents::PaymentIntentSpec,
) -> Result<Json<DataResponse<PaymentIntentResult>>, ApiError> {
    match payment_intents::create_payment_intent(processor, fee_rate, spec).await {
        Ok(result) => {
            metrics::counter!("stripe.payment_intents.created").increment(1);
            Ok(Json(DataResponse { data: result }))
        }
        Err(e) => {
            if matches!(e, ApiError::Upstream { .. }) {
                metrics::counter!("stripe.api.errors").increment(1);
                error!(error = %e, "Failed to create payment intent");
            }
            Err(e)
        }
    }
}
