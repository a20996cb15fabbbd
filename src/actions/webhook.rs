use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use stripe::{Event, EventObject, Webhook};
use tracing::{error, info, warn};

use crate::bars_repo::BarsRepository;
use crate::connect::{CapabilityFlags, reconcile_status};
use crate::web::AppState;
use crate::webhook_events::NewWebhookEvent;
use crate::webhook_events_repo::WebhookEventsRepository;

/// POST /webhooks/payments
/// Handle incoming payment-processor webhook events. Responds 200 with
/// `{"received": true}` once the signature verifies, regardless of handler
/// outcome; failures are recorded against the event for later inspection.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let webhook_secret = match &state.stripe_config {
        Some(config) => config.webhook_secret.clone(),
        None => {
            return (StatusCode::SERVICE_UNAVAILABLE, "Stripe is not configured").into_response();
        }
    };

    metrics::counter!("stripe.webhook.received").increment(1);
    let start = std::time::Instant::now();

    let signature = match headers.get("Stripe-Signature").and_then(|sig| sig.to_str().ok()) {
        Some(s) => s.to_string(),
        None => {
            metrics::counter!("stripe.webhook.signature_invalid").increment(1);
            return (StatusCode::BAD_REQUEST, "Missing Stripe-Signature header").into_response();
        }
    };

    let payload = match std::str::from_utf8(&body) {
        Ok(s) => s,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Body is not valid UTF-8").into_response();
        }
    };

    let event = match Webhook::construct_event(payload, &signature, &webhook_secret) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Invalid webhook signature");
            metrics::counter!("stripe.webhook.signature_invalid").increment(1);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let webhook_repo = WebhookEventsRepository::new(state.pool.clone());

    // Check idempotency
    let event_id = event.id.to_string();
    match webhook_repo.is_processed(&event_id).await {
        Ok(true) => {
            return Json(json!({ "received": true })).into_response();
        }
        Err(e) => {
            error!(error = %e, "Failed to check webhook idempotency");
        }
        _ => {}
    }

    // Record the event
    let event_type = event.type_.to_string();
    let new_event = NewWebhookEvent {
        stripe_event_id: event_id.clone(),
        event_type: event_type.clone(),
        payload: serde_json::to_value(&event).unwrap_or_default(),
    };

    if let Err(e) = webhook_repo.create(new_event).await {
        // May fail if the event already exists (race condition), that's OK
        warn!(error = %e, event_id = %event_id, "Failed to record webhook event");
    }

    match process_webhook_event(&state, &event_type, &event).await {
        Ok(()) => {
            if let Err(e) = webhook_repo.mark_processed(&event_id).await {
                error!(error = %e, "Failed to mark webhook as processed");
            }
        }
        Err(e) => {
            error!(event_type = %event_type, error = %e, "Failed to process webhook event");
            if let Err(e2) = webhook_repo.mark_failed(&event_id, &e.to_string()).await {
                error!(error = %e2, "Failed to mark webhook as failed");
            }
        }
    }

    let duration_ms = start.elapsed().as_millis() as f64;
    metrics::histogram!("stripe.webhook.processing_ms").record(duration_ms);

    Json(json!({ "received": true })).into_response()
}

async fn process_webhook_event(
    state: &AppState,
    event_type: &str,
    event: &Event,
) -> anyhow::Result<()> {
    match event_type {
        "account.updated" => {
            if let EventObject::Account(account) = &event.data.object {
                let account_id = account.id.to_string();
                let flags = CapabilityFlags {
                    charges_enabled: account.charges_enabled.unwrap_or(false),
                    payouts_enabled: account.payouts_enabled.unwrap_or(false),
                    details_submitted: account.details_submitted.unwrap_or(false),
                };
                let status = reconcile_status(&flags);

                let repo = BarsRepository::new(state.pool.clone());
                match repo.update_connect_status(&account_id, status).await? {
                    Some(bar) => {
                        if status == crate::connect::BarConnectStatus::Active {
                            metrics::counter!("stripe.connect.onboarding_completed").increment(1);
                        }
                        info!(
                            bar_id = %bar.id,
                            account_id = %account_id,
                            status = %status,
                            "Updated bar Connect status from webhook"
                        );
                    }
                    None => {
                        // Webhooks can arrive for accounts created but not
                        // yet linked to a bar; acknowledge and move on.
                        warn!(
                            account_id = %account_id,
                            "account.updated for an account no bar references"
                        );
                    }
                }
            }
        }
        "payment_intent.succeeded" => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                metrics::counter!("stripe.payments.succeeded").increment(1);
                info!(payment_intent_id = %intent.id, "Payment succeeded");
            }
        }
        "payment_intent.payment_failed" => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                metrics::counter!("stripe.payments.failed").increment(1);
                warn!(payment_intent_id = %intent.id, "Payment failed");
            }
        }
        _ => {
            info!(event_type = %event_type, "Unhandled webhook event type");
        }
    }

    Ok(())
}
