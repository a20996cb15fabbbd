use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::actions;
use crate::errors::ApiError;
use crate::payment_processor::PaymentProcessor;
use crate::stripe_client::StripeConfig;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// App state shared by all handlers. The processor is injected rather than
/// read from a global so tests can substitute a double; both it and the
/// Stripe config are absent when the deployment carries no Stripe secrets.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub stripe_config: Option<StripeConfig>,
    pub processor: Option<Arc<dyn PaymentProcessor>>,
}

impl AppState {
    /// Processor and config, or a configuration error when Stripe is not
    /// set up for this deployment.
    pub fn payments(&self) -> Result<(Arc<dyn PaymentProcessor>, &StripeConfig), ApiError> {
        match (&self.processor, &self.stripe_config) {
            (Some(processor), Some(config)) => Ok((processor.clone(), config)),
            _ => Err(ApiError::Configuration(
                "Stripe is not configured".to_string(),
            )),
        }
    }
}

// Middleware for request logging with correlation ID
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4().to_string()[..8].to_string();
    let start_time = Instant::now();

    info!("Started {} {} [{}]", method, path, request_id);

    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status();

    info!(
        "Completed {} {} [{}] {} in {:.2}ms",
        method,
        path,
        request_id,
        status.as_u16(),
        duration.as_secs_f64() * 1000.0
    );

    response
}

pub async fn start_web_server(
    interface: String,
    port: u16,
    pool: PgPool,
    stripe_config: Option<StripeConfig>,
    processor: Option<Arc<dyn PaymentProcessor>>,
) -> Result<()> {
    info!("Starting web server on {}:{}", interface, port);

    let app_state = AppState {
        pool,
        stripe_config,
        processor,
    };

    let cors_layer = CorsLayer::permissive();

    // API sub-router rooted at "/data"
    let api_router = Router::new()
        // Payment intent routes
        .route("/payments/intent", post(actions::create_payment_intent))
        .route(
            "/payments/connect-intent",
            post(actions::create_connect_payment_intent),
        )
        // Connect account routes
        .route("/connect/accounts", post(actions::create_connect_account))
        .route(
            "/connect/accounts/{account_id}",
            get(actions::get_connect_account),
        )
        .route(
            "/connect/accounts/{account_id}/onboarding-link",
            post(actions::create_onboarding_link),
        )
        .route(
            "/connect/accounts/{account_id}/login-link",
            post(actions::create_login_link),
        )
        .route(
            "/connect/accounts/{account_id}/disconnect",
            post(actions::disconnect_connect_account),
        )
        .route("/connect/status-sync", post(actions::sync_connect_status))
        // Webhook route (raw body, signature-verified)
        .route("/webhooks/payments", post(actions::handle_payment_webhook))
        .with_state(app_state);

    let app = Router::new()
        .nest("/data", api_router)
        .route("/metrics", get(crate::metrics::metrics_handler))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(cors_layer);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", interface, port)).await?;
    info!("Web server listening on http://{}:{}", interface, port);

    axum::serve(listener, app).await?;

    Ok(())
}
