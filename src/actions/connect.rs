use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bars::Bar;
use crate::bars_repo::BarsRepository;
use crate::connect::{BarConnectStatus, CapabilityFlags, reconcile_status};
use crate::errors::ApiError;
use crate::payment_intents::disconnect_account;
use crate::payment_processor::ProcessorError;
use crate::web::AppState;

use super::DataResponse;

/// Response for Connect onboarding
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingResponse {
    pub onboarding_url: String,
    pub account_id: String,
}

/// Fresh view of a connected account's status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatusView {
    pub connected: bool,
    pub is_onboarded: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub business_profile: Option<String>,
    pub requirements: Vec<String>,
}

impl AccountStatusView {
    fn disconnected() -> Self {
        Self {
            connected: false,
            is_onboarded: false,
            charges_enabled: false,
            payouts_enabled: false,
            details_submitted: false,
            business_profile: None,
            requirements: Vec::new(),
        }
    }
}

/// Response for an Express dashboard login link
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginLinkResponse {
    pub login_url: String,
}

/// Response for account disconnection
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    pub success: bool,
    pub deleted_account_id: String,
}

/// Response for an explicit status sync
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSyncResponse {
    pub success: bool,
    pub bar_id: Uuid,
    pub connect_account_status: BarConnectStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectAccountRequest {
    pub bar_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingLinkRequest {
    pub bar_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest {
    pub bar_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSyncRequest {
    pub connect_account_id: Option<String>,
    pub charges_enabled: Option<bool>,
    pub payouts_enabled: Option<bool>,
    pub details_submitted: Option<bool>,
}

/// POST /connect/accounts
/// Begin Connect onboarding for a bar: create the processor account, link
/// it to the bar, and mint an onboarding link. A bar with an incomplete
/// account gets a fresh link for the stored account instead.
pub async fn create_connect_account(
    State(state): State<AppState>,
    Json(request): Json<CreateConnectAccountRequest>,
) -> Result<Json<DataResponse<OnboardingResponse>>, ApiError> {
    let (processor, config) = state.payments()?;
    let bar_id = request
        .bar_id
        .ok_or_else(|| ApiError::Validation("barId is required".to_string()))?;

    let repo = BarsRepository::new(state.pool.clone());
    let bar = get_bar(&repo, bar_id).await?;

    if let Some(existing_account_id) = &bar.connect_account_id {
        if bar.payment_setup_complete {
            return Err(ApiError::Conflict(
                "Bar already has an active payment account".to_string(),
            ));
        }
        // Onboarding incomplete; mint a new link for the stored account
        match processor
            .create_onboarding_link(existing_account_id, &config.base_url, &config.base_url)
            .await
        {
            Ok(url) => {
                return Ok(Json(DataResponse {
                    data: OnboardingResponse {
                        onboarding_url: url,
                        account_id: existing_account_id.clone(),
                    },
                }));
            }
            Err(ProcessorError::ResourceMissing(_)) => {
                // A disconnect that deleted the account but never reached
                // the bar row. The stored id is dead; start onboarding over
                // with a fresh account below.
                warn!(
                    bar_id = %bar_id,
                    account_id = %existing_account_id,
                    "Stored Connect account no longer exists, restarting onboarding"
                );
            }
            Err(e) => return Err(onboarding_link_failed(&e)),
        }
    }

    let account_id = processor.create_account().await.map_err(|e| {
        error!(bar_id = %bar_id, error = %e, "Failed to create Connect account");
        metrics::counter!("stripe.api.errors").increment(1);
        ApiError::Upstream {
            message: "Failed to create payment account".to_string(),
            details: e.to_string(),
        }
    })?;

    repo.set_connect_account(bar_id, &account_id)
        .await
        .map_err(|e| {
            error!(bar_id = %bar_id, error = %e, "Failed to link Connect account to bar");
            ApiError::Upstream {
                message: "Failed to store payment account".to_string(),
                details: e.to_string(),
            }
        })?;

    metrics::counter!("stripe.connect.onboarding_started").increment(1);

    let url = processor
        .create_onboarding_link(&account_id, &config.base_url, &config.base_url)
        .await
        .map_err(|e| onboarding_link_failed(&e))?;

    Ok(Json(DataResponse {
        data: OnboardingResponse {
            onboarding_url: url,
            account_id,
        },
    }))
}

/// GET /connect/accounts/{account_id}
/// Fresh account status straight from the processor. An account deleted at
/// the processor reports as disconnected rather than erroring, so a bar
/// left referencing one still renders.
pub async fn get_connect_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<DataResponse<AccountStatusView>>, ApiError> {
    let (processor, _) = state.payments()?;

    match processor.retrieve_account(&account_id).await {
        Ok(snapshot) => Ok(Json(DataResponse {
            data: AccountStatusView {
                connected: true,
                is_onboarded: snapshot.flags.charges_enabled && snapshot.flags.details_submitted,
                charges_enabled: snapshot.flags.charges_enabled,
                payouts_enabled: snapshot.flags.payouts_enabled,
                details_submitted: snapshot.flags.details_submitted,
                business_profile: snapshot.business_name,
                requirements: snapshot.requirements_due,
            },
        })),
        Err(ProcessorError::ResourceMissing(_)) => Ok(Json(DataResponse {
            data: AccountStatusView::disconnected(),
        })),
        Err(e) => {
            error!(account_id = %account_id, error = %e, "Failed to retrieve Connect account");
            Err(ApiError::Upstream {
                message: "Failed to retrieve payment account".to_string(),
                details: e.to_string(),
            })
        }
    }
}

/// POST /connect/accounts/{account_id}/onboarding-link
/// Mint a fresh onboarding link. When a barId is supplied the link is only
/// issued if that bar actually references the account.
pub async fn create_onboarding_link(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    body: Option<Json<OnboardingLinkRequest>>,
) -> Result<Json<DataResponse<OnboardingResponse>>, ApiError> {
    let (processor, config) = state.payments()?;

    let request = body.map(|Json(request)| request).unwrap_or_default();
    if let Some(bar_id) = request.bar_id {
        let repo = BarsRepository::new(state.pool.clone());
        let bar = get_bar(&repo, bar_id).await?;
        if bar.connect_account_id.as_deref() != Some(account_id.as_str()) {
            return Err(ApiError::Validation(
                "Bar is not linked to this payment account".to_string(),
            ));
        }
    }

    let url = processor
        .create_onboarding_link(&account_id, &config.base_url, &config.base_url)
        .await
        .map_err(|e| onboarding_link_failed(&e))?;

    Ok(Json(DataResponse {
        data: OnboardingResponse {
            onboarding_url: url,
            account_id,
        },
    }))
}

/// POST /connect/accounts/{account_id}/login-link
/// Express dashboard login link; the account must have finished onboarding.
pub async fn create_login_link(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<DataResponse<LoginLinkResponse>>, ApiError> {
    let (processor, config) = state.payments()?;

    let snapshot = match processor.retrieve_account(&account_id).await {
        Ok(snapshot) => snapshot,
        Err(ProcessorError::ResourceMissing(_)) => {
            return Err(ApiError::NotFound("Payment account not found".to_string()));
        }
        Err(e) => {
            return Err(ApiError::Upstream {
                message: "Failed to retrieve payment account".to_string(),
                details: e.to_string(),
            });
        }
    };

    if !(snapshot.flags.charges_enabled && snapshot.flags.details_submitted) {
        return Err(ApiError::UpstreamNotReady(
            "Onboarding is not complete for this payment account".to_string(),
        ));
    }

    let url = processor
        .create_login_link(&account_id, &config.base_url)
        .await
        .map_err(|e| {
            error!(account_id = %account_id, error = %e, "Failed to create login link");
            metrics::counter!("stripe.api.errors").increment(1);
            ApiError::Upstream {
                message: "Failed to create dashboard link".to_string(),
                details: e.to_string(),
            }
        })?;

    Ok(Json(DataResponse {
        data: LoginLinkResponse { login_url: url },
    }))
}

/// POST /connect/accounts/{account_id}/disconnect
/// Delete the processor account and unlink it from the bar. Deletion is
/// idempotent: an account that is already gone still counts as deleted.
/// The two steps are not transactional; a bar left referencing a deleted
/// account resolves as disconnected on the next status query.
pub async fn disconnect_connect_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(request): Json<DisconnectRequest>,
) -> Result<Json<DataResponse<DisconnectResponse>>, ApiError> {
    let (processor, _) = state.payments()?;
    let bar_id = request
        .bar_id
        .ok_or_else(|| ApiError::Validation("barId is required".to_string()))?;

    let repo = BarsRepository::new(state.pool.clone());
    let bar = get_bar(&repo, bar_id).await?;

    if bar.connect_account_id.as_deref() != Some(account_id.as_str()) {
        return Err(ApiError::Validation(
            "Bar is not linked to this payment account".to_string(),
        ));
    }

    let deleted_account_id = disconnect_account(processor.as_ref(), &account_id).await?;

    repo.clear_connect_account(bar_id).await.map_err(|e| {
        error!(bar_id = %bar_id, error = %e, "Failed to unlink Connect account");
        ApiError::Upstream {
            message: "Account deleted but could not be unlinked from the bar".to_string(),
            details: e.to_string(),
        }
    })?;

    metrics::counter!("stripe.connect.disconnected").increment(1);
    info!(bar_id = %bar_id, account_id = %deleted_account_id, "Disconnected payment account");

    Ok(Json(DataResponse {
        data: DisconnectResponse {
            success: true,
            deleted_account_id,
        },
    }))
}

/// POST /connect/status-sync
/// Apply capability flags to the bar that references the account. The
/// webhook path does the same thing; this endpoint exists for explicit
/// refreshes from the dashboard.
pub async fn sync_connect_status(
    State(state): State<AppState>,
    Json(request): Json<StatusSyncRequest>,
) -> Result<Json<DataResponse<StatusSyncResponse>>, ApiError> {
    let account_id = request
        .connect_account_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("connectAccountId is required".to_string()))?;
    let flags = CapabilityFlags {
        charges_enabled: request
            .charges_enabled
            .ok_or_else(|| ApiError::Validation("chargesEnabled is required".to_string()))?,
        payouts_enabled: request
            .payouts_enabled
            .ok_or_else(|| ApiError::Validation("payoutsEnabled is required".to_string()))?,
        details_submitted: request
            .details_submitted
            .ok_or_else(|| ApiError::Validation("detailsSubmitted is required".to_string()))?,
    };

    let status = reconcile_status(&flags);

    let repo = BarsRepository::new(state.pool.clone());
    let bar = repo
        .update_connect_status(&account_id, status)
        .await
        .map_err(|e| {
            error!(account_id = %account_id, error = %e, "Failed to update bar Connect status");
            ApiError::Upstream {
                message: "Failed to update bar status".to_string(),
                details: e.to_string(),
            }
        })?
        .ok_or_else(|| {
            ApiError::NotFound("No bar references this payment account".to_string())
        })?;

    info!(
        bar_id = %bar.id,
        account_id = %account_id,
        status = %status,
        "Synced bar Connect status"
    );

    Ok(Json(DataResponse {
        data: StatusSyncResponse {
            success: true,
            bar_id: bar.id,
            connect_account_status: status,
        },
    }))
}

async fn get_bar(repo: &BarsRepository, bar_id: Uuid) -> Result<Bar, ApiError> {
    repo.get_by_id(bar_id)
        .await
        .map_err(|e| {
            error!(bar_id = %bar_id, error = %e, "Failed to load bar");
            ApiError::Upstream {
                message: "Failed to load bar".to_string(),
                details: e.to_string(),
            }
        })?
        .ok_or_else(|| ApiError::NotFound("Bar not found".to_string()))
}

fn onboarding_link_failed(e: &ProcessorError) -> ApiError {
    error!(error = %e, "Failed to create onboarding link");
    metrics::counter!("stripe.api.errors").increment(1);
    ApiError::Upstream {
        message: "Failed to create onboarding link".to_string(),
        details: e.to_string(),
    }
}
