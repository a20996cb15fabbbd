use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};

/// Capability flags reported by the payment processor for a connected
/// account. Never cached; always fetched fresh from the processor or taken
/// from a verified webhook payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFlags {
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
}

/// Business-facing Connect status stored on the bar, derived from the
/// processor's capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::BarConnectStatus")]
#[serde(rename_all = "snake_case")]
pub enum BarConnectStatus {
    #[db_enum(rename = "pending")]
    Pending,
    #[db_enum(rename = "restricted")]
    Restricted,
    #[db_enum(rename = "active")]
    Active,
}

impl std::fmt::Display for BarConnectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarConnectStatus::Pending => write!(f, "pending"),
            BarConnectStatus::Restricted => write!(f, "restricted"),
            BarConnectStatus::Active => write!(f, "active"),
        }
    }
}

/// Map capability flags onto a bar Connect status.
///
/// Active requires both charges and payouts. A partially enabled account and
/// a fully submitted account still under review both map to restricted; the
/// dashboard does not currently distinguish the two. Anything else is
/// pending.
pub fn reconcile_status(flags: &CapabilityFlags) -> BarConnectStatus {
    if flags.charges_enabled && flags.payouts_enabled {
        BarConnectStatus::Active
    } else if flags.details_submitted {
        BarConnectStatus::Restricted
    } else {
        BarConnectStatus::Pending
    }
}

/// Whether a status counts as a completed payment setup. Stored alongside
/// the status on the bar and drives dashboard gating.
pub fn payment_setup_complete(status: BarConnectStatus) -> bool {
    status == BarConnectStatus::Active
}
