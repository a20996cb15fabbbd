use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connect::BarConnectStatus;

/// API model for bars. Bar provisioning (name, owner, location) belongs to
/// the booking service; this service reads bars and owns the Connect
/// columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub connect_account_id: Option<String>,
    pub connect_account_status: Option<BarConnectStatus>,
    pub payment_setup_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Diesel model for the bars table
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::bars)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BarModel {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub connect_account_id: Option<String>,
    pub connect_account_status: Option<BarConnectStatus>,
    pub payment_setup_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BarModel> for Bar {
    fn from(model: BarModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            owner_id: model.owner_id,
            connect_account_id: model.connect_account_id,
            connect_account_status: model.connect_account_status,
            payment_setup_complete: model.payment_setup_complete,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
