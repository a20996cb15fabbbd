use anyhow::Result;
use diesel::prelude::*;
use uuid::Uuid;

use crate::bars::{Bar, BarModel};
use crate::connect::BarConnectStatus;
use crate::web::PgPool;

#[derive(Clone)]
pub struct BarsRepository {
    pool: PgPool,
}

impl BarsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a bar by ID
    pub async fn get_by_id(&self, bar_id: Uuid) -> Result<Option<Bar>> {
        use crate::schema::bars::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let bar: Option<BarModel> = dsl::bars
                .filter(dsl::id.eq(bar_id))
                .first::<BarModel>(&mut conn)
                .optional()?;

            Ok::<Option<BarModel>, anyhow::Error>(bar)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Reverse lookup by the processor's account id. This is the join key
    /// from webhook payloads back to the bar; the processor has no notion
    /// of bars.
    pub async fn get_by_connect_account_id(&self, connect_account_id: &str) -> Result<Option<Bar>> {
        use crate::schema::bars::dsl;

        let pool = self.pool.clone();
        let connect_account_id = connect_account_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let bar: Option<BarModel> = dsl::bars
                .filter(dsl::connect_account_id.eq(&connect_account_id))
                .first::<BarModel>(&mut conn)
                .optional()?;

            Ok::<Option<BarModel>, anyhow::Error>(bar)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Link a freshly created processor account to a bar. Status starts at
    /// pending until the first reconciliation.
    pub async fn set_connect_account(
        &self,
        bar_id: Uuid,
        connect_account_id: &str,
    ) -> Result<Option<Bar>> {
        use crate::schema::bars;

        let pool = self.pool.clone();
        let connect_account_id = connect_account_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let updated: Option<BarModel> = diesel::update(bars::table)
                .filter(bars::id.eq(bar_id))
                .set((
                    bars::connect_account_id.eq(Some(connect_account_id.clone())),
                    bars::connect_account_status.eq(Some(BarConnectStatus::Pending)),
                    bars::payment_setup_complete.eq(false),
                    bars::updated_at.eq(diesel::dsl::now),
                ))
                .get_result(&mut conn)
                .optional()?;

            Ok::<Option<BarModel>, anyhow::Error>(updated)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Persist a reconciled status against the bar that references the
    /// given processor account. Returns None when no bar references it.
    pub async fn update_connect_status(
        &self,
        connect_account_id: &str,
        status: BarConnectStatus,
    ) -> Result<Option<Bar>> {
        use crate::schema::bars;

        let pool = self.pool.clone();
        let connect_account_id = connect_account_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let payment_setup_complete = crate::connect::payment_setup_complete(status);

            let updated: Option<BarModel> = diesel::update(bars::table)
                .filter(bars::connect_account_id.eq(&connect_account_id))
                .set((
                    bars::connect_account_status.eq(Some(status)),
                    bars::payment_setup_complete.eq(payment_setup_complete),
                    bars::updated_at.eq(diesel::dsl::now),
                ))
                .get_result(&mut conn)
                .optional()?;

            Ok::<Option<BarModel>, anyhow::Error>(updated)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    /// Unlink a disconnected processor account from its bar and reset the
    /// dependent status fields.
    pub async fn clear_connect_account(&self, bar_id: Uuid) -> Result<Option<Bar>> {
        use crate::schema::bars;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let updated: Option<BarModel> = diesel::update(bars::table)
                .filter(bars::id.eq(bar_id))
                .set((
                    bars::connect_account_id.eq(None::<String>),
                    bars::connect_account_status.eq(None::<BarConnectStatus>),
                    bars::payment_setup_complete.eq(false),
                    bars::updated_at.eq(diesel::dsl::now),
                ))
                .get_result(&mut conn)
                .optional()?;

            Ok::<Option<BarModel>, anyhow::Error>(updated)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }
}
