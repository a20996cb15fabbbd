use anyhow::Result;
use diesel::prelude::*;

use crate::web::PgPool;
use crate::webhook_events::{NewWebhookEvent, WebhookEventModel};

#[derive(Clone)]
pub struct WebhookEventsRepository {
    pool: PgPool,
}

impl WebhookEventsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check if an event has already been processed (idempotency)
    pub async fn is_processed(&self, stripe_event_id: &str) -> Result<bool> {
        use crate::schema::webhook_events::dsl;

        let pool = self.pool.clone();
        let stripe_event_id = stripe_event_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let exists: bool = diesel::select(diesel::dsl::exists(
                dsl::webhook_events
                    .filter(dsl::stripe_event_id.eq(&stripe_event_id))
                    .filter(dsl::processed.eq(true)),
            ))
            .get_result(&mut conn)?;

            Ok::<bool, anyhow::Error>(exists)
        })
        .await??;

        Ok(result)
    }

    /// Record a new webhook event
    pub async fn create(&self, new_event: NewWebhookEvent) -> Result<WebhookEventModel> {
        use crate::schema::webhook_events::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let inserted: WebhookEventModel = diesel::insert_into(dsl::webhook_events)
                .values(&new_event)
                .on_conflict(dsl::stripe_event_id)
                .do_nothing()
                .get_result(&mut conn)
                .optional()?
                .ok_or_else(|| anyhow::anyhow!("Event already exists"))?;

            Ok::<WebhookEventModel, anyhow::Error>(inserted)
        })
        .await??;

        Ok(result)
    }

    /// Mark an event as processed
    pub async fn mark_processed(&self, stripe_event_id: &str) -> Result<()> {
        use crate::schema::webhook_events;

        let pool = self.pool.clone();
        let stripe_event_id = stripe_event_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            diesel::update(webhook_events::table)
                .filter(webhook_events::stripe_event_id.eq(&stripe_event_id))
                .set(webhook_events::processed.eq(true))
                .execute(&mut conn)?;

            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    /// Mark an event as failed with an error message
    pub async fn mark_failed(&self, stripe_event_id: &str, error: &str) -> Result<()> {
        use crate::schema::webhook_events;

        let pool = self.pool.clone();
        let stripe_event_id = stripe_event_id.to_string();
        let error = error.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            diesel::update(webhook_events::table)
                .filter(webhook_events::stripe_event_id.eq(&stripe_event_id))
                .set((
                    webhook_events::processed.eq(true),
                    webhook_events::processing_error.eq(Some(&error)),
                ))
                .execute(&mut conn)?;

            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }
}
