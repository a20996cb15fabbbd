pub mod sql_types {
    #[derive(diesel::query_builder::QueryId, Clone, diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "bar_connect_status"))]
    pub struct BarConnectStatus;
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::BarConnectStatus;

    bars (id) {
        id -> Uuid,
        name -> Varchar,
        owner_id -> Uuid,
        connect_account_id -> Nullable<Varchar>,
        connect_account_status -> Nullable<BarConnectStatus>,
        payment_setup_complete -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    webhook_events (id) {
        id -> Uuid,
        stripe_event_id -> Varchar,
        event_type -> Varchar,
        processed -> Bool,
        processing_error -> Nullable<Varchar>,
        payload -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(bars, webhook_events);
