//! Payments backend for the beach-bar booking platform.
//!
//! Owns the Stripe Connect integration: destination charges with a platform
//! fee split, connected-account lifecycle for bar owners, capability-flag
//! reconciliation onto bar status, and signed webhook ingestion.

pub mod actions;
pub mod bars;
pub mod bars_repo;
pub mod connect;
pub mod errors;
pub mod fees;
pub mod metrics;
pub mod payment_intents;
pub mod payment_processor;
pub mod schema;
pub mod stripe_client;
pub mod stripe_processor;
pub mod web;
pub mod webhook_events;
pub mod webhook_events_repo;
