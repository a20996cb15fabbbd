//! Common test utilities.
//!
//! `FakeProcessor` is an in-memory stand-in for the payment processor.
//! `TestDatabase` creates an isolated PostgreSQL database per test from the
//! `barpay_test_template` template database, so database-backed tests run in
//! parallel without interference. Migrations are applied to the template
//! once per test session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use rust_decimal::Decimal;
use uuid::Uuid;

use barpay::bars::{Bar, BarModel};
use barpay::connect::{BarConnectStatus, CapabilityFlags};
use barpay::payment_processor::{
    AccountSnapshot, IntentHandle, IntentRequest, PaymentProcessor, ProcessorError,
};
use barpay::stripe_client::StripeConfig;
use barpay::web::{AppState, PgPool};

/// In-memory payment processor double. Accounts live in a map keyed by
/// account id; every created intent is recorded for assertions.
#[derive(Default)]
pub struct FakeProcessor {
    pub accounts: Mutex<HashMap<String, AccountSnapshot>>,
    pub intents: Mutex<Vec<IntentRequest>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_intents_with: Mutex<Option<String>>,
    counter: AtomicU32,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, account_id: &str, flags: CapabilityFlags) -> Self {
        self.accounts.lock().unwrap().insert(
            account_id.to_string(),
            AccountSnapshot {
                id: account_id.to_string(),
                flags,
                business_name: Some("Sunset Beach Bar".to_string()),
                requirements_due: Vec::new(),
            },
        );
        self
    }

    #[allow(dead_code)]
    pub fn created_intents(&self) -> Vec<IntentRequest> {
        self.intents.lock().unwrap().clone()
    }

    fn next_id(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot, ProcessorError> {
        self.accounts
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| {
                ProcessorError::ResourceMissing(format!("No such account: '{account_id}'"))
            })
    }

    async fn create_account(&self) -> Result<String, ProcessorError> {
        let account_id = format!("acct_test{}", self.next_id());
        self.accounts.lock().unwrap().insert(
            account_id.clone(),
            AccountSnapshot {
                id: account_id.clone(),
                flags: CapabilityFlags {
                    charges_enabled: false,
                    payouts_enabled: false,
                    details_submitted: false,
                },
                business_name: None,
                requirements_due: vec!["external_account".to_string()],
            },
        );
        Ok(account_id)
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        _return_url: &str,
    ) -> Result<String, ProcessorError> {
        if !self.accounts.lock().unwrap().contains_key(account_id) {
            return Err(ProcessorError::ResourceMissing(format!(
                "No such account: '{account_id}'"
            )));
        }
        Ok(format!("https://connect.example/setup/{account_id}"))
    }

    async fn create_login_link(
        &self,
        account_id: &str,
        _redirect_url: &str,
    ) -> Result<String, ProcessorError> {
        if !self.accounts.lock().unwrap().contains_key(account_id) {
            return Err(ProcessorError::ResourceMissing(format!(
                "No such account: '{account_id}'"
            )));
        }
        Ok(format!("https://connect.example/express/{account_id}"))
    }

    async fn create_payment_intent(
        &self,
        request: IntentRequest,
    ) -> Result<IntentHandle, ProcessorError> {
        if let Some(message) = self.fail_intents_with.lock().unwrap().clone() {
            return Err(ProcessorError::Api(message));
        }

        self.intents.lock().unwrap().push(request);
        let id = self.next_id();
        Ok(IntentHandle {
            payment_intent_id: format!("pi_test{id}"),
            client_secret: format!("pi_test{id}_secret"),
        })
    }

    async fn delete_account(&self, account_id: &str) -> Result<String, ProcessorError> {
        match self.accounts.lock().unwrap().remove(account_id) {
            Some(snapshot) => {
                self.deleted.lock().unwrap().push(snapshot.id.clone());
                Ok(snapshot.id)
            }
            None => Err(ProcessorError::ResourceMissing(format!(
                "No such account: '{account_id}'"
            ))),
        }
    }
}

#[allow(dead_code)]
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// App state wired to a test database pool and a substitute processor.
#[allow(dead_code)]
pub fn test_app_state(pool: PgPool, processor: Arc<dyn PaymentProcessor>) -> AppState {
    AppState {
        pool,
        stripe_config: Some(test_stripe_config()),
        processor: Some(processor),
    }
}

#[allow(dead_code)]
pub fn test_stripe_config() -> StripeConfig {
    StripeConfig {
        client: stripe::Client::new("sk_test_placeholder"),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        platform_fee_rate: Decimal::new(3, 2),
        base_url: "http://localhost:3000".to_string(),
    }
}

/// Insert a bar row, optionally pre-linked to a processor account (which
/// starts at `pending`, matching how onboarding links an account).
#[allow(dead_code)]
pub fn insert_bar(pool: &PgPool, name: &str, connect_account_id: Option<&str>) -> Bar {
    use barpay::schema::bars;

    let mut conn = pool.get().expect("pool connection");
    let status = connect_account_id.map(|_| BarConnectStatus::Pending);
    let model: BarModel = diesel::insert_into(bars::table)
        .values((
            bars::name.eq(name),
            bars::owner_id.eq(Uuid::new_v4()),
            bars::connect_account_id.eq(connect_account_id.map(|id| id.to_string())),
            bars::connect_account_status.eq(status),
        ))
        .returning(BarModel::as_returning())
        .get_result(&mut conn)
        .expect("insert bar");
    model.into()
}

/// Sign a webhook payload the way the processor does: HMAC-SHA256 over
/// `"{timestamp}.{payload}"` with the endpoint secret, presented as a
/// `t=<ts>,v1=<hex>` header value.
#[allow(dead_code)]
pub fn sign_webhook_payload(payload: &str, secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let timestamp = chrono::Utc::now().timestamp();
    let signed = format!("{timestamp}.{payload}");
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signed.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

// Embed migrations at compile time
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

// Ensure migrations only run once per test session
static MIGRATIONS_RUN: Once = Once::new();

/// Ensures the template database exists and has the latest migrations
/// applied. Called automatically by `TestDatabase::new()`; runs once per
/// test session.
fn ensure_template_migrated() {
    MIGRATIONS_RUN.call_once(|| {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/barpay_test".to_string());

        // Connect to postgres database for admin operations
        let admin_url = base_url
            .replace("/barpay_test", "/postgres")
            .replace("/barpay_test_template", "/postgres");

        let template_url = base_url.replace("/barpay_test", "/barpay_test_template");

        // Create template database if it doesn't exist
        if let Ok(mut admin_conn) = PgConnection::establish(&admin_url) {
            let exists: Result<bool, _> = diesel::sql_query(
                "SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = 'barpay_test_template')",
            )
            .get_result::<TemplateExists>(&mut admin_conn)
            .map(|r| r.exists);

            if exists != Ok(true) {
                let _ = diesel::sql_query("CREATE DATABASE barpay_test_template")
                    .execute(&mut admin_conn);
            }

            // Unmark as template temporarily to allow connections for migrations
            let _ = diesel::sql_query(
                "UPDATE pg_database SET datistemplate = FALSE, datallowconn = TRUE \
                 WHERE datname = 'barpay_test_template'",
            )
            .execute(&mut admin_conn);

            drop(admin_conn);
        }

        // Run pending migrations on template
        if let Ok(mut template_conn) = PgConnection::establish(&template_url) {
            match template_conn.run_pending_migrations(MIGRATIONS) {
                Ok(applied) => {
                    if !applied.is_empty() {
                        eprintln!("Applied {} migration(s) to test template", applied.len());
                    }
                }
                Err(e) => {
                    eprintln!("Warning: Failed to run migrations on template: {}", e);
                }
            }

            // Close the connection before re-marking the template
            drop(template_conn);
        }

        // Small delay so PostgreSQL fully releases the connection; prevents
        // "source database is being accessed by other users" when tests run
        // in parallel
        thread::sleep(Duration::from_millis(50));

        // Re-mark as template
        if let Ok(mut admin_conn) = PgConnection::establish(&admin_url) {
            let _ = diesel::sql_query(
                "UPDATE pg_database SET datistemplate = TRUE, datallowconn = FALSE \
                 WHERE datname = 'barpay_test_template'",
            )
            .execute(&mut admin_conn);

            drop(admin_conn);
        }

        thread::sleep(Duration::from_millis(20));
    });
}

#[derive(QueryableByName)]
struct TemplateExists {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    exists: bool,
}

/// Manages an isolated test database created from a template.
///
/// Each instance creates a unique database from `barpay_test_template` and
/// drops it on `Drop`, so cleanup happens even when a test panics. Requires
/// PostgreSQL 13+ for `DROP DATABASE ... WITH (FORCE)`.
pub struct TestDatabase {
    /// The name of the test database (e.g., "barpay_test_a7b3f9x2k4m1")
    db_name: String,
    /// Connection pool for the test database
    pool: PgPool,
    /// Admin database URL for cleanup operations (connects to 'postgres')
    admin_url: String,
}

impl TestDatabase {
    /// Creates a new isolated test database from the template.
    pub async fn new() -> Result<Self> {
        ensure_template_migrated();

        dotenvy::dotenv().ok();

        let base_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/barpay_test".to_string());

        let (admin_url, db_name) = Self::generate_database_info(&base_url)?;

        Self::create_database(&admin_url, &db_name)
            .await
            .context("Failed to create test database from template")?;

        let test_db_url = Self::build_database_url(&base_url, &db_name);

        let manager = ConnectionManager::<PgConnection>::new(&test_db_url);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .with_context(|| format!("Failed to create connection pool for {}", db_name))?;

        Ok(TestDatabase {
            db_name,
            pool,
            admin_url,
        })
    }

    /// Returns a clone of the connection pool for this test database.
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// Returns the database name for debugging purposes.
    #[allow(dead_code)]
    pub fn name(&self) -> &str {
        &self.db_name
    }

    /// Generates a unique database name and admin URL.
    ///
    /// Returns (admin_url, db_name) tuple.
    fn generate_database_info(base_url: &str) -> Result<(String, String)> {
        use rand::RngCore;
        let mut rng = rand::rng();
        let random_bytes: u64 = rng.next_u64();
        let suffix = format!("{:016x}", random_bytes);

        let db_name = format!("barpay_test_{}", suffix);

        let admin_url = base_url
            .replace("/barpay_test", "/postgres")
            .replace("/barpay_test_template", "/postgres");

        Ok((admin_url, db_name))
    }

    /// Builds a database URL for the test database.
    fn build_database_url(base_url: &str, db_name: &str) -> String {
        base_url
            .replace("/barpay_test", &format!("/{}", db_name))
            .replace("/barpay_test_template", &format!("/{}", db_name))
    }

    /// Creates a new database from the template.
    ///
    /// Uses a file-based lock to serialize template cloning; concurrent
    /// clones fail with "source database is being accessed by other users".
    async fn create_database(admin_url: &str, db_name: &str) -> Result<()> {
        use diesel::Connection;
        use fs2::FileExt;
        use std::fs::OpenOptions;

        let admin_url = admin_url.to_string();
        let db_name = db_name.to_string();

        tokio::task::spawn_blocking(move || {
            let lock_path = std::env::temp_dir().join("barpay_test_template.lock");
            let lock_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)
                .context("Failed to create lock file for template database cloning")?;

            lock_file
                .lock_exclusive()
                .context("Failed to acquire lock for template database cloning")?;

            let mut conn = PgConnection::establish(&admin_url).context(
                "Failed to connect to PostgreSQL for database creation. Is PostgreSQL running?",
            )?;

            // Terminate lingering connections to the template before cloning
            let terminate_sql = "
                SELECT pg_terminate_backend(pg_stat_activity.pid)
                FROM pg_stat_activity
                WHERE pg_stat_activity.datname = 'barpay_test_template'
                  AND pid <> pg_backend_pid()
            ";

            diesel::sql_query(terminate_sql)
                .execute(&mut conn)
                .context("Failed to terminate connections to template database")?;

            // db_name is randomly generated hex, safe from SQL injection
            let create_sql = format!(
                "CREATE DATABASE \"{}\" TEMPLATE barpay_test_template",
                db_name
            );

            let result = diesel::sql_query(&create_sql)
                .execute(&mut conn)
                .with_context(|| {
                    format!(
                        "Failed to create database '{}' from the \
                         'barpay_test_template' template",
                        db_name
                    )
                });

            drop(lock_file);

            result?;
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("Database creation task panicked")?
    }

    /// Drops the test database.
    fn cleanup(&self) {
        use diesel::Connection;
        use std::panic::AssertUnwindSafe;

        let db_name = self.db_name.clone();
        let admin_url = self.admin_url.clone();

        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let mut conn = PgConnection::establish(&admin_url).ok()?;

            let drop_sql = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", db_name);

            diesel::sql_query(&drop_sql).execute(&mut conn).ok()
        }));

        if result.is_err() {
            eprintln!(
                "Warning: Failed to drop test database '{}'. \
                 You may need to manually clean up: DROP DATABASE {};",
                self.db_name, self.db_name
            );
        }
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        self.cleanup();
    }
}
