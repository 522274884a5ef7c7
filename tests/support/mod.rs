use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use talentgate::gateway::{
    ChargeOutcome, GatewayError, PaymentGateway, RefundOutcome,
};
use talentgate::models::PaymentRecord;
use talentgate::plans::PlanTable;
use talentgate::AppState;

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

pub async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    let test_url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url).await.expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    let create_result = sqlx::query(&create_sql).execute(&admin_pool).await;
    if let Err(e) = create_result {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    TestDb { pool, _guard: guard }
}

#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    Approve,
    Decline,
    Unreachable,
}

/// Шлюз-мок: считает вызовы, умеет задерживать ответ (для гонок).
pub struct MockGateway {
    behavior: MockBehavior,
    delay: Option<Duration>,
    charge_calls: AtomicUsize,
    refund_calls: AtomicUsize,
}

impl MockGateway {
    pub fn approving() -> Arc<Self> {
        Arc::new(Self::new(MockBehavior::Approve, None))
    }

    pub fn declining() -> Arc<Self> {
        Arc::new(Self::new(MockBehavior::Decline, None))
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self::new(MockBehavior::Unreachable, None))
    }

    pub fn approving_with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(MockBehavior::Approve, Some(delay)))
    }

    fn new(behavior: MockBehavior, delay: Option<Duration>) -> Self {
        MockGateway {
            behavior,
            delay,
            charge_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
        }
    }

    pub fn charge_calls(&self) -> usize {
        self.charge_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, payment: &PaymentRecord) -> Result<ChargeOutcome, GatewayError> {
        let n = self.charge_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.behavior {
            MockBehavior::Approve => Ok(ChargeOutcome::Approved {
                transaction_id: format!("TXN-{}-{n}", payment.payment_id),
            }),
            MockBehavior::Decline => Ok(ChargeOutcome::Declined {
                reason: "card declined".to_string(),
            }),
            MockBehavior::Unreachable => {
                Err(GatewayError::Unreachable("connect timeout".to_string()))
            }
        }
    }

    async fn refund(&self, _payment: &PaymentRecord) -> Result<RefundOutcome, GatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MockBehavior::Approve => Ok(RefundOutcome::Approved),
            MockBehavior::Decline => Ok(RefundOutcome::Declined {
                reason: "refund window closed".to_string(),
            }),
            MockBehavior::Unreachable => {
                Err(GatewayError::Unreachable("connect timeout".to_string()))
            }
        }
    }
}

pub fn build_state(pool: PgPool, gateway: Arc<dyn PaymentGateway>) -> AppState {
    AppState {
        pool,
        plans: PlanTable::defaults(),
        gateway,
        merchant_id: "MERCH-TEST".to_string(),
        merchant_name: "TalentGate Test".to_string(),
        merchant_secret: "test-merchant-secret".to_string(),
        notify_webhook_url: None,
    }
}

pub async fn create_recruiter(pool: &PgPool, suffix: &str) -> i32 {
    use sqlx::Row;

    sqlx::query(
        r#"INSERT INTO recruiters (email, password_hash, company_name)
           VALUES ($1, $2, $3)
           RETURNING id"#,
    )
    .bind(format!("recruiter_{suffix}@talentgate.test"))
    .bind("test-hash")
    .bind("Test Staffing Ltd")
    .fetch_one(pool)
    .await
    .expect("insert recruiter")
    .get("id")
}
