pub mod api;
pub mod db;
pub mod docs;
pub mod expiry;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod plans;
pub mod premium;
pub mod qr;

use std::sync::Arc;

use sqlx::PgPool;

use crate::gateway::PaymentGateway;
use crate::plans::PlanTable;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub plans: PlanTable,
    /// Шлюз создаётся один раз на процесс и дальше только шарится.
    pub gateway: Arc<dyn PaymentGateway>,
    pub merchant_id: String,
    pub merchant_name: String,
    pub merchant_secret: String,
    pub notify_webhook_url: Option<String>,
}
