// src/expiry.rs

use std::time::Duration;

use sqlx::PgPool;

use crate::db;
use crate::plans::PlanTable;

/// Фоновая сверка подписок: active с прошедшим end_date -> expired,
/// владелец сбрасывается на free tier. Читающие операции этим не
/// занимаются — они отдают вычисленный эффективный статус.
pub async fn start_expiry_sweep(pool: PgPool, plans: PlanTable) {
    let interval_secs = std::env::var("EXPIRY_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(3600);

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        ticker.tick().await;

        match db::expire_lapsed_subscriptions(&pool, plans.free_tier()).await {
            Ok(0) => {}
            Ok(n) => log::info!("expiry sweep: {n} subscriptions expired"),
            Err(e) => log::error!("expiry sweep error: {e}"),
        }
    }
}
