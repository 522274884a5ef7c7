// src/db.rs

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use crate::models::{
    PaymentRecord, PaymentStatus, RecruiterProfile, SubscriptionRecord, SubscriptionStatus,
};
use crate::plans::PlanLimits;

// Статус вне домена — ошибка хранилища, а не молчаливый откат в pending:
// pending единственное состояние, из которого платёж можно списать повторно.
fn payment_from_row(r: &PgRow) -> Result<PaymentRecord, sqlx::Error> {
    let status: String = r.get("status");
    let status = PaymentStatus::parse(&status)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown payment status: {status}").into()))?;

    Ok(PaymentRecord {
        id: r.get("id"),
        payment_id: r.get("payment_id"),
        recruiter_id: r.get("recruiter_id"),
        plan_id: r.get("plan_id"),
        amount: r.get("amount"),
        currency: r.get("currency"),
        status,
        transaction_id: r.get("transaction_id"),
        paid_at: r.get("paid_at"),
        created_at: r.get("created_at"),
    })
}

fn subscription_from_row(r: &PgRow) -> Result<SubscriptionRecord, sqlx::Error> {
    let status: String = r.get("status");
    let status = SubscriptionStatus::parse(&status).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown subscription status: {status}").into())
    })?;

    Ok(SubscriptionRecord {
        id: r.get("id"),
        recruiter_id: r.get("recruiter_id"),
        plan_id: r.get("plan_id"),
        payment_id: r.get("payment_id"),
        amount: r.get("amount"),
        status,
        start_date: r.get("start_date"),
        end_date: r.get("end_date"),
        cancelled_at: r.get("cancelled_at"),
        created_at: r.get("created_at"),
    })
}

fn recruiter_from_row(r: &PgRow) -> RecruiterProfile {
    RecruiterProfile {
        id: r.get("id"),
        email: r.get("email"),
        company_name: r.get("company_name"),
        is_premium: r.get("is_premium"),
        subscription_id: r.get("subscription_id"),
        max_jobs: r.get("max_jobs"),
        max_candidates: r.get("max_candidates"),
        max_team_members: r.get("max_team_members"),
        support_level: r.get("support_level"),
    }
}

const PAYMENT_COLUMNS: &str = "id, payment_id, recruiter_id, plan_id, amount::text as amount, \
     currency, status, transaction_id, paid_at, created_at";

const SUBSCRIPTION_COLUMNS: &str = "id, recruiter_id, plan_id, payment_id, \
     amount::text as amount, status, start_date, end_date, cancelled_at, created_at";

pub async fn insert_payment(
    pool: &PgPool,
    payment_id: &str,
    recruiter_id: i32,
    plan_id: &str,
    amount: &str,
    currency: &str,
) -> Result<PaymentRecord, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"INSERT INTO payments (payment_id, recruiter_id, plan_id, amount, currency, status)
           VALUES ($1, $2, $3, $4::numeric, $5, 'pending')
           RETURNING {PAYMENT_COLUMNS}"#,
    ))
    .bind(payment_id)
    .bind(recruiter_id)
    .bind(plan_id)
    .bind(amount)
    .bind(currency)
    .fetch_one(pool)
    .await?;

    payment_from_row(&row)
}

/// Читает платёж с блокировкой строки. Конкурентные verify на одном
/// payment_id сериализуются здесь (см. premium::verify_payment).
pub async fn find_payment_for_update(
    conn: &mut PgConnection,
    payment_id: &str,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1 FOR UPDATE"#,
    ))
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(payment_from_row).transpose()
}

/// pending -> completed, строго однократно.
pub async fn complete_payment(
    conn: &mut PgConnection,
    payment_id: &str,
    transaction_id: &str,
    paid_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE payments
           SET status = 'completed', transaction_id = $1, paid_at = $2
           WHERE payment_id = $3 AND status = 'pending'"#,
    )
    .bind(transaction_id)
    .bind(paid_at)
    .bind(payment_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// pending -> failed.
pub async fn fail_payment(conn: &mut PgConnection, payment_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE payments SET status = 'failed'
           WHERE payment_id = $1 AND status = 'pending'"#,
    )
    .bind(payment_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// completed -> refunded.
pub async fn refund_payment(conn: &mut PgConnection, payment_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE payments SET status = 'refunded'
           WHERE payment_id = $1 AND status = 'completed'"#,
    )
    .bind(payment_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn get_recruiter(
    pool: &PgPool,
    recruiter_id: i32,
) -> Result<Option<RecruiterProfile>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, email, company_name, is_premium, subscription_id,
                  max_jobs, max_candidates, max_team_members, support_level
           FROM recruiters WHERE id = $1"#,
    )
    .bind(recruiter_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(recruiter_from_row))
}

pub async fn get_recruiter_for_update(
    conn: &mut PgConnection,
    recruiter_id: i32,
) -> Result<Option<RecruiterProfile>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, email, company_name, is_premium, subscription_id,
                  max_jobs, max_candidates, max_team_members, support_level
           FROM recruiters WHERE id = $1 FOR UPDATE"#,
    )
    .bind(recruiter_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.as_ref().map(recruiter_from_row))
}

/// Completed-платёж этого рекрутера за этот тариф, ещё не потраченный
/// ни на одну подписку.
pub async fn find_unconsumed_completed_payment(
    conn: &mut PgConnection,
    recruiter_id: i32,
    plan_id: &str,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"SELECT {PAYMENT_COLUMNS} FROM payments p
           WHERE p.recruiter_id = $1
             AND p.plan_id = $2
             AND p.status = 'completed'
             AND NOT EXISTS (
                 SELECT 1 FROM subscriptions s WHERE s.payment_id = p.payment_id
             )
           ORDER BY p.created_at DESC
           LIMIT 1
           FOR UPDATE"#,
    ))
    .bind(recruiter_id)
    .bind(plan_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(payment_from_row).transpose()
}

/// Смена тарифа: старая активная подписка закрывается перед созданием новой.
pub async fn cancel_active_subscriptions(
    conn: &mut PgConnection,
    recruiter_id: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE subscriptions SET status = 'cancelled', cancelled_at = NOW()
           WHERE recruiter_id = $1 AND status = 'active'"#,
    )
    .bind(recruiter_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn find_subscription_by_id(
    conn: &mut PgConnection,
    subscription_id: i32,
) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 FOR UPDATE"#,
    ))
    .bind(subscription_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(subscription_from_row).transpose()
}

pub async fn expire_subscription_by_id(
    conn: &mut PgConnection,
    subscription_id: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE subscriptions SET status = 'expired'
           WHERE id = $1 AND status = 'active'"#,
    )
    .bind(subscription_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn cancel_subscription_by_id(
    conn: &mut PgConnection,
    subscription_id: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE subscriptions SET status = 'cancelled', cancelled_at = NOW()
           WHERE id = $1 AND status = 'active'"#,
    )
    .bind(subscription_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_subscription(
    conn: &mut PgConnection,
    recruiter_id: i32,
    plan_id: &str,
    payment_id: &str,
    amount: &str,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Result<SubscriptionRecord, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"INSERT INTO subscriptions
               (recruiter_id, plan_id, payment_id, amount, status, start_date, end_date)
           VALUES ($1, $2, $3, $4::numeric, 'active', $5, $6)
           RETURNING {SUBSCRIPTION_COLUMNS}"#,
    ))
    .bind(recruiter_id)
    .bind(plan_id)
    .bind(payment_id)
    .bind(amount)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(conn)
    .await?;

    subscription_from_row(&row)
}

/// Подписка, на которую сейчас указывает recruiters.subscription_id.
pub async fn get_current_subscription(
    pool: &PgPool,
    recruiter_id: i32,
) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT s.id, s.recruiter_id, s.plan_id, s.payment_id,
                  s.amount::text as amount, s.status, s.start_date, s.end_date,
                  s.cancelled_at, s.created_at
           FROM subscriptions s
           JOIN recruiters r ON r.subscription_id = s.id
           WHERE r.id = $1"#,
    )
    .bind(recruiter_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(subscription_from_row).transpose()
}

/// Обновляет только premium-поля профиля: параллельные правки остальных
/// полей рекрутера не затираются.
pub async fn set_entitlement(
    conn: &mut PgConnection,
    recruiter_id: i32,
    subscription_id: i32,
    limits: &PlanLimits,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE recruiters
           SET is_premium = true, subscription_id = $1,
               max_jobs = $2, max_candidates = $3, max_team_members = $4,
               support_level = $5
           WHERE id = $6"#,
    )
    .bind(subscription_id)
    .bind(limits.max_jobs)
    .bind(limits.max_candidates)
    .bind(limits.max_team_members)
    .bind(&limits.support_level)
    .bind(recruiter_id)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn reset_entitlement(
    conn: &mut PgConnection,
    recruiter_id: i32,
    free_tier: &PlanLimits,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE recruiters
           SET is_premium = false, subscription_id = NULL,
               max_jobs = $1, max_candidates = $2, max_team_members = $3,
               support_level = $4
           WHERE id = $5"#,
    )
    .bind(free_tier.max_jobs)
    .bind(free_tier.max_candidates)
    .bind(free_tier.max_team_members)
    .bind(&free_tier.support_level)
    .bind(recruiter_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Явная сверка вместо ленивого expiry-на-чтении: просроченные активные
/// подписки помечаются expired, их владельцы сбрасываются на free tier.
pub async fn expire_lapsed_subscriptions(
    pool: &PgPool,
    free_tier: &PlanLimits,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"WITH lapsed AS (
               UPDATE subscriptions
               SET status = 'expired'
               WHERE status = 'active' AND end_date <= NOW()
               RETURNING id, recruiter_id
           )
           UPDATE recruiters r
           SET is_premium = false, subscription_id = NULL,
               max_jobs = $1, max_candidates = $2, max_team_members = $3,
               support_level = $4
           FROM lapsed l
           WHERE r.id = l.recruiter_id"#,
    )
    .bind(free_tier.max_jobs)
    .bind(free_tier.max_candidates)
    .bind(free_tier.max_team_members)
    .bind(&free_tier.support_level)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
