// src/premium.rs
//
// Ядро premium-подписок: платёж -> verify -> entitlement -> cancel/refund.
// Все операции ходят в БД; статусные переходы делаются условными UPDATE
// под row-lock, чтобы гонки на одном payment_id не раздваивали списание.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::gateway::{ChargeOutcome, GatewayError, RefundOutcome};
use crate::models::{PaymentStatus, RecruiterProfile, SubscriptionRecord, SubscriptionStatus};
use crate::plans::format_price;
use crate::{db, notify, qr, AppState};

#[derive(Debug)]
pub enum PremiumError {
    InvalidPlan(String),
    InvalidAmount { expected: String, got: String },
    RecruiterNotFound(i32),
    PaymentNotFound(String),
    NoActiveSubscription,
    /// Нет completed-платежа за этот тариф — апгрейд без оплаты закрыт.
    PaymentNotVerified { plan_id: String },
    NotCompleted { payment_id: String, status: PaymentStatus },
    Qr(qr::QrError),
    Gateway(GatewayError),
    Db(sqlx::Error),
}

impl fmt::Display for PremiumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PremiumError::InvalidPlan(plan) => write!(f, "unknown plan: {plan}"),
            PremiumError::InvalidAmount { expected, got } => {
                write!(f, "invalid amount: expected {expected}, got {got}")
            }
            PremiumError::RecruiterNotFound(id) => write!(f, "recruiter {id} not found"),
            PremiumError::PaymentNotFound(id) => write!(f, "payment {id} not found"),
            PremiumError::NoActiveSubscription => write!(f, "no active subscription"),
            PremiumError::PaymentNotVerified { plan_id } => {
                write!(f, "no verified payment for plan {plan_id}")
            }
            PremiumError::NotCompleted { payment_id, status } => {
                write!(
                    f,
                    "payment {payment_id} is {}, refund needs completed",
                    status.as_str()
                )
            }
            PremiumError::Qr(e) => write!(f, "{e}"),
            PremiumError::Gateway(e) => write!(f, "{e}"),
            PremiumError::Db(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl From<sqlx::Error> for PremiumError {
    fn from(value: sqlx::Error) -> Self {
        Self::Db(value)
    }
}

impl From<GatewayError> for PremiumError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl From<qr::QrError> for PremiumError {
    fn from(value: qr::QrError) -> Self {
        Self::Qr(value)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentQr {
    pub payment_id: String,
    pub qr_code: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Completed { transaction_id: String },
    /// Повторный verify уже завершённого платежа: успех без похода в шлюз.
    AlreadyCompleted,
    Declined { reason: String },
}

#[derive(Debug, PartialEq, Eq)]
pub enum RefundResult {
    Refunded,
    Declined { reason: String },
}

#[derive(Debug, Serialize)]
pub struct PremiumStatus {
    pub is_premium: bool,
    pub plan: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// timestamp + случайный суффикс, как и раньше генерил фронтовый портал.
pub fn new_payment_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("PAY-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Создаёт pending-платёж и подписанный QR для кошелька покупателя.
/// При неверной сумме ничего не сохраняется.
pub async fn request_payment_qr(
    state: &AppState,
    recruiter_id: i32,
    plan_id: &str,
    amount: f64,
) -> Result<PaymentQr, PremiumError> {
    let plan = state
        .plans
        .get(plan_id)
        .ok_or_else(|| PremiumError::InvalidPlan(plan_id.to_string()))?;

    if (amount - plan.price).abs() > 1e-9 {
        return Err(PremiumError::InvalidAmount {
            expected: format_price(plan.price),
            got: format_price(amount),
        });
    }

    let payment_id = new_payment_id();
    let amount_str = format_price(plan.price);

    let signature = qr::sign_hmac_sha256_hex(
        &state.merchant_secret,
        &qr::signing_input(&payment_id, &amount_str, plan_id),
    );
    let payload = qr::QrPayload {
        payment_id: payment_id.clone(),
        amount: amount_str.clone(),
        plan_id: plan_id.to_string(),
        timestamp: Utc::now(),
        merchant_id: state.merchant_id.clone(),
        merchant_name: state.merchant_name.clone(),
        currency: plan.currency.clone(),
        signature,
    };
    let qr_code = qr::render_data_uri(&payload)?;

    db::insert_payment(
        &state.pool,
        &payment_id,
        recruiter_id,
        plan_id,
        &amount_str,
        &plan.currency,
    )
    .await?;

    log::info!("payment created payment_id={payment_id} recruiter_id={recruiter_id} plan={plan_id}");

    Ok(PaymentQr {
        payment_id,
        qr_code,
    })
}

/// Сверка платежа со шлюзом. Строка платежа берётся FOR UPDATE: из двух
/// конкурентных verify в шлюз уходит ровно один запрос, второй дожидается
/// коммита и видит терминальный статус. Недоступный шлюз оставляет платёж
/// pending (retry через повторный verify).
pub async fn verify_payment(
    state: &AppState,
    payment_id: &str,
) -> Result<VerifyOutcome, PremiumError> {
    let mut tx = state.pool.begin().await?;

    let payment = db::find_payment_for_update(&mut tx, payment_id)
        .await?
        .ok_or_else(|| PremiumError::PaymentNotFound(payment_id.to_string()))?;

    match payment.status {
        PaymentStatus::Completed | PaymentStatus::Refunded => {
            tx.commit().await?;
            Ok(VerifyOutcome::AlreadyCompleted)
        }
        PaymentStatus::Failed => {
            tx.commit().await?;
            Ok(VerifyOutcome::Declined {
                reason: "payment previously failed".to_string(),
            })
        }
        PaymentStatus::Pending => match state.gateway.charge(&payment).await {
            Ok(ChargeOutcome::Approved { transaction_id }) => {
                db::complete_payment(&mut tx, payment_id, &transaction_id, Utc::now()).await?;
                tx.commit().await?;
                log::info!("payment completed payment_id={payment_id} tx={transaction_id}");
                Ok(VerifyOutcome::Completed { transaction_id })
            }
            Ok(ChargeOutcome::Declined { reason }) => {
                db::fail_payment(&mut tx, payment_id).await?;
                tx.commit().await?;
                log::info!("payment declined payment_id={payment_id} reason={reason}");
                Ok(VerifyOutcome::Declined { reason })
            }
            // откат: платёж остаётся pending
            Err(e) => Err(PremiumError::Gateway(e)),
        },
    }
}

/// Выдаёт entitlement по оплаченному тарифу: новая подписка + лимиты плана
/// одной транзакцией. Уведомление шлётся после коммита и не влияет на
/// результат.
pub async fn upgrade_profile(
    state: &AppState,
    recruiter_id: i32,
    plan_id: &str,
) -> Result<(RecruiterProfile, SubscriptionRecord), PremiumError> {
    let plan = state
        .plans
        .get(plan_id)
        .ok_or_else(|| PremiumError::InvalidPlan(plan_id.to_string()))?;

    let mut tx = state.pool.begin().await?;

    db::get_recruiter_for_update(&mut tx, recruiter_id)
        .await?
        .ok_or(PremiumError::RecruiterNotFound(recruiter_id))?;

    let payment = db::find_unconsumed_completed_payment(&mut tx, recruiter_id, plan_id)
        .await?
        .ok_or_else(|| PremiumError::PaymentNotVerified {
            plan_id: plan_id.to_string(),
        })?;

    // Одна активная подписка на рекрутера: старую закрываем.
    db::cancel_active_subscriptions(&mut tx, recruiter_id).await?;

    let start_date = Utc::now();
    let end_date = start_date + Duration::days(plan.duration_days);

    let subscription = db::insert_subscription(
        &mut tx,
        recruiter_id,
        plan_id,
        &payment.payment_id,
        &payment.amount,
        start_date,
        end_date,
    )
    .await?;

    db::set_entitlement(&mut tx, recruiter_id, subscription.id, &plan.limits).await?;

    tx.commit().await?;

    log::info!(
        "profile upgraded recruiter_id={recruiter_id} plan={plan_id} subscription_id={}",
        subscription.id
    );

    notify::send_event(
        state,
        "subscription.upgraded",
        json!({
            "recruiterId": recruiter_id,
            "planId": plan_id,
            "subscriptionId": subscription.id,
            "expiryDate": subscription.end_date,
        }),
    );

    let profile = db::get_recruiter(&state.pool, recruiter_id)
        .await?
        .ok_or(PremiumError::RecruiterNotFound(recruiter_id))?;

    Ok((profile, subscription))
}

/// Чистое чтение: ничего не мутирует, просроченная активная подписка
/// отдаётся как не-premium (персистит её фоновый sweep).
pub async fn get_status(
    state: &AppState,
    recruiter_id: i32,
) -> Result<PremiumStatus, PremiumError> {
    db::get_recruiter(&state.pool, recruiter_id)
        .await?
        .ok_or(PremiumError::RecruiterNotFound(recruiter_id))?;

    let subscription = db::get_current_subscription(&state.pool, recruiter_id).await?;

    let status = match subscription {
        Some(sub) => match sub.effective_status(Utc::now()) {
            SubscriptionStatus::Active => PremiumStatus {
                is_premium: true,
                plan: Some(sub.plan_id),
                expiry_date: Some(sub.end_date),
            },
            _ => PremiumStatus {
                is_premium: false,
                plan: None,
                expiry_date: Some(sub.end_date),
            },
        },
        None => PremiumStatus {
            is_premium: false,
            plan: None,
            expiry_date: None,
        },
    };

    Ok(status)
}

/// Отзывает entitlement: подписка -> cancelled, профиль -> free tier.
pub async fn cancel_subscription(
    state: &AppState,
    recruiter_id: i32,
) -> Result<(), PremiumError> {
    let mut tx = state.pool.begin().await?;

    let recruiter = db::get_recruiter_for_update(&mut tx, recruiter_id)
        .await?
        .ok_or(PremiumError::RecruiterNotFound(recruiter_id))?;

    let subscription_id = recruiter
        .subscription_id
        .ok_or(PremiumError::NoActiveSubscription)?;

    // Просроченная, но ещё не свёрнутая sweep-ом подписка нормализуется в
    // expired, не в cancelled: отменять уже нечего.
    let subscription = db::find_subscription_by_id(&mut tx, subscription_id)
        .await?
        .ok_or(PremiumError::NoActiveSubscription)?;

    if subscription.effective_status(Utc::now()) != SubscriptionStatus::Active {
        db::expire_subscription_by_id(&mut tx, subscription_id).await?;
        db::reset_entitlement(&mut tx, recruiter_id, state.plans.free_tier()).await?;
        tx.commit().await?;
        return Err(PremiumError::NoActiveSubscription);
    }

    db::cancel_subscription_by_id(&mut tx, subscription_id).await?;
    db::reset_entitlement(&mut tx, recruiter_id, state.plans.free_tier()).await?;

    tx.commit().await?;

    log::info!(
        "subscription cancelled recruiter_id={recruiter_id} subscription_id={subscription_id}"
    );

    notify::send_event(
        state,
        "subscription.cancelled",
        json!({
            "recruiterId": recruiter_id,
            "subscriptionId": subscription_id,
        }),
    );

    Ok(())
}

/// Возврат средств. Entitlement не трогает: refund намеренно не связан с
/// откатом подписки.
pub async fn process_refund(
    state: &AppState,
    payment_id: &str,
) -> Result<RefundResult, PremiumError> {
    let mut tx = state.pool.begin().await?;

    let payment = db::find_payment_for_update(&mut tx, payment_id)
        .await?
        .ok_or_else(|| PremiumError::PaymentNotFound(payment_id.to_string()))?;

    if payment.status != PaymentStatus::Completed {
        return Err(PremiumError::NotCompleted {
            payment_id: payment_id.to_string(),
            status: payment.status,
        });
    }

    match state.gateway.refund(&payment).await {
        Ok(RefundOutcome::Approved) => {
            db::refund_payment(&mut tx, payment_id).await?;
            tx.commit().await?;
            log::info!("payment refunded payment_id={payment_id}");
            Ok(RefundResult::Refunded)
        }
        Ok(RefundOutcome::Declined { reason }) => {
            // платёж остаётся completed
            Ok(RefundResult::Declined { reason })
        }
        Err(e) => Err(PremiumError::Gateway(e)),
    }
}
