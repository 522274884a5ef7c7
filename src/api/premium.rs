// src/api/premium.rs
//
// Тонкий HTTP-слой над premium-сервисом: парсинг запроса, маппинг ошибок
// в статусы, единый формат неудачи {success: false, message}.

use actix_web::http::StatusCode;
use actix_web::web::ReqData;
use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::premium::{self, PremiumError, RefundResult, VerifyOutcome};
use crate::AppState;

pub fn status_for(e: &PremiumError) -> StatusCode {
    match e {
        PremiumError::InvalidPlan(_)
        | PremiumError::InvalidAmount { .. }
        | PremiumError::PaymentNotVerified { .. }
        | PremiumError::NotCompleted { .. } => StatusCode::BAD_REQUEST,
        PremiumError::RecruiterNotFound(_)
        | PremiumError::PaymentNotFound(_)
        | PremiumError::NoActiveSubscription => StatusCode::NOT_FOUND,
        PremiumError::Qr(_) | PremiumError::Gateway(_) | PremiumError::Db(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(e: &PremiumError) -> HttpResponse {
    let code = status_for(e);
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("premium error: {e}");
    }
    // текст ошибки как есть, без стектрейсов
    HttpResponse::build(code).json(json!({
        "success": false,
        "message": e.to_string(),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQrRequest {
    pub plan_id: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub payment_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    pub profile_id: i32,
    pub plan_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub profile_id: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub payment_id: String,
}

/// Создаёт pending-платёж и возвращает QR для оплаты тарифа.
#[utoipa::path(
    post,
    path = "/premium/generate-qr",
    tag = "premium",
    request_body = GenerateQrRequest,
    responses(
        (status = 200, description = "{success, qrCode, paymentId}"),
        (status = 400, description = "unknown plan or wrong amount")
    )
)]
#[post("/generate-qr")]
pub async fn generate_qr(
    state: web::Data<AppState>,
    recruiter_id: ReqData<i32>,
    payload: web::Json<GenerateQrRequest>,
) -> impl Responder {
    match premium::request_payment_qr(&state, *recruiter_id, &payload.plan_id, payload.amount)
        .await
    {
        Ok(qr) => HttpResponse::Ok().json(json!({
            "success": true,
            "qrCode": qr.qr_code,
            "paymentId": qr.payment_id,
        })),
        Err(e) => error_response(&e),
    }
}

/// Сверяет платёж со шлюзом. Отказ шлюза — не ошибка HTTP:
/// 200 + success:false.
#[utoipa::path(
    post,
    path = "/premium/verify-payment",
    tag = "premium",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "{success, message}"),
        (status = 404, description = "unknown paymentId")
    )
)]
#[post("/verify-payment")]
pub async fn verify_payment(
    state: web::Data<AppState>,
    payload: web::Json<VerifyPaymentRequest>,
) -> impl Responder {
    match premium::verify_payment(&state, &payload.payment_id).await {
        Ok(VerifyOutcome::Completed { .. }) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "payment verified",
        })),
        Ok(VerifyOutcome::AlreadyCompleted) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "payment already verified",
        })),
        Ok(VerifyOutcome::Declined { reason }) => HttpResponse::Ok().json(json!({
            "success": false,
            "message": reason,
        })),
        Err(e) => error_response(&e),
    }
}

#[utoipa::path(
    post,
    path = "/premium/upgrade",
    tag = "premium",
    request_body = UpgradeRequest,
    responses(
        (status = 200, description = "{success, profile, subscription}"),
        (status = 400, description = "no verified payment for plan"),
        (status = 404, description = "unknown recruiter")
    )
)]
#[post("/upgrade")]
pub async fn upgrade(
    state: web::Data<AppState>,
    payload: web::Json<UpgradeRequest>,
) -> impl Responder {
    match premium::upgrade_profile(&state, payload.profile_id, &payload.plan_id).await {
        Ok((profile, subscription)) => HttpResponse::Ok().json(json!({
            "success": true,
            "profile": profile,
            "subscription": subscription,
        })),
        Err(e) => error_response(&e),
    }
}

#[utoipa::path(
    get,
    path = "/premium/status/{profile_id}",
    tag = "premium",
    responses(
        (status = 200, description = "{success, isPremium, plan, expiryDate}"),
        (status = 404, description = "unknown recruiter")
    )
)]
#[get("/status/{profile_id}")]
pub async fn status(state: web::Data<AppState>, path: web::Path<i32>) -> impl Responder {
    match premium::get_status(&state, path.into_inner()).await {
        Ok(s) => HttpResponse::Ok().json(json!({
            "success": true,
            "isPremium": s.is_premium,
            "plan": s.plan,
            "expiryDate": s.expiry_date,
        })),
        Err(e) => error_response(&e),
    }
}

#[utoipa::path(
    post,
    path = "/premium/cancel",
    tag = "premium",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "{success, message}"),
        (status = 404, description = "no active subscription")
    )
)]
#[post("/cancel")]
pub async fn cancel(
    state: web::Data<AppState>,
    payload: web::Json<CancelRequest>,
) -> impl Responder {
    match premium::cancel_subscription(&state, payload.profile_id).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "subscription cancelled",
        })),
        Err(e) => error_response(&e),
    }
}

/// Возврат по завершённому платежу. Подписку не откатывает.
#[utoipa::path(
    post,
    path = "/premium/refund",
    tag = "premium",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "{success, message}"),
        (status = 400, description = "payment is not completed"),
        (status = 404, description = "unknown paymentId")
    )
)]
#[post("/refund")]
pub async fn refund(
    state: web::Data<AppState>,
    payload: web::Json<RefundRequest>,
) -> impl Responder {
    match premium::process_refund(&state, &payload.payment_id).await {
        Ok(RefundResult::Refunded) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "payment refunded",
        })),
        Ok(RefundResult::Declined { reason }) => HttpResponse::Ok().json(json!({
            "success": false,
            "message": reason,
        })),
        Err(e) => error_response(&e),
    }
}
