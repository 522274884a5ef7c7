// src/gateway.rs
//
// Адаптер платёжного шлюза. Реальный шлюз дергаем по HTTP (X-Api-Key);
// в тестах трейт подменяется моком.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::PaymentRecord;

#[derive(Debug)]
pub enum GatewayError {
    /// Таймаут или сетевая ошибка: платёж остаётся pending, можно повторить.
    Unreachable(String),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Unreachable(e) => write!(f, "gateway unreachable: {e}"),
            GatewayError::Api { status, body } => {
                write!(f, "gateway api error status={status} body={body}")
            }
            GatewayError::InvalidResponse(e) => write!(f, "invalid gateway response: {e}"),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        Self::Unreachable(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { transaction_id: String },
    /// Отказ шлюза — валидный исход, не ошибка.
    Declined { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Approved,
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, payment: &PaymentRecord) -> Result<ChargeOutcome, GatewayError>;
    async fn refund(&self, payment: &PaymentRecord) -> Result<RefundOutcome, GatewayError>;
}

#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
    #[serde(rename = "paymentId")]
    payment_id: &'a str,
    amount: &'a str,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,

    #[serde(rename = "transactionId")]
    transaction_id: Option<String>,

    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    status: String,

    #[serde(default)]
    reason: Option<String>,
}

/// HTTP-клиент шлюза. Создаётся один раз на процесс и живёт в AppState.
pub struct HttpPaymentGateway {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpPaymentGateway {
    /// Вызывается один раз на старте процесса. Клиент без таймаута нам не
    /// годится: он держал бы row-lock verify неограниченно долго.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("gateway http client");

        HttpPaymentGateway {
            base_url,
            api_key,
            client,
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("GATEWAY_BASE_URL").expect("GATEWAY_BASE_URL required");
        let api_key = std::env::var("GATEWAY_API_KEY").expect("GATEWAY_API_KEY required");
        let timeout_secs = std::env::var("GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        Self::new(base_url, api_key, Duration::from_secs(timeout_secs))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, payment: &PaymentRecord) -> Result<ChargeOutcome, GatewayError> {
        let resp = self
            .client
            .post(format!("{}/api/v1/charges", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&ChargeRequest {
                payment_id: &payment.payment_id,
                amount: &payment.amount,
                currency: &payment.currency,
            })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = serde_json::from_str::<ChargeResponse>(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("{e}; body={body}")))?;

        match parsed.status.as_str() {
            "approved" | "succeeded" => {
                let transaction_id = parsed.transaction_id.ok_or_else(|| {
                    GatewayError::InvalidResponse("approved without transactionId".to_string())
                })?;
                Ok(ChargeOutcome::Approved { transaction_id })
            }
            "declined" | "failed" => Ok(ChargeOutcome::Declined {
                reason: parsed
                    .reason
                    .unwrap_or_else(|| "declined by gateway".to_string()),
            }),
            other => Err(GatewayError::InvalidResponse(format!(
                "unknown charge status: {other}"
            ))),
        }
    }

    async fn refund(&self, payment: &PaymentRecord) -> Result<RefundOutcome, GatewayError> {
        let transaction_id = payment.transaction_id.as_deref().unwrap_or_default();

        let resp = self
            .client
            .post(format!("{}/api/v1/refunds", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("paymentId", payment.payment_id.as_str()),
                ("transactionId", transaction_id),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = serde_json::from_str::<RefundResponse>(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("{e}; body={body}")))?;

        match parsed.status.as_str() {
            "approved" | "refunded" => Ok(RefundOutcome::Approved),
            "declined" | "failed" => Ok(RefundOutcome::Declined {
                reason: parsed
                    .reason
                    .unwrap_or_else(|| "refund declined by gateway".to_string()),
            }),
            other => Err(GatewayError::InvalidResponse(format!(
                "unknown refund status: {other}"
            ))),
        }
    }
}
