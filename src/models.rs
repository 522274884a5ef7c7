// src/models.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentRecord {
    pub id: i32,
    pub payment_id: String,
    pub recruiter_id: i32,
    pub plan_id: String,
    /// NUMERIC в БД, текст в Rust.
    pub amount: String,
    pub currency: String,
    #[schema(value_type = String)]
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionRecord {
    pub id: i32,
    pub recruiter_id: i32,
    pub plan_id: String,
    pub payment_id: String,
    pub amount: String,
    #[schema(value_type = String)]
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    /// Эффективный статус: активная подписка с истёкшим end_date читается
    /// как expired. Хранилище при этом не трогаем — сброс делает sweep.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        if self.status == SubscriptionStatus::Active && self.end_date <= now {
            SubscriptionStatus::Expired
        } else {
            self.status
        }
    }
}

/// Публичный профиль рекрутера (без password_hash).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecruiterProfile {
    pub id: i32,
    pub email: String,
    pub company_name: Option<String>,
    pub is_premium: bool,
    pub subscription_id: Option<i32>,
    pub max_jobs: i32,
    pub max_candidates: i32,
    pub max_team_members: i32,
    pub support_level: String,
}
