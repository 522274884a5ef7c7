// src/qr.rs
//
// Платёжный QR: JSON-метаданные платежа, подписанные HMAC-SHA256,
// отрисованные в SVG и упакованные в data URI. Кошелёк покупателя
// сканирует код и сам инициирует оплату в шлюзе.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub payment_id: String,
    pub amount: String,
    pub plan_id: String,
    pub timestamp: DateTime<Utc>,
    pub merchant_id: String,
    pub merchant_name: String,
    pub currency: String,
    /// HMAC-SHA256(hex) от "paymentId|amount|planId" секретом мерчанта.
    pub signature: String,
}

/// HMAC-SHA256 в hex.
pub fn sign_hmac_sha256_hex(secret: &str, data: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    let result = mac.finalize().into_bytes();
    hex::encode(result)
}

pub fn signing_input(payment_id: &str, amount: &str, plan_id: &str) -> String {
    format!("{payment_id}|{amount}|{plan_id}")
}

#[derive(Debug)]
pub enum QrError {
    Encode(String),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for QrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QrError::Encode(e) => write!(f, "qr encode error: {e}"),
            QrError::Serialize(e) => write!(f, "qr payload serialize error: {e}"),
        }
    }
}

/// SVG data URI с QR-кодом платёжного payload-а.
pub fn render_data_uri(payload: &QrPayload) -> Result<String, QrError> {
    let json = serde_json::to_string(payload).map_err(QrError::Serialize)?;

    let code = QrCode::new(json.as_bytes()).map_err(|e| QrError::Encode(e.to_string()))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .build();

    Ok(format!(
        "data:image/svg+xml;base64,{}",
        BASE64.encode(image.as_bytes())
    ))
}
