// src/notify.rs
//
// Уведомления рекрутеру (почтовый сервис за вебхуком). Fire-and-forget:
// смена entitlement авторитетна, даже если письмо потерялось.

use serde_json::json;

use crate::AppState;

pub fn send_event(state: &AppState, event: &'static str, data: serde_json::Value) {
    let Some(url) = state.notify_webhook_url.clone() else {
        log::debug!("NOTIFY_WEBHOOK_URL not set, skipping {event}");
        return;
    };

    let body = json!({
        "event": event,
        "data": data,
    });

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        match client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                log::warn!("notify {event} failed status={}", resp.status());
            }
            Err(e) => {
                log::warn!("notify {event} send error: {e}");
            }
        }
    });
}
