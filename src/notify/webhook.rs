//! Webhook delivery: one JSON POST per event

use std::time::Duration;

use crate::alert::AlertEvent;
use crate::config::WebhookChannelConfig;

use super::DeliveryError;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn send_alert(
    config: &WebhookChannelConfig,
    event: &AlertEvent,
) -> Result<(), DeliveryError> {
    let client = reqwest::Client::builder()
        .timeout(WEBHOOK_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let response = client
        .post(&config.url)
        .json(event)
        .send()
        .await
        .map_err(|e| DeliveryError::Connect(e.to_string()))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Rejected(format!(
            "endpoint returned {}",
            response.status()
        )))
    }
}
