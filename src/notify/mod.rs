//! Notification delivery
//!
//! A fired alert is handed to every enabled channel independently; one
//! channel failing never prevents the others from being attempted and
//! never propagates out of `dispatch`. There is no retry within a
//! dispatch call: the next cycle's evaluation decides whether to notify
//! again.

mod email;
mod webhook;

use futures::future::join_all;
use tracing::{info, warn};

use crate::alert::AlertEvent;
use crate::config::{ChannelsConfig, EmailChannelConfig, WebhookChannelConfig};

pub use email::{format_body, format_subject};

/// A configured delivery channel
#[derive(Debug, Clone)]
pub enum NotificationChannel {
    Email(EmailChannelConfig),
    Webhook(WebhookChannelConfig),
}

impl NotificationChannel {
    /// Build the channel list from configuration
    pub fn from_config(channels: &ChannelsConfig) -> Vec<Self> {
        let mut out = Vec::new();
        if let Some(email) = &channels.email {
            out.push(Self::Email(email.clone()));
        }
        for webhook in &channels.webhook {
            out.push(Self::Webhook(webhook.clone()));
        }
        out
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Webhook(_) => "webhook",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Email(cfg) => cfg.enabled,
            Self::Webhook(cfg) => cfg.enabled,
        }
    }

    fn target(&self) -> String {
        match self {
            Self::Email(cfg) => format!("{}:{}", cfg.smtp_host, cfg.smtp_port),
            Self::Webhook(cfg) => cfg.url.clone(),
        }
    }
}

/// Outcome of one delivery attempt on one channel
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub kind: String,
    pub target: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Deliver one event through all enabled channels, concurrently.
///
/// Always returns one result per enabled channel; never errors.
pub async fn dispatch(
    event: &AlertEvent,
    channels: &[NotificationChannel],
) -> Vec<DeliveryResult> {
    let attempts = channels
        .iter()
        .filter(|c| c.is_enabled())
        .map(|channel| async move {
            let outcome = match channel {
                NotificationChannel::Email(cfg) => email::send_alert(cfg, event).await,
                NotificationChannel::Webhook(cfg) => webhook::send_alert(cfg, event).await,
            };

            match outcome {
                Ok(()) => {
                    info!(
                        channel = channel.kind(),
                        target = %channel.target(),
                        rule = %event.rule,
                        "Alert delivered"
                    );
                    DeliveryResult {
                        kind: channel.kind().to_string(),
                        target: channel.target(),
                        success: true,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(
                        channel = channel.kind(),
                        target = %channel.target(),
                        rule = %event.rule,
                        error = %e,
                        "Alert delivery failed"
                    );
                    DeliveryResult {
                        kind: channel.kind().to_string(),
                        target: channel.target(),
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            }
        });

    join_all(attempts).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Severity, TriggerValues};

    fn test_event() -> AlertEvent {
        AlertEvent {
            rule: "no_writer".to_string(),
            severity: Severity::Critical,
            message: "no writer node found in the cluster".to_string(),
            snapshot_epoch_secs: 1_700_000_000,
            values: TriggerValues {
                writer_count: 0,
                replica_count: 2,
                unhealthy_count: 0,
                max_lag_bytes: Some(0),
                failover_ready: false,
            },
        }
    }

    fn webhook_channel(url: &str, enabled: bool) -> NotificationChannel {
        NotificationChannel::Webhook(WebhookChannelConfig {
            enabled,
            url: url.to_string(),
        })
    }

    /// Minimal HTTP endpoint that reads one request and answers 200
    async fn spawn_ok_endpoint() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                // Read headers, then the content-length body
                loop {
                    let n = stream.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(header_end) = find_header_end(&buf) {
                        let headers = String::from_utf8_lossy(&buf[..header_end]);
                        let content_length = headers
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        if buf.len() >= header_end + 4 + content_length {
                            break;
                        }
                    }
                }
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });
        format!("http://{addr}/alerts")
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    #[tokio::test]
    async fn test_dispatch_isolates_channel_failures() {
        // One channel that always fails (nothing listens on port 1) and
        // one healthy endpoint: one failure, one success, no panic.
        let good_url = spawn_ok_endpoint().await;
        let channels = vec![
            webhook_channel("http://127.0.0.1:1/alerts", true),
            webhook_channel(&good_url, true),
        ];

        let results = dispatch(&test_event(), &channels).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.is_some());
        assert!(results[1].success);
        assert!(results[1].error.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_skips_disabled_channels() {
        let channels = vec![webhook_channel("http://127.0.0.1:1/alerts", false)];
        let results = dispatch(&test_event(), &channels).await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_from_config_collects_all_channels() {
        let config: crate::config::Config = toml::from_str(
            r#"
[channels.email]
to_emails = ["oncall@example.com"]

[[channels.webhook]]
url = "http://hooks.internal/a"

[[channels.webhook]]
url = "http://hooks.internal/b"
"#,
        )
        .unwrap();

        let channels = NotificationChannel::from_config(&config.channels);
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].kind(), "email");
        assert_eq!(channels[1].kind(), "webhook");
        assert!(channels.iter().all(|c| c.is_enabled()));
    }
}
