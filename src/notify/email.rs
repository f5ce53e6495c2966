//! Email delivery over plain SMTP
//!
//! A deliberately small client: EHLO, MAIL FROM, RCPT TO, DATA, QUIT with
//! reply-code checks at each step. Alerts are short plain-text messages to
//! a relay on the local network; submission auth and STARTTLS are the
//! relay's concern, not this monitor's.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::alert::AlertEvent;
use crate::config::EmailChannelConfig;

use super::DeliveryError;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn send_alert(
    config: &EmailChannelConfig,
    event: &AlertEvent,
) -> Result<(), DeliveryError> {
    if config.to_emails.is_empty() {
        return Err(DeliveryError::Rejected("no recipients configured".into()));
    }

    let addr = format!("{}:{}", config.smtp_host, config.smtp_port);
    match timeout(SMTP_TIMEOUT, send_message(&addr, config, event)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Connect(format!(
            "smtp conversation timed out after {}s",
            SMTP_TIMEOUT.as_secs()
        ))),
    }
}

async fn send_message(
    addr: &str,
    config: &EmailChannelConfig,
    event: &AlertEvent,
) -> Result<(), DeliveryError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| DeliveryError::Connect(e.to_string()))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).lines();

    expect_reply(&mut reader, 220).await?;

    send_line(&mut write_half, &format!("EHLO {}", config.helo_domain)).await?;
    expect_reply(&mut reader, 250).await?;

    send_line(&mut write_half, &format!("MAIL FROM:<{}>", config.from_email)).await?;
    expect_reply(&mut reader, 250).await?;

    for recipient in &config.to_emails {
        send_line(&mut write_half, &format!("RCPT TO:<{recipient}>")).await?;
        let code = read_reply(&mut reader).await?;
        if code != 250 && code != 251 {
            return Err(DeliveryError::Rejected(format!(
                "recipient {recipient} refused with code {code}"
            )));
        }
    }

    send_line(&mut write_half, "DATA").await?;
    expect_reply(&mut reader, 354).await?;

    let payload = format_message(config, event);
    for line in payload.lines() {
        // Dot-stuffing: a leading '.' would otherwise end the DATA section
        if line.starts_with('.') {
            send_line(&mut write_half, &format!(".{line}")).await?;
        } else {
            send_line(&mut write_half, line).await?;
        }
    }
    send_line(&mut write_half, ".").await?;
    expect_reply(&mut reader, 250).await?;

    send_line(&mut write_half, "QUIT").await?;
    debug!(addr = %addr, rule = %event.rule, "Email accepted by relay");
    Ok(())
}

async fn send_line(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    line: &str,
) -> Result<(), DeliveryError> {
    write_half
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .map_err(|e| DeliveryError::Io(e.to_string()))
}

/// Read one SMTP reply, skipping "250-..." continuation lines
async fn read_reply(
    reader: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
) -> Result<u16, DeliveryError> {
    loop {
        let line = reader
            .next_line()
            .await
            .map_err(|e| DeliveryError::Io(e.to_string()))?
            .ok_or_else(|| DeliveryError::Io("server closed connection".into()))?;

        if line.len() < 3 {
            return Err(DeliveryError::Io(format!("malformed smtp reply: {line}")));
        }
        let code = line[..3]
            .parse::<u16>()
            .map_err(|_| DeliveryError::Io(format!("malformed smtp reply: {line}")))?;

        if line.as_bytes().get(3) == Some(&b'-') {
            continue;
        }
        return Ok(code);
    }
}

async fn expect_reply(
    reader: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    expected: u16,
) -> Result<(), DeliveryError> {
    let code = read_reply(reader).await?;
    if code == expected {
        Ok(())
    } else {
        Err(DeliveryError::Rejected(format!(
            "expected reply {expected}, got {code}"
        )))
    }
}

pub fn format_subject(event: &AlertEvent) -> String {
    format!(
        "PostgreSQL HA alert: {}",
        event.severity.to_string().to_uppercase()
    )
}

pub fn format_body(event: &AlertEvent) -> String {
    let lag = match event.values.max_lag_bytes {
        Some(bytes) => format!("{bytes} bytes"),
        None => "n/a".to_string(),
    };
    format!(
        "PostgreSQL HA cluster alert\n\
         \n\
         Severity: {}\n\
         Rule: {}\n\
         Time: {} (unix)\n\
         \n\
         {}\n\
         \n\
         Cluster status:\n\
         - Writer nodes: {}\n\
         - Replica nodes: {}\n\
         - Unhealthy nodes: {}\n\
         - Max replication lag: {}\n\
         - Failover ready: {}\n",
        event.severity.to_string().to_uppercase(),
        event.rule,
        event.snapshot_epoch_secs,
        event.message,
        event.values.writer_count,
        event.values.replica_count,
        event.values.unhealthy_count,
        lag,
        event.values.failover_ready,
    )
}

fn format_message(config: &EmailChannelConfig, event: &AlertEvent) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\n\r\n{}",
        config.from_email,
        config.to_emails.join(", "),
        format_subject(event),
        format_body(event),
    )
}
