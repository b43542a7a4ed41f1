//! Batched, signed delivery of violations to the sanction engine

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::SanctionConfig;
use crate::telemetry::TelemetryEvent;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body
pub const SIGNATURE_HEADER: &str = "X-Signature";

const MAX_BATCH: usize = 64;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Violations waiting to be sent
#[derive(Debug, Default)]
pub struct ViolationBatch {
    events: Vec<TelemetryEvent>,
}

impl ViolationBatch {
    /// Keep the event if the sanction engine cares about it
    pub fn push(&mut self, event: TelemetryEvent) -> bool {
        if !event.kind.is_violation() {
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn take(&mut self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut self.events)
    }
}

#[derive(Serialize)]
struct BatchBody<'a> {
    sent_at: DateTime<Utc>,
    events: &'a [TelemetryEvent],
}

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, SanctionError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SanctionError::InvalidKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a hex signature produced by [`sign_payload`]
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Posts violation batches to the sanction webhook
#[derive(Clone)]
pub struct SanctionForwarder {
    client: Client,
    url: String,
    secret: String,
}

impl SanctionForwarder {
    pub fn new(config: &SanctionConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.url.clone(),
            secret: config.secret.clone(),
        }
    }

    /// Send one batch
    pub async fn send_batch(&self, events: &[TelemetryEvent]) -> Result<(), SanctionError> {
        let body = serde_json::to_vec(&BatchBody {
            sent_at: Utc::now(),
            events,
        })
        .map_err(SanctionError::Serialize)?;
        let signature = sign_payload(&self.secret, &body)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(SanctionError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SanctionError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn flush(&self, batch: &mut ViolationBatch) {
        if batch.is_empty() {
            return;
        }
        let events = batch.take();
        match self.send_batch(&events).await {
            Ok(()) => info!(count = events.len(), "Forwarded violations"),
            Err(e) => error!(error = %e, count = events.len(), "Dropping violation batch"),
        }
    }

    /// Forward violations from the bus until shutdown or the bus closes
    pub async fn run(
        self,
        mut events: broadcast::Receiver<TelemetryEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(url = %self.url, "Sanction forwarder started");

        let mut batch = ViolationBatch::default();
        let mut flush_timer = interval(FLUSH_INTERVAL);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        if batch.push(event) && batch.len() >= MAX_BATCH {
                            self.flush(&mut batch).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Sanction forwarder lagging, events lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = flush_timer.tick() => {
                    self.flush(&mut batch).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.flush(&mut batch).await;
        info!("Sanction forwarder stopped");
    }
}

/// Sanction delivery errors
#[derive(Debug, thiserror::Error)]
pub enum SanctionError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to encode batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid signing key")]
    InvalidKey,
}
