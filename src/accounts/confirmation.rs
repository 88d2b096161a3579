use std::{sync::Arc, time::Duration};

use anyhow::Context;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, instrument};

use crate::{broker::MessagePublisher, config::MailerConfig};

pub const CODE_LEN: usize = 30;

// 64 symbols, so a random byte masked to 6 bits picks uniformly
const CODE_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

pub fn generate_confirmation_code() -> anyhow::Result<String> {
    let mut raw = [0u8; CODE_LEN];
    OsRng
        .try_fill_bytes(&mut raw)
        .map_err(|e| anyhow::anyhow!("confirmation code generation failed: {e}"))?;
    Ok(raw
        .iter()
        .map(|b| CODE_ALPHABET[(b & 0x3f) as usize] as char)
        .collect())
}

/// Event consumed by the out-of-process mailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationMessage {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Code")]
    pub code: String,
}

#[derive(Clone)]
pub struct ConfirmationDispatcher {
    publisher: Arc<dyn MessagePublisher>,
    exchange: String,
    routing_key: String,
    deadline: Duration,
}

impl ConfirmationDispatcher {
    pub fn new(publisher: Arc<dyn MessagePublisher>, cfg: &MailerConfig, deadline: Duration) -> Self {
        Self {
            publisher,
            exchange: cfg.exchange.clone(),
            routing_key: cfg.routing_key.clone(),
            deadline,
        }
    }

    /// Hands the event to the broker; returns once it is enqueued.
    #[instrument(skip(self, code))]
    pub async fn publish(&self, username: &str, email: &str, code: &str) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&ConfirmationMessage {
            username: username.to_owned(),
            email: email.to_owned(),
            code: code.to_owned(),
        })
        .context("serialize confirmation message")?;

        timeout(
            self.deadline,
            self.publisher
                .publish(&self.exchange, &self.routing_key, "application/json", body),
        )
        .await
        .context("publish timed out")??;

        info!(email, "confirmation event published");
        Ok(())
    }
}
