//! 通用 webhook 渠道
//!
//! 固定信封推送给用户自己的集成端点。当前设计没有独立的设置开关，
//! 配置了 URL 就会发。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::alert::channel::{DeliveryChannel, SendResult};
use crate::alert::directory::RecipientProfile;
use crate::alert::store::{Alert, SentVia};

pub struct WebhookChannel {
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// 固定信封：event 恒为 visitor_alert
    fn build_envelope(alert: &Alert) -> serde_json::Value {
        json!({
            "event": "visitor_alert",
            "timestamp": Utc::now().to_rfc3339(),
            "type": alert.kind.as_str(),
            "title": alert.title,
            "message": alert.message,
            "data": alert.data,
        })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn sent_via(&self) -> SentVia {
        SentVia::Webhook
    }

    fn should_send(&self, recipient: &RecipientProfile) -> bool {
        recipient.webhook_url.is_some()
    }

    async fn deliver(&self, alert: &Alert, recipient: &RecipientProfile) -> SendResult {
        let Some(url) = recipient.webhook_url.as_deref() else {
            return SendResult::Skipped("no webhook url".to_string());
        };

        let envelope = Self::build_envelope(alert);
        match self.client.post(url).json(&envelope).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    debug!(alert_id = %alert.id, "Webhook envelope delivered");
                    SendResult::Sent
                } else {
                    SendResult::Failed(format!("HTTP {}", status))
                }
            }
            Err(e) => SendResult::Failed(e.to_string()),
        }
    }
}
