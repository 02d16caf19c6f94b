//! Chat-webhook 渠道
//!
//! 向接收人配置的 webhook 地址推送块结构消息：标题块、正文块、
//! 可选的访客字段块、跳转 dashboard 的动作块。非 2xx 一律算失败。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::alert::channel::{DeliveryChannel, SendResult};
use crate::alert::directory::RecipientProfile;
use crate::alert::store::{Alert, SentVia};

/// 字段块只带访客身份字段
const FIELD_KEYS: &[(&str, &str)] = &[
    ("visitor_name", "Name"),
    ("visitor_email", "Email"),
    ("visitor_company", "Company"),
    ("visitor_title", "Title"),
];

pub struct SlackChannel {
    client: reqwest::Client,
    dashboard_url: String,
}

impl SlackChannel {
    pub fn new(dashboard_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            dashboard_url: dashboard_url.into(),
        })
    }

    /// 组装块结构消息体
    fn build_payload(&self, alert: &Alert) -> serde_json::Value {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": { "type": "plain_text", "text": alert.title, "emoji": true }
            }),
            json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": alert.message }
            }),
        ];

        let fields: Vec<serde_json::Value> = FIELD_KEYS
            .iter()
            .filter_map(|(key, label)| {
                alert.data.get(*key).and_then(|v| v.as_str()).map(|value| {
                    json!({ "type": "mrkdwn", "text": format!("*{}:*\n{}", label, value) })
                })
            })
            .collect();
        if !fields.is_empty() {
            blocks.push(json!({ "type": "section", "fields": fields }));
        }

        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": { "type": "plain_text", "text": "Open dashboard", "emoji": true },
                "url": format!("{}/alerts", self.dashboard_url)
            }]
        }));

        json!({ "blocks": blocks })
    }
}

#[async_trait]
impl DeliveryChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn sent_via(&self) -> SentVia {
        SentVia::Slack
    }

    fn should_send(&self, recipient: &RecipientProfile) -> bool {
        recipient.settings.slack && recipient.slack_webhook_url.is_some()
    }

    async fn deliver(&self, alert: &Alert, recipient: &RecipientProfile) -> SendResult {
        let Some(url) = recipient.slack_webhook_url.as_deref() else {
            return SendResult::Skipped("no chat-webhook url".to_string());
        };

        let payload = self.build_payload(alert);
        match self.client.post(url).json(&payload).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    debug!(alert_id = %alert.id, "Chat-webhook message delivered");
                    SendResult::Sent
                } else {
                    SendResult::Failed(format!("HTTP {}", status))
                }
            }
            Err(e) => SendResult::Failed(e.to_string()),
        }
    }
}
