//! 邮件渠道
//!
//! 即时路径的单条告警邮件。接收人开了 daily 汇总时这里刻意不发、
//! 也不碰 sent_via_email 标记，留给每日汇总任务收编。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::alert::channel::{DeliveryChannel, SendResult};
use crate::alert::directory::RecipientProfile;
use crate::alert::settings::EmailDigestMode;
use crate::alert::store::{Alert, SentVia};

/// 邮件发送接口（外部邮件服务的边界）
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

/// SMTP 发送实现
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    timeout: Duration,
}

impl SmtpEmailSender {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(port);
        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }
        Ok(Self {
            transport: builder.build(),
            from: from.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?;

        match tokio::time::timeout(self.timeout, self.transport.send(email)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(anyhow!("smtp send timed out after {:?}", self.timeout)),
        }
    }
}

/// 即时邮件渠道
pub struct EmailChannel {
    sender: Arc<dyn EmailSender>,
    dashboard_url: String,
}

impl EmailChannel {
    pub fn new(sender: Arc<dyn EmailSender>, dashboard_url: impl Into<String>) -> Self {
        Self {
            sender,
            dashboard_url: dashboard_url.into(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn sent_via(&self) -> SentVia {
        SentVia::Email
    }

    fn should_send(&self, recipient: &RecipientProfile) -> bool {
        recipient.settings.email
            && recipient.email.is_some()
            && recipient.settings.email_digest != EmailDigestMode::Daily
    }

    async fn deliver(&self, alert: &Alert, recipient: &RecipientProfile) -> SendResult {
        let Some(to) = recipient.email.as_deref() else {
            return SendResult::Skipped("no email address".to_string());
        };

        let html = render_alert_html(alert, &self.dashboard_url);
        match self.sender.send(to, &alert.title, &html).await {
            Ok(()) => {
                debug!(alert_id = %alert.id, to = %to, "Alert email sent");
                SendResult::Sent
            }
            Err(e) => SendResult::Failed(e.to_string()),
        }
    }
}

/// 快照字段与展示名的对照表（有值才渲染）
pub(crate) const SNAPSHOT_FIELDS: &[(&str, &str)] = &[
    ("visitor_name", "Name"),
    ("visitor_email", "Email"),
    ("visitor_company", "Company"),
    ("visitor_title", "Title"),
    ("campaign_name", "Campaign"),
    ("chat_messages", "Chat messages"),
    ("time_on_page_secs", "Time on page (s)"),
    ("total_visits", "Total visits"),
];

/// 取出快照里有值的字段
pub(crate) fn present_fields(data: &serde_json::Value) -> Vec<(&'static str, String)> {
    SNAPSHOT_FIELDS
        .iter()
        .filter_map(|(key, label)| {
            data.get(*key).and_then(|v| match v {
                serde_json::Value::String(s) => Some((*label, s.clone())),
                serde_json::Value::Null => None,
                other => Some((*label, other.to_string())),
            })
        })
        .collect()
}

/// HTML 转义（访客自报字段不可信）
pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// 渲染单条告警邮件正文
fn render_alert_html(alert: &Alert, dashboard_url: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"font-family:Helvetica,Arial,sans-serif;color:#1f2933;\">");
    html.push_str(&format!("<h2>{}</h2>", escape_html(&alert.title)));
    html.push_str(&format!("<p>{}</p>", escape_html(&alert.message)));

    let fields = present_fields(&alert.data);
    if !fields.is_empty() {
        html.push_str("<table cellpadding=\"4\" style=\"border-collapse:collapse;\">");
        for (label, value) in fields {
            html.push_str(&format!(
                "<tr><td style=\"color:#616e7c;\"><strong>{}</strong></td><td>{}</td></tr>",
                label,
                escape_html(&value)
            ));
        }
        html.push_str("</table>");
    }

    html.push_str(&format!(
        "<p><a href=\"{}/alerts\">View in dashboard</a></p>",
        dashboard_url
    ));
    html.push_str(&format!(
        "<hr style=\"border:none;border-top:1px solid #e4e7eb;\"/><p style=\"font-size:12px;color:#9aa5b1;\"><a href=\"{}/settings/alerts\">Manage notification settings</a></p>",
        dashboard_url
    ));
    html.push_str("</body></html>");
    html
}
