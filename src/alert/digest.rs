//! 每日汇总
//!
//! 外部调度器每天触发一次。逐个接收人收集最近 24 小时内尚未邮件
//! 投递的告警，合并成一封摘要邮件，发送成功后一次性批量标记。
//! 发送失败不动标记，下一轮自然重查（仅限仍在窗口内的记录）。

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::channels::email::{escape_html, present_fields, EmailSender};
use super::directory::RecipientDirectory;
use super::settings::EmailDigestMode;
use super::store::{Alert, AlertStore};

/// 汇总查询回看窗口
pub const DIGEST_LOOKBACK_HOURS: i64 = 24;

/// 一轮汇总的执行摘要
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestSummary {
    /// 通过资格检查且有待发告警的接收人数量
    pub recipients_processed: usize,
    /// 成功发出的汇总邮件数量
    pub emails_sent: usize,
}

/// 每日汇总任务
pub struct DigestRunner {
    store: Arc<dyn AlertStore>,
    directory: Arc<dyn RecipientDirectory>,
    sender: Arc<dyn EmailSender>,
    dashboard_url: String,
}

impl DigestRunner {
    pub fn new(
        store: Arc<dyn AlertStore>,
        directory: Arc<dyn RecipientDirectory>,
        sender: Arc<dyn EmailSender>,
        dashboard_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            sender,
            dashboard_url: dashboard_url.into(),
        }
    }

    /// 跑一轮汇总
    pub async fn run_daily_digests(&self) -> Result<DigestSummary> {
        let since = Utc::now() - Duration::hours(DIGEST_LOOKBACK_HOURS);
        let mut summary = DigestSummary::default();

        for recipient in self.directory.recipients() {
            let Some(email) = recipient.email.as_deref() else {
                continue;
            };
            let settings = &recipient.settings;
            if !settings.enabled
                || !settings.email
                || settings.email_digest != EmailDigestMode::Daily
            {
                continue;
            }

            // 掉出窗口的未发记录只能观测，不再收编
            let stale = self
                .store
                .stale_email_count(&recipient.recipient_id, since)?;
            if stale > 0 {
                warn!(
                    recipient_id = %recipient.recipient_id,
                    count = stale,
                    "Unsent alerts have aged out of the digest window"
                );
            }

            let pending = self
                .store
                .pending_email_since(&recipient.recipient_id, since)?;
            if pending.is_empty() {
                debug!(recipient_id = %recipient.recipient_id, "No pending alerts for digest");
                continue;
            }
            summary.recipients_processed += 1;

            let subject = format!(
                "Your daily visitor alert digest ({} alert{})",
                pending.len(),
                if pending.len() == 1 { "" } else { "s" }
            );
            let html = render_digest_html(&pending, &self.dashboard_url);

            match self.sender.send(email, &subject, &html).await {
                Ok(()) => {
                    let ids: Vec<Uuid> = pending.iter().map(|a| a.id).collect();
                    self.store.mark_email_sent(&ids)?;
                    summary.emails_sent += 1;
                    info!(
                        recipient_id = %recipient.recipient_id,
                        alerts = pending.len(),
                        "Digest email sent"
                    );
                }
                Err(e) => {
                    warn!(
                        recipient_id = %recipient.recipient_id,
                        error = %e,
                        "Digest email failed, alerts stay pending"
                    );
                }
            }
        }

        info!(
            recipients = summary.recipients_processed,
            sent = summary.emails_sent,
            "Daily digest run finished"
        );
        Ok(summary)
    }
}

/// 渲染汇总邮件正文
fn render_digest_html(alerts: &[Alert], dashboard_url: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"font-family:Helvetica,Arial,sans-serif;color:#1f2933;\">");
    html.push_str(&format!(
        "<h2>Daily visitor alert digest</h2><p>{} new alert{} in the last 24 hours.</p>",
        alerts.len(),
        if alerts.len() == 1 { "" } else { "s" }
    ));

    for alert in alerts {
        html.push_str("<div style=\"margin:16px 0;padding:12px;border:1px solid #e4e7eb;border-radius:6px;\">");
        html.push_str(&format!("<h3 style=\"margin:0 0 8px 0;\">{}</h3>", escape_html(&alert.title)));
        html.push_str(&format!("<p style=\"margin:0 0 8px 0;\">{}</p>", escape_html(&alert.message)));
        let fields = present_fields(&alert.data);
        if !fields.is_empty() {
            let line: Vec<String> = fields
                .iter()
                .map(|(label, value)| format!("{}: {}", label, escape_html(value)))
                .collect();
            html.push_str(&format!(
                "<p style=\"margin:0;font-size:13px;color:#616e7c;\">{}</p>",
                line.join(" | ")
            ));
        }
        html.push_str("</div>");
    }

    html.push_str(&format!(
        "<p><a href=\"{}/alerts\">View all alerts in the dashboard</a></p>",
        dashboard_url
    ));
    html.push_str(&format!(
        "<hr style=\"border:none;border-top:1px solid #e4e7eb;\"/><p style=\"font-size:12px;color:#9aa5b1;\"><a href=\"{}/settings/alerts\">Manage notification settings</a></p>",
        dashboard_url
    ));
    html.push_str("</body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;

    use crate::alert::directory::{RecipientProfile, StaticDirectory};
    use crate::alert::kind::AlertKind;
    use crate::alert::settings::AlertSettings;
    use crate::alert::store::{InsertOutcome, MemoryAlertStore};

    /// 记录发送调用的桩邮件服务
    struct RecordingSender {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn last_html(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().2.clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("smtp unavailable");
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), html.to_string()));
            Ok(())
        }
    }

    fn digest_recipient() -> RecipientProfile {
        let mut r = RecipientProfile::new("u-1");
        r.email = Some("owner@example.com".to_string());
        r.settings = AlertSettings::default().daily_digest();
        r
    }

    fn directory_with(recipients: Vec<RecipientProfile>) -> Arc<StaticDirectory> {
        Arc::new(StaticDirectory::new(vec![], recipients))
    }

    fn seed_alert(store: &MemoryAlertStore, recipient_id: &str, kind: AlertKind, age_hours: i64) -> Uuid {
        let mut alert = Alert::new(
            recipient_id,
            "c-1",
            format!("v-{}-{}", kind.as_str(), age_hours),
            kind,
            format!("{} alert", kind.as_str()),
            "Something happened.",
            serde_json::json!({"visitor_email": "jane@acme.com"}),
        );
        alert.created_at = Utc::now() - Duration::hours(age_hours);
        match store
            .insert_unique(alert, Duration::minutes(60))
            .unwrap()
        {
            InsertOutcome::Created(a) => a.id,
            InsertOutcome::Duplicate => panic!("seed must insert"),
        }
    }

    #[tokio::test]
    async fn test_digest_sends_in_window_alerts_and_marks_only_those() {
        let store = Arc::new(MemoryAlertStore::new());
        let old_id = seed_alert(&store, "u-1", AlertKind::CtaClicked, 30);
        seed_alert(&store, "u-1", AlertKind::FormSubmission, 2);
        seed_alert(&store, "u-1", AlertKind::ExecutiveVisit, 2);
        seed_alert(&store, "u-1", AlertKind::MultipleChatMessages, 2);

        let sender = RecordingSender::new(false);
        let runner = DigestRunner::new(
            store.clone(),
            directory_with(vec![digest_recipient()]),
            sender.clone(),
            "http://dash.local",
        );

        let summary = runner.run_daily_digests().await.unwrap();
        assert_eq!(
            summary,
            DigestSummary {
                recipients_processed: 1,
                emails_sent: 1
            }
        );
        assert_eq!(sender.sent_count(), 1);

        // 窗口内的 3 条被标记，30 小时前的那条原样留下
        let alerts = store.snapshot();
        let marked = alerts.iter().filter(|a| a.sent_via_email).count();
        assert_eq!(marked, 3);
        let old = alerts.iter().find(|a| a.id == old_id).unwrap();
        assert!(!old.sent_via_email);

        // 邮件里列出了每条告警
        let html = sender.last_html();
        assert!(html.contains("form_submission alert"));
        assert!(html.contains("executive_visit alert"));
        assert!(!html.contains("cta_clicked alert"));
    }

    #[tokio::test]
    async fn test_digest_failure_leaves_flags_untouched() {
        let store = Arc::new(MemoryAlertStore::new());
        seed_alert(&store, "u-1", AlertKind::FormSubmission, 2);

        let sender = RecordingSender::new(true);
        let runner = DigestRunner::new(
            store.clone(),
            directory_with(vec![digest_recipient()]),
            sender,
            "http://dash.local",
        );

        let summary = runner.run_daily_digests().await.unwrap();
        assert_eq!(summary.recipients_processed, 1);
        assert_eq!(summary.emails_sent, 0);
        assert!(store.snapshot().iter().all(|a| !a.sent_via_email));
    }

    #[tokio::test]
    async fn test_digest_skips_ineligible_recipients() {
        let store = Arc::new(MemoryAlertStore::new());
        seed_alert(&store, "u-instant", AlertKind::FormSubmission, 2);
        seed_alert(&store, "u-disabled", AlertKind::FormSubmission, 2);
        seed_alert(&store, "u-no-mail", AlertKind::FormSubmission, 2);

        let mut instant = RecipientProfile::new("u-instant");
        instant.email = Some("instant@example.com".to_string());

        let mut disabled = digest_recipient();
        disabled.recipient_id = "u-disabled".to_string();
        disabled.settings.enabled = false;

        let mut no_mail = digest_recipient();
        no_mail.recipient_id = "u-no-mail".to_string();
        no_mail.email = None;

        let sender = RecordingSender::new(false);
        let runner = DigestRunner::new(
            store.clone(),
            directory_with(vec![instant, disabled, no_mail]),
            sender.clone(),
            "http://dash.local",
        );

        let summary = runner.run_daily_digests().await.unwrap();
        assert_eq!(summary, DigestSummary::default());
        assert_eq!(sender.sent_count(), 0);
        assert!(store.snapshot().iter().all(|a| !a.sent_via_email));
    }

    #[tokio::test]
    async fn test_digest_without_pending_alerts_is_a_noop() {
        let store = Arc::new(MemoryAlertStore::new());
        let sender = RecordingSender::new(false);
        let runner = DigestRunner::new(
            store,
            directory_with(vec![digest_recipient()]),
            sender.clone(),
            "http://dash.local",
        );

        let summary = runner.run_daily_digests().await.unwrap();
        assert_eq!(summary, DigestSummary::default());
        assert_eq!(sender.sent_count(), 0);
    }

    #[test]
    fn test_render_digest_lists_every_alert() {
        let alerts = vec![
            Alert::new(
                "u-1",
                "c-1",
                "v-1",
                AlertKind::CtaClicked,
                "Call-to-action clicked",
                "Jane clicked the CTA.",
                serde_json::json!({"visitor_email": "jane@acme.com"}),
            ),
            Alert::new(
                "u-1",
                "c-1",
                "v-2",
                AlertKind::FormSubmission,
                "Form submitted",
                "Bob submitted the form.",
                serde_json::json!({"visitor_name": "Bob"}),
            ),
        ];
        let html = render_digest_html(&alerts, "http://dash.local");
        assert!(html.contains("2 new alerts"));
        assert!(html.contains("Call-to-action clicked"));
        assert!(html.contains("Form submitted"));
        assert!(html.contains("jane@acme.com"));
        assert!(html.contains("http://dash.local/alerts"));
        assert!(html.contains("http://dash.local/settings/alerts"));
    }
}
