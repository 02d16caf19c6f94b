//! 派发协调器
//!
//! 单个访客事件的完整处理：解析接收人与设置、跑条件探测、对每个
//! 候选做窗口去重落库，再把告警并发投到各渠道。渠道之间互不影响，
//! 谁成功谁翻自己的标记；对调用方是 fire-and-forget。

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use tracing::{debug, info, warn};

use super::channel::{DeliveryChannel, SendResult};
use super::detector::ConditionDetector;
use super::directory::{RecipientDirectory, RecipientProfile};
use super::event::VisitEvent;
use super::store::{Alert, AlertStore, InsertOutcome};

/// 去重窗口：同一 (recipient, campaign, visit, kind) 在窗口内只通知一次
pub const DEDUP_WINDOW_MINUTES: i64 = 60;

/// 派发协调器
pub struct AlertDispatcher {
    store: Arc<dyn AlertStore>,
    directory: Arc<dyn RecipientDirectory>,
    detector: ConditionDetector,
    /// 注册的投递渠道
    channels: Vec<Arc<dyn DeliveryChannel>>,
    /// dry-run 模式：落库但不外呼
    dry_run: bool,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn AlertStore>,
        directory: Arc<dyn RecipientDirectory>,
        detector: ConditionDetector,
    ) -> Self {
        Self {
            store,
            directory,
            detector,
            channels: Vec::new(),
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 注册渠道
    pub fn register_channel(&mut self, channel: Arc<dyn DeliveryChannel>) {
        info!(channel = channel.name(), "Registering delivery channel");
        self.channels.push(channel);
    }

    /// 已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 已注册的渠道名称
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// 处理一个访客事件，所有已发起的投递结算后返回
    pub async fn handle_visit_event(&self, event: &VisitEvent) -> Result<()> {
        // 1. campaign → 负责人 → 设置；解析不到或全局关闭就什么都不记
        let Some(resolved) = self.directory.resolve_campaign(&event.campaign_id) else {
            debug!(
                campaign_id = %event.campaign_id,
                "No recipient resolved for campaign, dropping event"
            );
            return Ok(());
        };
        if !resolved.recipient.settings.enabled {
            debug!(
                recipient_id = %resolved.recipient.recipient_id,
                "Alerts disabled for recipient, dropping event"
            );
            return Ok(());
        }

        // 2. 条件探测
        let candidates = self.detector.detect(event, &resolved);
        if candidates.is_empty() {
            debug!(visit_id = %event.visit_id, "No alert conditions matched");
            return Ok(());
        }

        // 3. 每个候选独立：去重、落库、扇出
        let recipient = Arc::new(resolved.recipient);
        for candidate in candidates {
            let alert = Alert::new(
                recipient.recipient_id.clone(),
                event.campaign_id.clone(),
                event.visit_id.clone(),
                candidate.kind,
                candidate.title,
                candidate.message,
                candidate.data,
            );

            let alert = match self
                .store
                .insert_unique(alert, Duration::minutes(DEDUP_WINDOW_MINUTES))?
            {
                InsertOutcome::Created(alert) => Arc::new(alert),
                InsertOutcome::Duplicate => {
                    debug!(
                        kind = %candidate.kind,
                        visit_id = %event.visit_id,
                        "Duplicate alert suppressed inside dedup window"
                    );
                    continue;
                }
            };

            info!(
                kind = %alert.kind,
                alert_id = %alert.id,
                recipient_id = %alert.recipient_id,
                "Alert recorded"
            );
            self.fan_out(alert, recipient.clone()).await;
        }

        Ok(())
    }

    /// 把一条告警并发投到所有渠道，等全部结算
    async fn fan_out(&self, alert: Arc<Alert>, recipient: Arc<RecipientProfile>) {
        let mut handles = Vec::new();

        for channel in &self.channels {
            if self.dry_run {
                info!(channel = channel.name(), alert_id = %alert.id, "[dry-run] would deliver alert");
                continue;
            }

            let channel = channel.clone();
            let alert = alert.clone();
            let recipient = recipient.clone();
            let store = self.store.clone();

            handles.push(tokio::spawn(async move {
                if !channel.should_send(&recipient) {
                    debug!(channel = channel.name(), alert_id = %alert.id, "Channel gated off, skipping");
                    return;
                }

                match channel.deliver(&alert, &recipient).await {
                    SendResult::Sent => {
                        if let Err(e) = store.mark_sent(alert.id, channel.sent_via()) {
                            warn!(
                                channel = channel.name(),
                                alert_id = %alert.id,
                                error = %e,
                                "Delivered but failed to mark alert as sent"
                            );
                        }
                    }
                    SendResult::Skipped(reason) => {
                        debug!(
                            channel = channel.name(),
                            alert_id = %alert.id,
                            reason = %reason,
                            "Channel skipped delivery"
                        );
                    }
                    SendResult::Failed(error) => {
                        warn!(
                            channel = channel.name(),
                            alert_id = %alert.id,
                            error = %error,
                            "Channel delivery failed"
                        );
                    }
                }
            }));
        }

        for handle in handles {
            // 渠道任务自己兜错，join 失败只可能是 panic
            if let Err(e) = handle.await {
                warn!(error = %e, "Channel delivery task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::alert::directory::{CampaignEntry, StaticDirectory};
    use crate::alert::history::{PriorSession, VisitHistory};
    use crate::alert::kind::AlertKind;
    use crate::alert::store::{MemoryAlertStore, SentVia};

    struct EmptyHistory;

    impl VisitHistory for EmptyHistory {
        fn prior_sessions(&self, _: &str, _: &str, _: &str) -> Vec<PriorSession> {
            Vec::new()
        }
    }

    /// 测试用渠道：固定结果，计数投递次数
    struct MockChannel {
        name: &'static str,
        via: SentVia,
        result: SendResult,
        delivered: AtomicUsize,
    }

    impl MockChannel {
        fn new(name: &'static str, via: SentVia, result: SendResult) -> Arc<Self> {
            Arc::new(Self {
                name,
                via,
                result,
                delivered: AtomicUsize::new(0),
            })
        }

        fn delivered_count(&self) -> usize {
            self.delivered.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeliveryChannel for MockChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn sent_via(&self) -> SentVia {
            self.via
        }

        fn should_send(&self, _recipient: &RecipientProfile) -> bool {
            true
        }

        async fn deliver(&self, _alert: &Alert, _recipient: &RecipientProfile) -> SendResult {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn directory(settings_enabled: bool) -> Arc<StaticDirectory> {
        let mut recipient = RecipientProfile::new("u-1");
        recipient.email = Some("owner@example.com".to_string());
        recipient.settings.enabled = settings_enabled;
        Arc::new(StaticDirectory::new(
            vec![CampaignEntry {
                campaign_id: "c-1".to_string(),
                campaign_name: "Acme Outreach Q3".to_string(),
                company_name: "Acme Corp".to_string(),
                recipient_id: "u-1".to_string(),
            }],
            vec![recipient],
        ))
    }

    fn dispatcher(store: Arc<MemoryAlertStore>, enabled: bool) -> AlertDispatcher {
        AlertDispatcher::new(
            store,
            directory(enabled),
            ConditionDetector::new(Arc::new(EmptyHistory)),
        )
    }

    fn qualifying_event() -> VisitEvent {
        VisitEvent::new("v-1", "c-1", "s-1")
            .with_email("jane@acme.com")
            .with_company("Acme Corp")
            .with_chat_messages(7)
            .with_cta_clicked(true)
    }

    #[tokio::test]
    async fn test_idempotent_within_dedup_window() {
        let store = Arc::new(MemoryAlertStore::new());
        let dispatcher = dispatcher(store.clone(), true);

        // 同一事件处理两次
        dispatcher.handle_visit_event(&qualifying_event()).await.unwrap();
        dispatcher.handle_visit_event(&qualifying_event()).await.unwrap();

        // 每个 (recipient, campaign, visit, kind) 恰好一条
        let alerts = store.snapshot();
        assert_eq!(alerts.len(), 3);
        for kind in [
            AlertKind::HighValueVisitor,
            AlertKind::MultipleChatMessages,
            AlertKind::CtaClicked,
        ] {
            assert_eq!(alerts.iter().filter(|a| a.kind == kind).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_multi_condition_fan_out_creates_distinct_alerts() {
        let store = Arc::new(MemoryAlertStore::new());
        let dispatcher = dispatcher(store.clone(), true);

        dispatcher.handle_visit_event(&qualifying_event()).await.unwrap();

        let mut kinds: Vec<AlertKind> = store.snapshot().iter().map(|a| a.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(
            kinds,
            vec![
                AlertKind::CtaClicked,
                AlertKind::HighValueVisitor,
                AlertKind::MultipleChatMessages,
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_failure_is_isolated() {
        let store = Arc::new(MemoryAlertStore::new());
        let mut dispatcher = dispatcher(store.clone(), true);

        let email = MockChannel::new("email", SentVia::Email, SendResult::Sent);
        let slack = MockChannel::new(
            "slack",
            SentVia::Slack,
            SendResult::Failed("HTTP 500".to_string()),
        );
        let webhook = MockChannel::new("webhook", SentVia::Webhook, SendResult::Sent);
        dispatcher.register_channel(email.clone());
        dispatcher.register_channel(slack.clone());
        dispatcher.register_channel(webhook.clone());

        let event = VisitEvent::new("v-1", "c-1", "s-1").with_cta_clicked(true);
        dispatcher.handle_visit_event(&event).await.unwrap();

        // 三个渠道都被尝试，失败的不影响成功的
        assert_eq!(email.delivered_count(), 1);
        assert_eq!(slack.delivered_count(), 1);
        assert_eq!(webhook.delivered_count(), 1);

        let alerts = store.snapshot();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].sent_via_email);
        assert!(!alerts[0].sent_via_slack);
        assert!(alerts[0].sent_via_webhook);
    }

    #[tokio::test]
    async fn test_disabled_settings_record_nothing() {
        let store = Arc::new(MemoryAlertStore::new());
        let dispatcher = dispatcher(store.clone(), false);

        dispatcher.handle_visit_event(&qualifying_event()).await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_campaign_records_nothing() {
        let store = Arc::new(MemoryAlertStore::new());
        let dispatcher = dispatcher(store.clone(), true);

        let event = VisitEvent::new("v-1", "c-unknown", "s-1").with_cta_clicked(true);
        dispatcher.handle_visit_event(&event).await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_persists_but_does_not_deliver() {
        let store = Arc::new(MemoryAlertStore::new());
        let mut dispatcher = dispatcher(store.clone(), true).with_dry_run(true);

        let channel = MockChannel::new("email", SentVia::Email, SendResult::Sent);
        dispatcher.register_channel(channel.clone());

        let event = VisitEvent::new("v-1", "c-1", "s-1").with_form_submitted(true);
        dispatcher.handle_visit_event(&event).await.unwrap();

        assert_eq!(channel.delivered_count(), 0);
        let alerts = store.snapshot();
        assert_eq!(alerts.len(), 1);
        assert!(!alerts[0].sent_via_email);
    }

    #[tokio::test]
    async fn test_dedup_suppresses_resends() {
        let store = Arc::new(MemoryAlertStore::new());
        let mut dispatcher = dispatcher(store.clone(), true);

        let channel = MockChannel::new("webhook", SentVia::Webhook, SendResult::Sent);
        dispatcher.register_channel(channel.clone());

        let event = VisitEvent::new("v-1", "c-1", "s-1").with_cta_clicked(true);
        dispatcher.handle_visit_event(&event).await.unwrap();
        dispatcher.handle_visit_event(&event).await.unwrap();

        // 第二次是去重 no-op，不会再投
        assert_eq!(channel.delivered_count(), 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_register_channel_bookkeeping() {
        let store = Arc::new(MemoryAlertStore::new());
        let mut dispatcher = dispatcher(store, true);
        assert_eq!(dispatcher.channel_count(), 0);

        dispatcher.register_channel(MockChannel::new(
            "email",
            SentVia::Email,
            SendResult::Sent,
        ));
        assert_eq!(dispatcher.channel_count(), 1);
        assert_eq!(dispatcher.channel_names(), vec!["email"]);
    }
}
