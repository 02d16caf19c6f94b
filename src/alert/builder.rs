//! 引擎装配
//!
//! 按配置把存储、目录、历史、三个渠道和汇总任务接成一个可用引擎。
//! 线上集成方可以绕开这里，自己注入目录与历史的实现。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::channels::email::{EmailChannel, EmailSender, SmtpEmailSender};
use super::channels::slack::SlackChannel;
use super::channels::webhook::WebhookChannel;
use super::detector::ConditionDetector;
use super::digest::DigestRunner;
use super::directory::StaticDirectory;
use super::dispatcher::AlertDispatcher;
use super::history::JsonlVisitLog;
use super::store::{AlertStore, JsonlAlertStore};
use crate::config::EngineConfig;

/// 装配好的引擎句柄
pub struct Engine {
    pub dispatcher: AlertDispatcher,
    pub digest: DigestRunner,
    pub store: Arc<dyn AlertStore>,
    pub visit_log: Arc<JsonlVisitLog>,
}

/// 引擎构建器
pub struct EngineBuilder {
    config: EngineConfig,
    dry_run: bool,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式（落库但不外呼）
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let config = self.config;

        let store: Arc<dyn AlertStore> =
            Arc::new(JsonlAlertStore::new(config.alert_store_path()));
        let visit_log = Arc::new(JsonlVisitLog::new(config.visit_log_path()));
        let directory = Arc::new(StaticDirectory::new(
            config.campaigns.clone(),
            config.recipients.clone(),
        ));

        let timeout = Duration::from_secs(config.http_timeout_secs);
        let sender: Arc<dyn EmailSender> = Arc::new(SmtpEmailSender::new(
            &config.smtp.host,
            config.smtp.port,
            config.smtp.username.as_deref(),
            config.smtp.password.as_deref(),
            &config.smtp.from,
            timeout,
        )?);

        let mut dispatcher = AlertDispatcher::new(
            store.clone(),
            directory.clone(),
            ConditionDetector::new(visit_log.clone()),
        )
        .with_dry_run(self.dry_run);
        dispatcher.register_channel(Arc::new(EmailChannel::new(
            sender.clone(),
            config.dashboard_url.clone(),
        )));
        dispatcher.register_channel(Arc::new(SlackChannel::new(
            config.dashboard_url.clone(),
            timeout,
        )?));
        dispatcher.register_channel(Arc::new(WebhookChannel::new(timeout)?));

        let digest = DigestRunner::new(
            store.clone(),
            directory,
            sender,
            config.dashboard_url.clone(),
        );

        Ok(Engine {
            dispatcher,
            digest,
            store,
            visit_log,
        })
    }
}
