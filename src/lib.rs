//! Visitor Alerts - 访客互动告警引擎
//!
//! 监测 campaign 访客的互动事件，判定通知条件，窗口去重后并发投递
//! 到邮件、chat-webhook 与通用 webhook，另带一条每日汇总批处理路径。

pub mod alert;
pub mod config;

pub use alert::channels::email::{EmailChannel, EmailSender, SmtpEmailSender};
pub use alert::channels::slack::SlackChannel;
pub use alert::channels::webhook::WebhookChannel;
pub use alert::{
    Alert, AlertCandidate, AlertDispatcher, AlertKind, AlertSettings, AlertStore, CampaignEntry,
    ConditionDetector, DeliveryChannel, DigestRunner, DigestSummary, EmailDigestMode, Engine,
    EngineBuilder, InsertOutcome, JsonlAlertStore, JsonlVisitLog, MemoryAlertStore, PriorSession,
    RecipientDirectory, RecipientProfile, ResolvedCampaign, SendResult, SentVia, StaticDirectory,
    VisitEvent, VisitHistory, DEDUP_WINDOW_MINUTES, DIGEST_LOOKBACK_HOURS,
};
pub use config::{EngineConfig, SmtpConfig};
