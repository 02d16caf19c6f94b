//! 告警引擎 - 条件探测、窗口去重、多渠道投递与每日汇总
//!
//! # 设计目标
//! 1. 条件独立：一个事件可以同时命中多类条件，各自成一条告警
//! 2. 幂等落库：去重守卫在存储层做成原子操作，窗口内不重复通知
//! 3. 渠道解耦：三个渠道并发各投各的，失败互不影响也不回滚记录
//! 4. 汇总收编：digest 模式的邮件留给每日批处理统一补发
//!
//! # 使用示例
//! ```ignore
//! use visitor_alerts::{EngineBuilder, EngineConfig, VisitEvent};
//!
//! let engine = EngineBuilder::new(EngineConfig::load()?).build()?;
//! let event = VisitEvent::new("v-1", "c-1", "s-1").with_cta_clicked(true);
//! engine.dispatcher.handle_visit_event(&event).await?;
//! ```

pub mod builder;
pub mod channel;
pub mod channels;
pub mod detector;
pub mod digest;
pub mod directory;
pub mod dispatcher;
pub mod event;
pub mod history;
pub mod kind;
pub mod settings;
pub mod store;

pub use builder::{Engine, EngineBuilder};
pub use channel::{DeliveryChannel, SendResult};
pub use detector::{AlertCandidate, ConditionDetector};
pub use digest::{DigestRunner, DigestSummary, DIGEST_LOOKBACK_HOURS};
pub use directory::{CampaignEntry, RecipientDirectory, RecipientProfile, ResolvedCampaign, StaticDirectory};
pub use dispatcher::{AlertDispatcher, DEDUP_WINDOW_MINUTES};
pub use event::VisitEvent;
pub use history::{JsonlVisitLog, PriorSession, VisitHistory};
pub use kind::AlertKind;
pub use settings::{AlertSettings, EmailDigestMode};
pub use store::{Alert, AlertStore, InsertOutcome, JsonlAlertStore, MemoryAlertStore, SentVia};
