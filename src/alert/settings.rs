//! 接收人告警配置
//!
//! 由外部用户服务维护，本引擎只读。全局开关和三个渠道开关决定
//! 投递行为；邮件模式为 daily 时即时邮件让位给每日汇总。

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// 邮件投递模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailDigestMode {
    /// 条件命中后立即发单条邮件
    #[default]
    Instant,
    /// 攒到每日汇总一次性发
    Daily,
}

/// 接收人告警设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    /// 全局开关，false 时任何条件都不评估
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 邮件渠道开关
    #[serde(default = "default_true")]
    pub email: bool,
    /// chat-webhook 渠道开关
    #[serde(default = "default_true")]
    pub slack: bool,
    /// 站内通知开关（由 Web 端消费，本引擎不读）
    #[serde(default = "default_true")]
    pub in_app: bool,
    /// 邮件投递模式
    #[serde(default)]
    pub email_digest: EmailDigestMode,

    // TODO: 以下按类型的开关目前只解析不生效，探测器不读取它们。
    // 是否要按类型过滤告警需要产品确认后再接入，不能在这里顺手实现。
    #[serde(default = "default_true")]
    pub notify_high_value: bool,
    #[serde(default = "default_true")]
    pub notify_executive: bool,
    #[serde(default = "default_true")]
    pub notify_chat: bool,
    #[serde(default = "default_true")]
    pub notify_form: bool,
    #[serde(default = "default_true")]
    pub notify_cta: bool,
    #[serde(default = "default_true")]
    pub notify_returning: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            email: true,
            slack: true,
            in_app: true,
            email_digest: EmailDigestMode::Instant,
            notify_high_value: true,
            notify_executive: true,
            notify_chat: true,
            notify_form: true,
            notify_cta: true,
            notify_returning: true,
        }
    }
}

impl AlertSettings {
    /// 生成 digest 模式的设置（测试与配置示例用）
    pub fn daily_digest(mut self) -> Self {
        self.email_digest = EmailDigestMode::Daily;
        self
    }
}
