//! 投递渠道抽象
//!
//! 每个渠道对一条告警只做一次外呼：不重试、不阻塞兄弟渠道、
//! 失败也不回滚已落库的告警。唯一的"重试"是邮件走每日汇总的
//! 自然重查。

use async_trait::async_trait;

use super::directory::RecipientProfile;
use super::store::{Alert, SentVia};

/// 单次投递尝试的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 投递成功
    Sent,
    /// 渠道未启用或缺少配置，跳过
    Skipped(String),
    /// 投递失败（网络错误或非 2xx）
    Failed(String),
}

/// 投递渠道接口
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// 渠道名称（日志与配置用）
    fn name(&self) -> &'static str;

    /// 投递成功后要翻转的存储标记
    fn sent_via(&self) -> SentVia;

    /// 按接收人配置判断是否应当尝试投递
    fn should_send(&self, recipient: &RecipientProfile) -> bool;

    /// 执行一次投递
    async fn deliver(&self, alert: &Alert, recipient: &RecipientProfile) -> SendResult;
}
