//! 接收人目录
//!
//! campaign → 公司 → 负责人 的只读解析边界。线上由数据服务实现；
//! CLI 和测试用配置表驱动的 `StaticDirectory`。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::settings::AlertSettings;

/// 接收人画像（目录解析结果）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientProfile {
    /// 接收人（负责该 campaign 的用户）ID
    pub recipient_id: String,
    /// 通知邮箱
    #[serde(default)]
    pub email: Option<String>,
    /// chat-webhook 地址
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    /// 通用 webhook 地址
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// 告警设置
    #[serde(default)]
    pub settings: AlertSettings,
}

impl RecipientProfile {
    /// 创建全默认设置的画像
    pub fn new(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            email: None,
            slack_webhook_url: None,
            webhook_url: None,
            settings: AlertSettings::default(),
        }
    }
}

/// campaign 条目（配置表）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEntry {
    pub campaign_id: String,
    /// campaign 显示名
    pub campaign_name: String,
    /// 目标公司显示名（HighValueVisitor 的比对基准）
    pub company_name: String,
    /// 负责人 ID
    pub recipient_id: String,
}

/// campaign 解析结果
#[derive(Debug, Clone)]
pub struct ResolvedCampaign {
    pub campaign_name: String,
    pub company_name: String,
    pub recipient: RecipientProfile,
}

/// 目录查询接口
pub trait RecipientDirectory: Send + Sync {
    /// 解析 campaign 归属；campaign 不存在或负责人缺失时返回 None
    fn resolve_campaign(&self, campaign_id: &str) -> Option<ResolvedCampaign>;

    /// 全部接收人（每日汇总遍历用）
    fn recipients(&self) -> Vec<RecipientProfile>;
}

/// 静态目录：从配置表构建
pub struct StaticDirectory {
    campaigns: HashMap<String, CampaignEntry>,
    recipients: HashMap<String, RecipientProfile>,
}

impl StaticDirectory {
    pub fn new(campaigns: Vec<CampaignEntry>, recipients: Vec<RecipientProfile>) -> Self {
        Self {
            campaigns: campaigns
                .into_iter()
                .map(|c| (c.campaign_id.clone(), c))
                .collect(),
            recipients: recipients
                .into_iter()
                .map(|r| (r.recipient_id.clone(), r))
                .collect(),
        }
    }
}

impl RecipientDirectory for StaticDirectory {
    fn resolve_campaign(&self, campaign_id: &str) -> Option<ResolvedCampaign> {
        let campaign = self.campaigns.get(campaign_id)?;
        let recipient = self.recipients.get(&campaign.recipient_id)?;
        Some(ResolvedCampaign {
            campaign_name: campaign.campaign_name.clone(),
            company_name: campaign.company_name.clone(),
            recipient: recipient.clone(),
        })
    }

    fn recipients(&self) -> Vec<RecipientProfile> {
        let mut all: Vec<RecipientProfile> = self.recipients.values().cloned().collect();
        // HashMap 遍历顺序不稳定，按 ID 排一下方便测试和日志比对
        all.sort_by(|a, b| a.recipient_id.cmp(&b.recipient_id));
        all
    }
}
