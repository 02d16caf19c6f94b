//! 条件探测器
//!
//! 对单个访客事件独立求值六类告警条件，产出零到多个候选。除了
//! ReturningVisitor 需要查一次访问历史，其余规则都是纯函数。
//! 候选的 data 快照带全访客与 campaign 字段，渠道渲染不用回查。

use std::sync::Arc;

use serde_json::{Map, Value};

use super::directory::ResolvedCampaign;
use super::event::VisitEvent;
use super::history::VisitHistory;
use super::kind::AlertKind;

/// 告警标题常量
mod msg {
    pub const HIGH_VALUE_TITLE: &str = "High-value visitor identified";
    pub const EXECUTIVE_TITLE: &str = "Executive visitor detected";
    pub const CHAT_TITLE: &str = "Highly engaged chat visitor";
    pub const FORM_TITLE: &str = "Form submitted";
    pub const CTA_TITLE: &str = "Call-to-action clicked";
    pub const RETURNING_TITLE: &str = "Returning visitor";
}

/// ExecutiveVisit 的职位关键词（不区分大小写的子串匹配）
const EXECUTIVE_KEYWORDS: &[&str] = &[
    "ceo",
    "cto",
    "cfo",
    "coo",
    "cmo",
    "cio",
    "chief",
    "president",
    "vp",
    "vice president",
    "director",
    "head of",
    "svp",
    "evp",
];

/// 触发 MultipleChatMessages 的消息数下限
const CHAT_MESSAGE_THRESHOLD: u32 = 5;
/// ReturningVisitor：历史聊天总数超过该值即触发
const PRIOR_CHAT_THRESHOLD: u32 = 3;
/// ReturningVisitor：历史平均停留秒数超过该值即触发
const PRIOR_TIME_THRESHOLD_SECS: f64 = 60.0;

/// 候选告警
#[derive(Debug, Clone)]
pub struct AlertCandidate {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub data: Value,
}

/// 条件探测器
pub struct ConditionDetector {
    history: Arc<dyn VisitHistory>,
}

impl ConditionDetector {
    pub fn new(history: Arc<dyn VisitHistory>) -> Self {
        Self { history }
    }

    /// 求值全部规则，按固定顺序返回命中的候选
    pub fn detect(&self, event: &VisitEvent, campaign: &ResolvedCampaign) -> Vec<AlertCandidate> {
        let mut candidates = Vec::new();
        if let Some(c) = self.high_value_visitor(event, campaign) {
            candidates.push(c);
        }
        if let Some(c) = self.executive_visit(event, campaign) {
            candidates.push(c);
        }
        if let Some(c) = self.multiple_chat_messages(event, campaign) {
            candidates.push(c);
        }
        if let Some(c) = self.form_submission(event, campaign) {
            candidates.push(c);
        }
        if let Some(c) = self.cta_clicked(event, campaign) {
            candidates.push(c);
        }
        if let Some(c) = self.returning_visitor(event, campaign) {
            candidates.push(c);
        }
        candidates
    }

    /// 公共快照：访客身份 + campaign 名（有值才带）
    fn base_data(event: &VisitEvent, campaign: &ResolvedCampaign) -> Map<String, Value> {
        let mut data = Map::new();
        if let Some(name) = &event.visitor_name {
            data.insert("visitor_name".to_string(), Value::String(name.clone()));
        }
        if let Some(email) = &event.visitor_email {
            data.insert("visitor_email".to_string(), Value::String(email.clone()));
        }
        if let Some(company) = &event.visitor_company {
            data.insert("visitor_company".to_string(), Value::String(company.clone()));
        }
        if let Some(title) = &event.visitor_title {
            data.insert("visitor_title".to_string(), Value::String(title.clone()));
        }
        data.insert(
            "campaign_name".to_string(),
            Value::String(campaign.campaign_name.clone()),
        );
        data
    }

    fn high_value_visitor(
        &self,
        event: &VisitEvent,
        campaign: &ResolvedCampaign,
    ) -> Option<AlertCandidate> {
        event.visitor_email.as_deref()?;
        let company = event.visitor_company.as_deref()?;
        // 与目标公司名全等比较，大小写敏感，就是这么窄的口径
        if company != campaign.company_name {
            return None;
        }

        let data = Self::base_data(event, campaign);
        Some(AlertCandidate {
            kind: AlertKind::HighValueVisitor,
            title: msg::HIGH_VALUE_TITLE.to_string(),
            message: format!(
                "{} from {} visited {}, matching the campaign's target company.",
                event.visitor_label(),
                company,
                campaign.campaign_name
            ),
            data: Value::Object(data),
        })
    }

    fn executive_visit(
        &self,
        event: &VisitEvent,
        campaign: &ResolvedCampaign,
    ) -> Option<AlertCandidate> {
        let title = event.visitor_title.as_deref()?;
        let lowered = title.to_lowercase();
        if !EXECUTIVE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            return None;
        }

        let data = Self::base_data(event, campaign);
        Some(AlertCandidate {
            kind: AlertKind::ExecutiveVisit,
            title: msg::EXECUTIVE_TITLE.to_string(),
            message: format!(
                "{} ({}) visited {}.",
                event.visitor_label(),
                title,
                campaign.campaign_name
            ),
            data: Value::Object(data),
        })
    }

    fn multiple_chat_messages(
        &self,
        event: &VisitEvent,
        campaign: &ResolvedCampaign,
    ) -> Option<AlertCandidate> {
        if event.chat_messages < CHAT_MESSAGE_THRESHOLD {
            return None;
        }

        let mut data = Self::base_data(event, campaign);
        data.insert(
            "chat_messages".to_string(),
            Value::from(event.chat_messages),
        );
        Some(AlertCandidate {
            kind: AlertKind::MultipleChatMessages,
            title: msg::CHAT_TITLE.to_string(),
            message: format!(
                "{} sent {} chat messages on {}.",
                event.visitor_label(),
                event.chat_messages,
                campaign.campaign_name
            ),
            data: Value::Object(data),
        })
    }

    fn form_submission(
        &self,
        event: &VisitEvent,
        campaign: &ResolvedCampaign,
    ) -> Option<AlertCandidate> {
        if !event.form_submitted {
            return None;
        }

        let data = Self::base_data(event, campaign);
        Some(AlertCandidate {
            kind: AlertKind::FormSubmission,
            title: msg::FORM_TITLE.to_string(),
            message: format!(
                "{} submitted the form on {}.",
                event.visitor_label(),
                campaign.campaign_name
            ),
            data: Value::Object(data),
        })
    }

    fn cta_clicked(
        &self,
        event: &VisitEvent,
        campaign: &ResolvedCampaign,
    ) -> Option<AlertCandidate> {
        if !event.cta_clicked {
            return None;
        }

        let data = Self::base_data(event, campaign);
        Some(AlertCandidate {
            kind: AlertKind::CtaClicked,
            title: msg::CTA_TITLE.to_string(),
            message: format!(
                "{} clicked the call-to-action on {}.",
                event.visitor_label(),
                campaign.campaign_name
            ),
            data: Value::Object(data),
        })
    }

    fn returning_visitor(
        &self,
        event: &VisitEvent,
        campaign: &ResolvedCampaign,
    ) -> Option<AlertCandidate> {
        let email = event.visitor_email.as_deref()?;
        let prior =
            self.history
                .prior_sessions(&event.campaign_id, email, &event.session_id);
        if prior.is_empty() {
            return None;
        }

        let prior_chat: u32 = prior.iter().map(|s| s.chat_messages).sum();
        let total_secs: u32 = prior.iter().map(|s| s.time_on_page_secs).sum();
        let mean_secs = f64::from(total_secs) / prior.len() as f64;
        if prior_chat <= PRIOR_CHAT_THRESHOLD && mean_secs <= PRIOR_TIME_THRESHOLD_SECS {
            return None;
        }

        let total_visits = prior.len() + 1;
        let mut data = Self::base_data(event, campaign);
        data.insert("total_visits".to_string(), Value::from(total_visits));
        data.insert("prior_chat_messages".to_string(), Value::from(prior_chat));
        data.insert("avg_time_on_page_secs".to_string(), Value::from(mean_secs));
        Some(AlertCandidate {
            kind: AlertKind::ReturningVisitor,
            title: msg::RETURNING_TITLE.to_string(),
            message: format!(
                "{} is back on {} (visit {}).",
                event.visitor_label(),
                campaign.campaign_name,
                total_visits
            ),
            data: Value::Object(data),
        })
    }
}
