//! 访客事件结构
//!
//! 跟踪子系统上报的一次访客互动快照。对本引擎只读：同一访客的
//! 重复来访由 `session_id` 区分，计数器是该会话的累计值。

use serde::{Deserialize, Serialize};

/// 访客互动事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitEvent {
    /// 访问记录 ID
    pub visit_id: String,
    /// 所属 campaign ID
    pub campaign_id: String,
    /// 会话 ID（区分同一访客的多次来访）
    pub session_id: String,
    /// 访客邮箱（识别到才有）
    #[serde(default)]
    pub visitor_email: Option<String>,
    /// 访客显示名
    #[serde(default)]
    pub visitor_name: Option<String>,
    /// 访客自报公司
    #[serde(default)]
    pub visitor_company: Option<String>,
    /// 访客职位
    #[serde(default)]
    pub visitor_title: Option<String>,
    /// 本会话聊天消息数
    #[serde(default)]
    pub chat_messages: u32,
    /// 本会话页面停留秒数
    #[serde(default)]
    pub time_on_page_secs: u32,
    /// 是否点击了 CTA
    #[serde(default)]
    pub cta_clicked: bool,
    /// 是否提交了表单
    #[serde(default)]
    pub form_submitted: bool,
}

impl VisitEvent {
    /// 创建最小事件
    pub fn new(
        visit_id: impl Into<String>,
        campaign_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            visit_id: visit_id.into(),
            campaign_id: campaign_id.into(),
            session_id: session_id.into(),
            visitor_email: None,
            visitor_name: None,
            visitor_company: None,
            visitor_title: None,
            chat_messages: 0,
            time_on_page_secs: 0,
            cta_clicked: false,
            form_submitted: false,
        }
    }

    /// 设置访客邮箱（链式调用）
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.visitor_email = Some(email.into());
        self
    }

    /// 设置访客显示名（链式调用）
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.visitor_name = Some(name.into());
        self
    }

    /// 设置访客公司（链式调用）
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.visitor_company = Some(company.into());
        self
    }

    /// 设置访客职位（链式调用）
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.visitor_title = Some(title.into());
        self
    }

    /// 设置聊天消息数（链式调用）
    pub fn with_chat_messages(mut self, count: u32) -> Self {
        self.chat_messages = count;
        self
    }

    /// 设置页面停留秒数（链式调用）
    pub fn with_time_on_page(mut self, secs: u32) -> Self {
        self.time_on_page_secs = secs;
        self
    }

    /// 设置 CTA 点击标记（链式调用）
    pub fn with_cta_clicked(mut self, clicked: bool) -> Self {
        self.cta_clicked = clicked;
        self
    }

    /// 设置表单提交标记（链式调用）
    pub fn with_form_submitted(mut self, submitted: bool) -> Self {
        self.form_submitted = submitted;
        self
    }

    /// 访客展示名：显示名 > 邮箱 > 匿名占位
    pub fn visitor_label(&self) -> &str {
        self.visitor_name
            .as_deref()
            .or(self.visitor_email.as_deref())
            .unwrap_or("An anonymous visitor")
    }
}
