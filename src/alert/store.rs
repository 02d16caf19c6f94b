//! 告警存储
//!
//! 每条告警是一次通知决策的持久记录：创建一次，三个投递标记各自
//! 独立翻转一次，从不删除。去重守卫放在存储层做成原子操作，
//! 避免「先查后插」在并发下写出两条。

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kind::AlertKind;

/// 告警记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    /// 接收人 ID
    pub recipient_id: String,
    /// 所属 campaign ID
    pub campaign_id: String,
    /// 触发的访问记录 ID
    pub visit_id: String,
    /// 条件类型
    pub kind: AlertKind,
    /// 渲染好的标题
    pub title: String,
    /// 渲染好的正文
    pub message: String,
    /// 访客/campaign 快照（渠道渲染不回查）
    #[serde(default)]
    pub data: serde_json::Value,
    /// 邮件已投递
    #[serde(default)]
    pub sent_via_email: bool,
    /// chat-webhook 已投递
    #[serde(default)]
    pub sent_via_slack: bool,
    /// 通用 webhook 已投递
    #[serde(default)]
    pub sent_via_webhook: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// 创建新告警（三个投递标记全 false）
    pub fn new(
        recipient_id: impl Into<String>,
        campaign_id: impl Into<String>,
        visit_id: impl Into<String>,
        kind: AlertKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: recipient_id.into(),
            campaign_id: campaign_id.into(),
            visit_id: visit_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            data,
            sent_via_email: false,
            sent_via_slack: false,
            sent_via_webhook: false,
            created_at: Utc::now(),
        }
    }

    /// 去重键：(recipient, campaign, visit, kind) 四元组
    fn dedup_matches(&self, other: &Alert) -> bool {
        self.recipient_id == other.recipient_id
            && self.campaign_id == other.campaign_id
            && self.visit_id == other.visit_id
            && self.kind == other.kind
    }
}

/// 投递渠道标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentVia {
    Email,
    Slack,
    Webhook,
}

/// 去重插入的结果
#[derive(Debug)]
pub enum InsertOutcome {
    /// 新建成功
    Created(Alert),
    /// 窗口内已有相同四元组，未插入
    Duplicate,
}

/// 告警存储接口
pub trait AlertStore: Send + Sync {
    /// 原子地执行窗口去重检查并插入。窗口以待插告警的 created_at
    /// 往回推 `window` 计算。
    fn insert_unique(&self, alert: Alert, window: Duration) -> Result<InsertOutcome>;

    /// 标记单个渠道投递成功（幂等点更新，未知 id 静默忽略）
    fn mark_sent(&self, id: Uuid, via: SentVia) -> Result<()>;

    /// 指定接收人在 since 之后创建、尚未邮件投递的告警
    fn pending_email_since(&self, recipient_id: &str, since: DateTime<Utc>) -> Result<Vec<Alert>>;

    /// 每日汇总成功后按 id 批量标记邮件已发
    fn mark_email_sent(&self, ids: &[Uuid]) -> Result<()>;

    /// 指定接收人在 before 之前创建、尚未邮件投递的告警数量
    /// （用于观测掉出汇总窗口的记录）
    fn stale_email_count(&self, recipient_id: &str, before: DateTime<Utc>) -> Result<usize>;

    /// 最近 limit 条（按创建时间升序，CLI 展示用）
    fn recent(&self, limit: usize) -> Result<Vec<Alert>>;
}

fn apply_flag(alert: &mut Alert, via: SentVia) {
    match via {
        SentVia::Email => alert.sent_via_email = true,
        SentVia::Slack => alert.sent_via_slack = true,
        SentVia::Webhook => alert.sent_via_webhook = true,
    }
}

// ---------------------------------------------------------------------------
// 内存实现
// ---------------------------------------------------------------------------

/// 内存存储（测试与嵌入场景）
pub struct MemoryAlertStore {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
        }
    }

    /// 当前全部记录的快照（测试断言用）
    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertStore for MemoryAlertStore {
    fn insert_unique(&self, alert: Alert, window: Duration) -> Result<InsertOutcome> {
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|_| anyhow!("alert store lock poisoned"))?;

        let cutoff = alert.created_at - window;
        let duplicate = alerts
            .iter()
            .any(|existing| existing.dedup_matches(&alert) && existing.created_at > cutoff);
        if duplicate {
            return Ok(InsertOutcome::Duplicate);
        }

        alerts.push(alert.clone());
        Ok(InsertOutcome::Created(alert))
    }

    fn mark_sent(&self, id: Uuid, via: SentVia) -> Result<()> {
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|_| anyhow!("alert store lock poisoned"))?;
        if let Some(alert) = alerts.iter_mut().find(|a| a.id == id) {
            apply_flag(alert, via);
        }
        Ok(())
    }

    fn pending_email_since(&self, recipient_id: &str, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        let alerts = self
            .alerts
            .lock()
            .map_err(|_| anyhow!("alert store lock poisoned"))?;
        Ok(alerts
            .iter()
            .filter(|a| {
                a.recipient_id == recipient_id && !a.sent_via_email && a.created_at >= since
            })
            .cloned()
            .collect())
    }

    fn mark_email_sent(&self, ids: &[Uuid]) -> Result<()> {
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|_| anyhow!("alert store lock poisoned"))?;
        for alert in alerts.iter_mut() {
            if ids.contains(&alert.id) {
                alert.sent_via_email = true;
            }
        }
        Ok(())
    }

    fn stale_email_count(&self, recipient_id: &str, before: DateTime<Utc>) -> Result<usize> {
        let alerts = self
            .alerts
            .lock()
            .map_err(|_| anyhow!("alert store lock poisoned"))?;
        Ok(alerts
            .iter()
            .filter(|a| {
                a.recipient_id == recipient_id && !a.sent_via_email && a.created_at < before
            })
            .count())
    }

    fn recent(&self, limit: usize) -> Result<Vec<Alert>> {
        let alerts = self
            .alerts
            .lock()
            .map_err(|_| anyhow!("alert store lock poisoned"))?;
        let mut all = alerts.clone();
        all.sort_by_key(|a| a.created_at);
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }
}

// ---------------------------------------------------------------------------
// JSONL 实现
// ---------------------------------------------------------------------------

/// 本地 JSONL 存储
///
/// 插入是锁内的检查加追加；标记更新走「临时文件 + 原子改名」重写。
pub struct JsonlAlertStore {
    path: PathBuf,
}

impl JsonlAlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认存储路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("visitor-alerts")
            .join("alerts.jsonl")
    }

    fn open_locked(&self) -> Result<File> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn read_records(file: &File) -> Vec<Alert> {
        BufReader::new(file)
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }

    /// 全量重写：写临时文件再原子改名
    fn rewrite(&self, records: &[Alert]) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp = File::create(&temp_path)?;
            for record in records {
                writeln!(temp, "{}", serde_json::to_string(record)?)?;
            }
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// 锁内读取、就地修改、重写
    fn update_records<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Alert>),
    {
        use fs2::FileExt;

        let file = self.open_locked()?;
        let mut records = Self::read_records(&file);
        mutate(&mut records);
        let result = self.rewrite(&records);
        FileExt::unlock(&file)?;
        result
    }
}

impl AlertStore for JsonlAlertStore {
    fn insert_unique(&self, alert: Alert, window: Duration) -> Result<InsertOutcome> {
        use fs2::FileExt;

        let file = self.open_locked()?;
        let records = Self::read_records(&file);

        let cutoff = alert.created_at - window;
        let duplicate = records
            .iter()
            .any(|existing| existing.dedup_matches(&alert) && existing.created_at > cutoff);
        if duplicate {
            FileExt::unlock(&file)?;
            return Ok(InsertOutcome::Duplicate);
        }

        let mut file = file;
        let written = writeln!(file, "{}", serde_json::to_string(&alert)?);
        FileExt::unlock(&file)?;
        written?;
        Ok(InsertOutcome::Created(alert))
    }

    fn mark_sent(&self, id: Uuid, via: SentVia) -> Result<()> {
        self.update_records(|records| {
            if let Some(alert) = records.iter_mut().find(|a| a.id == id) {
                apply_flag(alert, via);
            }
        })
    }

    fn pending_email_since(&self, recipient_id: &str, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        use fs2::FileExt;

        let file = self.open_locked()?;
        let records = Self::read_records(&file);
        FileExt::unlock(&file)?;

        Ok(records
            .into_iter()
            .filter(|a| {
                a.recipient_id == recipient_id && !a.sent_via_email && a.created_at >= since
            })
            .collect())
    }

    fn mark_email_sent(&self, ids: &[Uuid]) -> Result<()> {
        self.update_records(|records| {
            for alert in records.iter_mut() {
                if ids.contains(&alert.id) {
                    alert.sent_via_email = true;
                }
            }
        })
    }

    fn stale_email_count(&self, recipient_id: &str, before: DateTime<Utc>) -> Result<usize> {
        use fs2::FileExt;

        let file = self.open_locked()?;
        let records = Self::read_records(&file);
        FileExt::unlock(&file)?;

        Ok(records
            .iter()
            .filter(|a| {
                a.recipient_id == recipient_id && !a.sent_via_email && a.created_at < before
            })
            .count())
    }

    fn recent(&self, limit: usize) -> Result<Vec<Alert>> {
        use fs2::FileExt;

        let file = self.open_locked()?;
        let mut records = Self::read_records(&file);
        FileExt::unlock(&file)?;

        records.sort_by_key(|a| a.created_at);
        let start = records.len().saturating_sub(limit);
        Ok(records[start..].to_vec())
    }
}
