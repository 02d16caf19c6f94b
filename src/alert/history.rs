//! 访问历史查询
//!
//! ReturningVisitor 规则的数据来源：同一 campaign、同一访客邮箱、
//! 排除当前会话的历史会话汇总。线上由跟踪子系统实现；CLI 用
//! 本地 JSONL 访问日志兜底。

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::event::VisitEvent;

/// 一次历史会话的互动汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorSession {
    pub chat_messages: u32,
    pub time_on_page_secs: u32,
}

/// 历史查询接口
pub trait VisitHistory: Send + Sync {
    /// 同一 campaign、同一访客邮箱、session_id 不等于 exclude_session_id
    /// 的全部历史会话
    fn prior_sessions(
        &self,
        campaign_id: &str,
        visitor_email: &str,
        exclude_session_id: &str,
    ) -> Vec<PriorSession>;
}

/// JSONL 访问日志
///
/// `ingest` 每处理一个事件就追加一行；同一 session 的多条快照
/// 在查询时只保留最后一条。
pub struct JsonlVisitLog {
    path: PathBuf,
}

impl JsonlVisitLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 追加一条事件（带文件锁）
    pub fn record(&self, event: &VisitEvent) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        let mut file = file;
        let result = writeln!(file, "{}", serde_json::to_string(event)?);
        file.unlock()?;
        result?;
        Ok(())
    }

    fn read_all(&self) -> Vec<VisitEvent> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        BufReader::new(file)
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }
}

impl VisitHistory for JsonlVisitLog {
    fn prior_sessions(
        &self,
        campaign_id: &str,
        visitor_email: &str,
        exclude_session_id: &str,
    ) -> Vec<PriorSession> {
        // 同一 session 可能有多条快照，按出现顺序覆盖，留最后一条
        let mut by_session: Vec<(String, PriorSession)> = Vec::new();
        for event in self.read_all() {
            if event.campaign_id != campaign_id {
                continue;
            }
            if event.session_id == exclude_session_id {
                continue;
            }
            if event.visitor_email.as_deref() != Some(visitor_email) {
                continue;
            }
            let session = PriorSession {
                chat_messages: event.chat_messages,
                time_on_page_secs: event.time_on_page_secs,
            };
            if let Some(existing) = by_session
                .iter_mut()
                .find(|(id, _)| *id == event.session_id)
            {
                existing.1 = session;
            } else {
                by_session.push((event.session_id, session));
            }
        }
        by_session.into_iter().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(session: &str, email: &str, chat: u32, secs: u32) -> VisitEvent {
        VisitEvent::new(format!("v-{session}"), "c-1", session)
            .with_email(email)
            .with_chat_messages(chat)
            .with_time_on_page(secs)
    }

    #[test]
    fn test_prior_sessions_excludes_current() {
        let dir = tempdir().unwrap();
        let log = JsonlVisitLog::new(dir.path().join("visits.jsonl"));

        log.record(&event("s-1", "jane@acme.com", 2, 10)).unwrap();
        log.record(&event("s-2", "jane@acme.com", 2, 10)).unwrap();
        log.record(&event("s-3", "jane@acme.com", 5, 90)).unwrap();

        let prior = log.prior_sessions("c-1", "jane@acme.com", "s-3");
        assert_eq!(prior.len(), 2);
        let total: u32 = prior.iter().map(|s| s.chat_messages).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_prior_sessions_filters_campaign_and_email() {
        let dir = tempdir().unwrap();
        let log = JsonlVisitLog::new(dir.path().join("visits.jsonl"));

        log.record(&event("s-1", "jane@acme.com", 2, 10)).unwrap();
        log.record(&event("s-2", "bob@other.io", 9, 300)).unwrap();
        let mut foreign = event("s-4", "jane@acme.com", 9, 300);
        foreign.campaign_id = "c-other".to_string();
        log.record(&foreign).unwrap();

        let prior = log.prior_sessions("c-1", "jane@acme.com", "s-9");
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[0].chat_messages, 2);
    }

    #[test]
    fn test_repeated_snapshots_keep_last_per_session() {
        let dir = tempdir().unwrap();
        let log = JsonlVisitLog::new(dir.path().join("visits.jsonl"));

        // 同一会话的快照是累计值，后一条覆盖前一条
        log.record(&event("s-1", "jane@acme.com", 1, 20)).unwrap();
        log.record(&event("s-1", "jane@acme.com", 4, 80)).unwrap();

        let prior = log.prior_sessions("c-1", "jane@acme.com", "s-2");
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[0].chat_messages, 4);
        assert_eq!(prior[0].time_on_page_secs, 80);
    }

    #[test]
    fn test_missing_file_yields_empty() {
        let dir = tempdir().unwrap();
        let log = JsonlVisitLog::new(dir.path().join("absent.jsonl"));
        assert!(log.prior_sessions("c-1", "a@b.c", "s-1").is_empty());
    }
}
