//! 配置加载
//!
//! `~/.config/visitor-alerts/config.json`，缺失的字段走默认值。
//! campaign 与接收人表在线上由数据服务提供，这里的静态表供 CLI
//! 和单机部署使用。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::alert::directory::{CampaignEntry, RecipientProfile};

fn default_dashboard_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_smtp_from() -> String {
    "alerts@localhost".to_string()
}

/// SMTP 出口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 发件人地址
    #[serde(default = "default_smtp_from")]
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            from: default_smtp_from(),
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// dashboard 根地址（邮件与消息里的跳转链接）
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
    /// 出站 HTTP 超时秒数
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// 数据目录（默认配置目录）
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// campaign 表
    #[serde(default)]
    pub campaigns: Vec<CampaignEntry>,
    /// 接收人表
    #[serde(default)]
    pub recipients: Vec<RecipientProfile>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dashboard_url: default_dashboard_url(),
            http_timeout_secs: default_http_timeout_secs(),
            smtp: SmtpConfig::default(),
            data_dir: None,
            campaigns: Vec::new(),
            recipients: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// 配置目录
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("visitor-alerts")
    }

    /// 从默认路径加载；文件不存在时返回默认配置
    pub fn load() -> Result<Self> {
        let path = Self::config_dir().join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// 从指定路径加载
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid config at {}", path.display()))?;
        Ok(config)
    }

    /// 数据目录（存 alerts.jsonl 与 visits.jsonl）
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(Self::config_dir)
    }

    /// 告警存储路径
    pub fn alert_store_path(&self) -> PathBuf {
        self.data_dir().join("alerts.jsonl")
    }

    /// 访问日志路径
    pub fn visit_log_path(&self) -> PathBuf {
        self.data_dir().join("visits.jsonl")
    }
}
