//! Visitor Alerts CLI
//!
//! 访客告警引擎的操作入口：投喂事件、触发每日汇总、查看最近告警

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use visitor_alerts::{EngineBuilder, EngineConfig, VisitEvent};

#[derive(Parser)]
#[command(name = "valert")]
#[command(about = "Visitor Alerts - 访客互动告警引擎")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/visitor-alerts/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 处理一个访客事件（JSON 文件）
    Ingest {
        /// 事件 JSON 文件路径
        #[arg(long, short)]
        file: PathBuf,
        /// 只落库不外呼
        #[arg(long)]
        dry_run: bool,
    },
    /// 跑一轮每日汇总（由外部调度器每天触发）
    Digest,
    /// 查看最近的告警
    Recent {
        /// 条数上限
        #[arg(long, short, default_value = "20")]
        limit: usize,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化 tracing 日志系统
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug valert ingest -f event.json
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("visitor_alerts=info,valert=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    match cli.command {
        Commands::Ingest { file, dry_run } => {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("failed to read event file {}", file.display()))?;
            let event: VisitEvent = serde_json::from_str(&content)
                .with_context(|| format!("invalid visit event in {}", file.display()))?;

            let engine = EngineBuilder::new(config).dry_run(dry_run).build()?;
            // 记进访问日志，ReturningVisitor 才有历史可查
            engine.visit_log.record(&event)?;
            engine.dispatcher.handle_visit_event(&event).await?;
            info!(visit_id = %event.visit_id, "Visit event processed");
        }
        Commands::Digest => {
            let engine = EngineBuilder::new(config).build()?;
            let summary = engine.digest.run_daily_digests().await?;
            println!(
                "处理了 {} 个接收人，发出 {} 封汇总邮件",
                summary.recipients_processed, summary.emails_sent
            );
        }
        Commands::Recent { limit, json } => {
            let engine = EngineBuilder::new(config).build()?;
            let alerts = engine.store.recent(limit)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
            } else if alerts.is_empty() {
                println!("暂无告警记录");
            } else {
                println!("最近 {} 条告警:\n", alerts.len());
                for alert in alerts {
                    let flags = format!(
                        "email:{} slack:{} webhook:{}",
                        mark(alert.sent_via_email),
                        mark(alert.sent_via_slack),
                        mark(alert.sent_via_webhook),
                    );
                    println!(
                        "[{}] {} {} ({})",
                        alert.created_at.format("%Y-%m-%d %H:%M"),
                        alert.kind,
                        alert.title,
                        flags
                    );
                }
            }
        }
    }

    Ok(())
}

fn mark(sent: bool) -> &'static str {
    if sent {
        "✓"
    } else {
        "-"
    }
}
