// apps/nb_cli/src/commands/run.rs

//! 完整每日运行

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use super::{parse_date, Session, SessionOptions};
use nb_forcing::IncrementMode;
use nb_workflow::{PipelineDriver, RunRequest};

/// 运行参数
#[derive(Args)]
pub struct RunArgs {
    /// 请求日期 YYYYMMDD（处理日期为前一天）
    #[arg(long)]
    pub date: String,

    /// 预报天数
    #[arg(long)]
    pub ndays: u32,

    /// 增量模式 (coldstart, operational)；缺省按冷启动日期自动选择
    #[arg(long)]
    pub mode: Option<String>,
}

/// 执行运行命令
pub fn execute(args: RunArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options)?;
    let mut request = RunRequest::new(parse_date(&args.date)?, args.ndays);
    if let Some(mode) = &args.mode {
        let mode: IncrementMode = mode.parse().context("解析增量模式失败")?;
        request = request.with_mode(mode);
    }

    let driver = PipelineDriver::new(
        session.config.clone(),
        session.ctx.clone(),
        session.runner.clone(),
    );
    let summary = driver
        .run(&request)
        .with_context(|| format!("{} 的业务运行失败", request.processing_date()))?;

    for stage in summary.warnings() {
        warn!(
            "阶段 {} 失败: {}",
            stage.kind,
            stage.error.as_deref().unwrap_or("")
        );
    }
    info!("运行完成: {} 个阶段", summary.stages.len());
    session.finish();
    Ok(())
}
