// apps/nb_cli/src/commands/runoff.rs

//! 径流温度

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{parse_date, Session, SessionOptions};
use nb_forcing::RunoffBuilder;

/// 径流参数
#[derive(Args)]
pub struct RunoffArgs {
    /// 日期 YYYYMMDD
    pub date: String,

    /// 回溯天数（缺省取配置）
    #[arg(long)]
    pub lookback: Option<u32>,
}

/// 执行径流命令
pub fn execute(args: RunoffArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options)?;
    let date = parse_date(&args.date)?;
    let lookback = args
        .lookback
        .unwrap_or(session.config.runoff.lookback_days);
    let path = RunoffBuilder::new(&session.ctx)
        .build_with_lookback(&date, lookback)
        .with_context(|| format!("构建 {} 的径流温度失败", date))?;
    info!("径流温度文件: {}", path.display());
    session.finish();
    Ok(())
}
