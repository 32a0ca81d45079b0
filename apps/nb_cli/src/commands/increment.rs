// apps/nb_cli/src/commands/increment.rs

//! 同化增量

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{parse_date, Session, SessionOptions};
use nb_forcing::{IncrementBuilder, IncrementMode};

/// 增量参数
#[derive(Args)]
pub struct IncrementArgs {
    /// 日期 YYYYMMDD
    pub date: String,

    /// 模式 (coldstart, operational)
    #[arg(long, default_value = "operational")]
    pub mode: String,
}

/// 执行增量命令
pub fn execute(args: IncrementArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options)?;
    let date = parse_date(&args.date)?;
    let mode: IncrementMode = args.mode.parse().context("解析增量模式失败")?;
    let path = IncrementBuilder::new(&session.ctx)
        .build(&date, mode)
        .with_context(|| format!("构建 {} 的同化增量失败", date))?;
    info!("增量文件: {}", path.display());
    session.finish();
    Ok(())
}
