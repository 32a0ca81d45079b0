// apps/nb_cli/src/commands/init.rs

//! 冷启动初始场

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{parse_date, Session, SessionOptions};
use nb_forcing::InitialStateBuilder;

/// 初始场参数
#[derive(Args)]
pub struct InitArgs {
    /// 日期 YYYYMMDD
    pub date: String,
}

/// 执行初始场命令
pub fn execute(args: InitArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options)?;
    let date = parse_date(&args.date)?;
    let path = InitialStateBuilder::new(&session.ctx)
        .build(&date)
        .with_context(|| format!("构建 {} 的初始场失败", date))?;
    info!("初始场: {}", path.display());
    session.finish();
    Ok(())
}
