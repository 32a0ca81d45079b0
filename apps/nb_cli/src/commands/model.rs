// apps/nb_cli/src/commands/model.rs

//! 模式运行

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{parse_date, Session, SessionOptions};
use nb_foundation::DateWindow;
use nb_workflow::ModelRunner;

/// 模式运行参数
#[derive(Args)]
pub struct ModelArgs {
    /// 起始日期 YYYYMMDD
    #[arg(long)]
    pub date: String,

    /// 预报天数
    #[arg(long)]
    pub ndays: u32,
}

/// 执行模式运行命令
pub fn execute(args: ModelArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options)?;
    let window = DateWindow::new(parse_date(&args.date)?, args.ndays)?;
    let runner = ModelRunner::new(session.config.clone(), window, session.runner.clone())?;
    let uploaded = runner
        .full_run()
        .with_context(|| format!("{} 的模式运行失败", window.start))?;
    info!("模式运行完成，上传 {} 个文件", uploaded.len());
    session.finish();
    Ok(())
}
