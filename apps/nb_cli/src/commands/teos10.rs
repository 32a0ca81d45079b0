// apps/nb_cli/src/commands/teos10.rs

//! 单文件 TEOS-10 转换

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::{Session, SessionOptions};
use nb_forcing::teos10::convert_file;
use nb_forcing::Teos10Options;

/// 转换参数
#[derive(Args)]
pub struct Teos10Args {
    /// 输入文件（含 so / thetao）
    pub input: PathBuf,

    /// 输出文件
    pub output: PathBuf,

    /// 缺省经度 [°E]
    #[arg(long)]
    pub lon: Option<f64>,

    /// 缺省纬度 [°N]
    #[arg(long)]
    pub lat: Option<f64>,
}

/// 执行转换命令
pub fn execute(args: Teos10Args, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options)?;
    let teos = Teos10Options::with_fallback(args.lon, args.lat);
    convert_file(session.ctx.store(), &args.input, &args.output, &teos)
        .with_context(|| format!("转换 {} 失败", args.input.display()))?;
    Ok(())
}
