// apps/nb_cli/src/commands/boundary.rs

//! 开边界日文件

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{parse_date, Session, SessionOptions};
use nb_forcing::{BoundaryComposer, Teos10Options};
use nb_foundation::DateWindow;

/// 边界参数
#[derive(Args)]
pub struct BoundaryArgs {
    /// 起始日期 YYYYMMDD
    pub date: String,

    /// 预报天数
    pub ndays: u32,

    /// TEOS-10 缺省经度 [°E]
    #[arg(long)]
    pub lon: Option<f64>,

    /// TEOS-10 缺省纬度 [°N]
    #[arg(long)]
    pub lat: Option<f64>,
}

/// 执行边界命令
pub fn execute(args: BoundaryArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options)?;
    let window = DateWindow::new(parse_date(&args.date)?, args.ndays)?;
    let products = BoundaryComposer::new(&session.ctx)
        .with_teos10(Teos10Options::with_fallback(args.lon, args.lat))
        .run(&window)
        .with_context(|| format!("构建 {} 起 {} 天的边界文件失败", window.start, window.ndays))?;
    info!(
        "边界文件: {} 个 2D, {} 个 3D, {} 个 TEOS-10",
        products.surface.len(),
        products.profile.len(),
        products.teos10.len()
    );
    session.finish();
    Ok(())
}
