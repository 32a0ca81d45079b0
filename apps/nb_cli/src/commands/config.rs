// apps/nb_cli/src/commands/config.rs

//! 打印生效配置

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use super::SessionOptions;

/// 配置参数
#[derive(Args)]
pub struct ConfigArgs {
    /// 同时保存到文件
    #[arg(long)]
    pub save: Option<PathBuf>,
}

/// 执行配置命令
pub fn execute(args: ConfigArgs, options: &SessionOptions) -> Result<()> {
    let config = options.load_config()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    if let Some(path) = &args.save {
        config
            .save_to_file(path)
            .with_context(|| format!("保存配置到 {} 失败", path.display()))?;
        info!("配置已保存: {}", path.display());
    }
    Ok(())
}
