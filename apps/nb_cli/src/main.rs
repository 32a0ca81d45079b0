// apps/nb_cli/src/main.rs

//! NEMO Baltic 业务化强迫场流水线命令行
//!
//! 每个子命令对应流水线的一个阶段，`run` 按业务顺序执行全部阶段。
//! `--dry-run` 时所有外部工具只记录命令行、不实际执行。

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// NEMO Baltic 强迫场流水线
#[derive(Parser)]
#[command(name = "nb_cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Baltic NEMO operational forcing pipeline", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// JSON 配置文件（缺省时从环境变量构造）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 只记录外部命令，不执行
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 完整每日运行
    Run(commands::run::RunArgs),
    /// 同化增量
    Increment(commands::increment::IncrementArgs),
    /// 开边界日文件
    Boundary(commands::boundary::BoundaryArgs),
    /// 径流温度
    Runoff(commands::runoff::RunoffArgs),
    /// 单文件 TEOS-10 转换
    #[command(long_about = "单文件 TEOS-10 转换：so/thetao → SA/CT。\n\n\
        只对波罗的海多边形内的点给出精确的绝对盐度。多边形以外 SAAR 取 0，\n\
        SA 只是近似值（转换时记录警告），不适用于外海数据。")]
    Teos10(commands::teos10::Teos10Args),
    /// 冷启动初始场
    Init(commands::init::InitArgs),
    /// 模式运行
    Model(commands::model::ModelArgs),
    /// 打印生效配置
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = commands::SessionOptions {
        config: cli.config,
        dry_run: cli.dry_run,
    };
    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &options),
        Commands::Increment(args) => commands::increment::execute(args, &options),
        Commands::Boundary(args) => commands::boundary::execute(args, &options),
        Commands::Runoff(args) => commands::runoff::execute(args, &options),
        Commands::Teos10(args) => commands::teos10::execute(args, &options),
        Commands::Init(args) => commands::init::execute(args, &options),
        Commands::Model(args) => commands::model::execute(args, &options),
        Commands::Config(args) => commands::config::execute(args, &options),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_teos10_help_states_baltic_limit() {
        let cmd = Cli::command();
        let sub = cmd.find_subcommand("teos10").unwrap();
        let long = sub.get_long_about().unwrap().to_string();
        assert!(long.contains("SAAR"));
        assert!(long.contains("波罗的海"));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
