// apps/nb_cli/src/commands/mod.rs

//! 子命令与共享的运行会话

pub mod boundary;
pub mod config;
pub mod increment;
pub mod init;
pub mod model;
pub mod run;
pub mod runoff;
pub mod teos10;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use nb_config::PipelineConfig;
use nb_forcing::ForcingContext;
use nb_foundation::ForecastDate;
use nb_tools::{CommandRunner, RecordingRunner};

/// 全局选项
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// 配置文件
    pub config: Option<PathBuf>,
    /// 演练模式
    pub dry_run: bool,
}

impl SessionOptions {
    /// 加载配置
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let config = PipelineConfig::load(self.config.as_deref()).with_context(|| match &self.config {
            Some(p) => format!("加载配置文件 {} 失败", p.display()),
            None => "从环境变量构造配置失败".to_string(),
        })?;
        Ok(config)
    }
}

/// 一次命令执行的共享部件
pub struct Session {
    pub config: Arc<PipelineConfig>,
    pub runner: Arc<dyn CommandRunner>,
    pub ctx: ForcingContext,
    recorder: Option<Arc<RecordingRunner>>,
}

impl Session {
    /// 加载配置并组装执行器与构建上下文
    pub fn open(options: &SessionOptions) -> Result<Self> {
        let config = Arc::new(options.load_config()?);
        let recorder = options.dry_run.then(|| Arc::new(RecordingRunner::new()));
        let runner: Arc<dyn CommandRunner> = match &recorder {
            Some(r) => r.clone() as Arc<dyn CommandRunner>,
            None => ForcingContext::system_runner(&config),
        };
        let ctx = ForcingContext::from_config(config.clone(), runner.clone());
        Ok(Self {
            config,
            runner,
            ctx,
            recorder,
        })
    }

    /// 演练模式下列出记录的命令
    pub fn finish(&self) {
        if let Some(recorder) = &self.recorder {
            let lines = recorder.command_lines();
            tracing::info!("演练模式：记录 {} 条外部命令", lines.len());
            for line in lines {
                println!("{}", line);
            }
        }
    }
}

/// 解析 `YYYYMMDD` 日期
pub fn parse_date(s: &str) -> Result<ForecastDate> {
    ForecastDate::parse(s).with_context(|| format!("无效日期 '{}'，应为 YYYYMMDD", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("20250701").unwrap().to_string(), "20250701");
        assert!(parse_date("2025-07-01").is_err());
    }

    #[test]
    fn test_dry_run_session_records_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        PipelineConfig::default().save_to_file(&path).unwrap();

        let options = SessionOptions {
            config: Some(path),
            dry_run: true,
        };
        let session = Session::open(&options).unwrap();
        assert!(session.recorder.is_some());
        assert_eq!(session.config.model.run_id, PipelineConfig::default().model.run_id);
        session.finish();
    }

    #[test]
    fn test_missing_config_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let options = SessionOptions {
            config: Some(dir.path().join("absent.json")),
            dry_run: false,
        };
        let err = options.load_config().unwrap_err();
        assert!(format!("{:#}", err).contains("absent.json"));
    }
}
