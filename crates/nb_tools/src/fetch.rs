// crates/nb_tools/src/fetch.rs

//! 远程海洋数据抓取
//!
//! 按时间窗口、变量列表和经纬度/深度范围从 Copernicus Marine 目录抓取子集。
//! 每个调用点的数据集、变量和范围是固定的，见 [`call_sites`]。
//! 不重试：一次失败直接作为硬错误返回。

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::process::{clear_stale_output, CommandRunner, ToolCommand};
use nb_config::CredentialsProvider;
use nb_foundation::{NbError, NbResult};

/// 闭区间范围
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    /// 下限
    pub min: f64,
    /// 上限
    pub max: f64,
}

impl Range {
    /// 创建范围
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// 抓取区域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// 经度范围
    pub lon: Range,
    /// 纬度范围
    pub lat: Range,
    /// 深度范围（米），表层产品为 None
    pub depth: Option<Range>,
}

/// 子集请求
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetRequest {
    /// 数据集 ID
    pub dataset_id: String,
    /// 变量
    pub variables: Vec<String>,
    /// 开始时间
    pub start: NaiveDateTime,
    /// 结束时间（含）
    pub end: NaiveDateTime,
    /// 区域
    pub bbox: BoundingBox,
}

impl SubsetRequest {
    /// 创建请求，结束时间不得早于开始时间
    pub fn new(
        dataset_id: &str,
        variables: &[&str],
        start: NaiveDateTime,
        end: NaiveDateTime,
        bbox: BoundingBox,
    ) -> NbResult<Self> {
        if end < start {
            return Err(NbError::invalid_input(format!(
                "抓取时间窗口无效: {} > {}",
                start, end
            )));
        }
        if variables.is_empty() {
            return Err(NbError::invalid_input("抓取变量列表为空"));
        }
        Ok(Self {
            dataset_id: dataset_id.to_string(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
            start,
            end,
            bbox,
        })
    }
}

/// 固定的抓取调用点
pub mod call_sites {
    use super::{BoundingBox, Range};

    /// 小时级物理产品
    pub const HOURLY_DATASET: &str = "cmems_mod_bal_phy_anfc_PT1H-i";
    /// 日均物理产品
    pub const DAILY_DATASET: &str = "cmems_mod_bal_phy_anfc_P1D-m";

    /// 冷启动 SLA 变量
    pub const COLD_START_VARIABLES: &[&str] = &["sla"];
    /// 冷启动 SLA 区域
    pub const COLD_START_BBOX: BoundingBox = BoundingBox {
        lon: Range::new(19.0, 30.2),
        lat: Range::new(56.0, 61.0),
        depth: None,
    };

    /// 开边界变量
    pub const BOUNDARY_VARIABLES: &[&str] = &["sla", "thetao", "so", "siconc", "sithick"];
    /// 开边界区域（西边界条带）
    pub const BOUNDARY_BBOX: BoundingBox = BoundingBox {
        lon: Range::new(21.5, 21.6),
        lat: Range::new(57.0, 61.0),
        depth: Some(Range::new(0.0, 150.0)),
    };

    /// 初始场变量
    pub const INITIAL_VARIABLES: &[&str] = &["so", "thetao"];
    /// 初始场区域
    pub const INITIAL_BBOX: BoundingBox = BoundingBox {
        lon: Range::new(19.0, 31.0),
        lat: Range::new(56.0, 61.0),
        depth: Some(Range::new(0.0, 140.0)),
    };
}

/// 远程海洋数据目录
pub trait MarineCatalog: Send + Sync {
    /// 抓取子集到指定文件，返回输出路径
    fn fetch(&self, request: &SubsetRequest, output: &Path) -> NbResult<PathBuf>;
}

/// Copernicus Marine Toolbox 命令行
pub struct CopernicusMarineCli {
    runner: Arc<dyn CommandRunner>,
    credentials: Arc<dyn CredentialsProvider>,
    executable: String,
}

/// 工具箱读取的用户名环境变量
const SERVICE_USERNAME_VAR: &str = "COPERNICUSMARINE_SERVICE_USERNAME";
/// 工具箱读取的密码环境变量
const SERVICE_PASSWORD_VAR: &str = "COPERNICUSMARINE_SERVICE_PASSWORD";

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl CopernicusMarineCli {
    /// 创建，凭据由调用方注入
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        credentials: Arc<dyn CredentialsProvider>,
        executable: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            credentials,
            executable: executable.into(),
        }
    }

    /// 构造 subset 命令（不含凭据）
    pub fn command(&self, request: &SubsetRequest, output: &Path) -> ToolCommand {
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut cmd = ToolCommand::new(&self.executable)
            .arg("subset")
            .arg("--dataset-id")
            .arg(&request.dataset_id);
        for v in &request.variables {
            cmd = cmd.arg("--variable").arg(v);
        }
        let b = &request.bbox;
        cmd = cmd
            .arg("--minimum-longitude")
            .arg(b.lon.min.to_string())
            .arg("--maximum-longitude")
            .arg(b.lon.max.to_string())
            .arg("--minimum-latitude")
            .arg(b.lat.min.to_string())
            .arg("--maximum-latitude")
            .arg(b.lat.max.to_string());
        if let Some(depth) = b.depth {
            cmd = cmd
                .arg("--minimum-depth")
                .arg(depth.min.to_string())
                .arg("--maximum-depth")
                .arg(depth.max.to_string());
        }
        cmd.arg("--start-datetime")
            .arg(request.start.format(DATETIME_FORMAT).to_string())
            .arg("--end-datetime")
            .arg(request.end.format(DATETIME_FORMAT).to_string())
            .arg("--output-directory")
            .path_arg(dir)
            .arg("--output-filename")
            .arg(name)
            .arg("--overwrite")
            .expect_output(output)
    }
}

impl std::fmt::Debug for CopernicusMarineCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopernicusMarineCli")
            .field("executable", &self.executable)
            .field("credentials", &self.credentials.name())
            .finish()
    }
}

impl MarineCatalog for CopernicusMarineCli {
    fn fetch(&self, request: &SubsetRequest, output: &Path) -> NbResult<PathBuf> {
        // 凭据缺失在任何网络调用之前报配置错误
        let creds = self.credentials.credentials()?;
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        clear_stale_output(output)?;

        tracing::info!(
            "抓取 {} [{}] {} -> {}",
            request.dataset_id,
            request.variables.join(" "),
            request.start.format(DATETIME_FORMAT),
            request.end.format(DATETIME_FORMAT)
        );
        let cmd = self
            .command(request, output)
            .secret_env(SERVICE_USERNAME_VAR, creds.username)
            .secret_env(SERVICE_PASSWORD_VAR, creds.password);
        self.runner.run_checked(&cmd)?;
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{RecordingRunner, ToolOutcome};
    use nb_config::{Credentials, EnvCredentials};
    use nb_foundation::{ErrorCategory, ForecastDate};

    struct Fixed;

    impl CredentialsProvider for Fixed {
        fn credentials(&self) -> NbResult<Credentials> {
            Ok(Credentials {
                username: "u".into(),
                password: "p".into(),
            })
        }
    }

    fn cold_start_request() -> SubsetRequest {
        let start = ForecastDate::parse("20250701").unwrap().start_of_day();
        SubsetRequest::new(
            call_sites::HOURLY_DATASET,
            call_sites::COLD_START_VARIABLES,
            start,
            start + chrono::Duration::hours(1),
            call_sites::COLD_START_BBOX,
        )
        .unwrap()
    }

    #[test]
    fn test_command_line() {
        let cli = CopernicusMarineCli::new(
            Arc::new(RecordingRunner::new()),
            Arc::new(Fixed),
            "copernicusmarine",
        );
        let line = cli
            .command(&cold_start_request(), Path::new("/w/sla_raw.nc"))
            .to_string();
        assert!(line.starts_with("copernicusmarine subset --dataset-id cmems_mod_bal_phy_anfc_PT1H-i"));
        assert!(line.contains("--variable sla"));
        assert!(line.contains("--maximum-longitude 30.2"));
        assert!(line.contains("--start-datetime 2025-07-01T00:00:00"));
        assert!(line.contains("--end-datetime 2025-07-01T01:00:00"));
        assert!(line.contains("--output-filename sla_raw.nc"));
        assert!(!line.contains("--minimum-depth"));
    }

    #[test]
    fn test_missing_credentials_before_network() {
        let runner = Arc::new(RecordingRunner::new());
        let cli = CopernicusMarineCli::new(
            runner.clone(),
            Arc::new(EnvCredentials::from_lookup(|_| None)),
            "copernicusmarine",
        );
        let err = cli
            .fetch(&cold_start_request(), Path::new("/nonexistent/x.nc"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_credentials_passed_as_secret_env() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let cli = CopernicusMarineCli::new(runner.clone(), Arc::new(Fixed), "copernicusmarine");
        // 输出文件未生成，按成功判据失败
        assert!(cli
            .fetch(&cold_start_request(), &dir.path().join("sla.nc"))
            .is_err());
        let cmds = runner.commands();
        assert_eq!(
            cmds[0].secret_env_keys(),
            vec![SERVICE_USERNAME_VAR, SERVICE_PASSWORD_VAR]
        );
        assert!(!cmds[0].to_string().contains(" p "));
    }

    #[test]
    fn test_failed_fetch_with_leftover_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("bc_est_20250701.nc");
        std::fs::write(&raw, b"previous run").unwrap();

        let runner = Arc::new(RecordingRunner::with_handler(|cmd| {
            Ok(ToolOutcome::from_command(cmd, Some(1)))
        }));
        let cli = CopernicusMarineCli::new(runner.clone(), Arc::new(Fixed), "copernicusmarine");
        let err = cli.fetch(&cold_start_request(), &raw).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ExternalTool);
        assert!(!raw.exists());
        assert_eq!(runner.commands().len(), 1);
    }

    #[test]
    fn test_nonzero_exit_with_fresh_download_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("bc_est_20250701.nc");
        std::fs::write(&raw, b"previous run").unwrap();

        let runner = Arc::new(RecordingRunner::with_handler(|cmd| {
            if let Some(out) = cmd.expected_output() {
                std::fs::write(out, b"this run")?;
            }
            Ok(ToolOutcome::from_command(cmd, Some(1)))
        }));
        let cli = CopernicusMarineCli::new(runner, Arc::new(Fixed), "copernicusmarine");
        assert_eq!(cli.fetch(&cold_start_request(), &raw).unwrap(), raw);
        assert_eq!(std::fs::read(&raw).unwrap(), b"this run");
    }

    #[test]
    fn test_invalid_window() {
        let start = ForecastDate::parse("20250701").unwrap().start_of_day();
        assert!(SubsetRequest::new(
            call_sites::HOURLY_DATASET,
            &["sla"],
            start,
            start - chrono::Duration::hours(1),
            call_sites::COLD_START_BBOX,
        )
        .is_err());
    }
}
