// crates/nb_config/src/pipeline_config.rs

//! PipelineConfig - 流水线配置
//!
//! 进程启动时构造一次，之后以参数形式传给每个组件。
//! 组件内部不读取环境变量。
//!
//! 两种来源：
//! - JSON 文件 ([`PipelineConfig::from_file`])，文件中未给出的字段取默认值
//! - 环境变量根目录 ([`PipelineConfig::from_env_with`])：`HPCPERM`、`FORCINGDIR`、`SCRATCH`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::layout::ForcingLayout;
use nb_foundation::ForecastDate;

/// 流水线配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// 目录配置
    #[serde(default)]
    pub paths: PathsConfig,

    /// 外部工具配置
    #[serde(default)]
    pub tools: ToolsConfig,

    /// 模式运行配置
    #[serde(default)]
    pub model: ModelConfig,

    /// 远程归档配置
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// 增量构建配置
    #[serde(default)]
    pub increment: IncrementConfig,

    /// 径流构建配置
    #[serde(default)]
    pub runoff: RunoffConfig,
}

// ============================================================
// 目录
// ============================================================

/// 目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// 强迫场根目录 (FORCINGDIR)
    #[serde(default = "default_forcing_dir")]
    pub forcing_dir: PathBuf,

    /// 前一日模式输出所在的 scratch 目录 (SCRATCH)
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// 模式配置目录（namelist 模板、xml、可执行文件）
    #[serde(default = "default_setup_dir")]
    pub setup_dir: PathBuf,

    /// 模式运行目录根
    #[serde(default = "default_model_root")]
    pub model_root: PathBuf,

    /// CMEMS 凭据文件
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

fn default_forcing_dir() -> PathBuf { PathBuf::from("nemo_ecmwf/forcing") }
fn default_scratch_dir() -> PathBuf { PathBuf::from("scratch") }
fn default_setup_dir() -> PathBuf { PathBuf::from("nemo_ecmwf/setup_N5") }
fn default_model_root() -> PathBuf { PathBuf::from("scratch/nemo") }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            forcing_dir: default_forcing_dir(),
            scratch_dir: default_scratch_dir(),
            setup_dir: default_setup_dir(),
            model_root: default_model_root(),
            credentials_file: None,
        }
    }
}

// ============================================================
// 外部工具
// ============================================================

/// 外部工具配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// CDO 可执行文件
    #[serde(default = "default_cdo")]
    pub cdo: String,

    /// copernicusmarine 可执行文件
    #[serde(default = "default_copernicusmarine")]
    pub copernicusmarine: String,

    /// sbatch 可执行文件
    #[serde(default = "default_sbatch")]
    pub sbatch: String,

    /// rsync 可执行文件
    #[serde(default = "default_rsync")]
    pub rsync: String,

    /// 单个外部命令超时 [s]，None 表示不限
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_cdo() -> String { "cdo".into() }
fn default_copernicusmarine() -> String { "copernicusmarine".into() }
fn default_sbatch() -> String { "sbatch".into() }
fn default_rsync() -> String { "rsync".into() }

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            cdo: default_cdo(),
            copernicusmarine: default_copernicusmarine(),
            sbatch: default_sbatch(),
            rsync: default_rsync(),
            timeout_secs: None,
        }
    }
}

// ============================================================
// 模式运行
// ============================================================

/// 模式运行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 本次运行 ID
    #[serde(default = "default_run_id")]
    pub run_id: String,

    /// 前一日 SSH 输出文件使用的运行 ID
    #[serde(default = "default_ssh_run_id")]
    pub ssh_output_run_id: String,

    /// 运行目录前缀
    #[serde(default = "default_run_dir_prefix")]
    pub run_dir_prefix: String,

    /// 时间步长 rn_rdt [s]
    #[serde(default = "default_rn_rdt")]
    pub rn_rdt: u32,

    /// 并行子区域数
    #[serde(default = "default_subdomains")]
    pub subdomains: u32,

    /// 冷启动日期
    #[serde(default = "default_cold_start_date")]
    pub cold_start_date: ForecastDate,

    /// 起始日为今天时的运行长度 [h]
    #[serde(default = "default_today_run_hours")]
    pub today_run_hours: u32,
}

fn default_run_id() -> String { "EST05nm_op_rerun20".into() }
fn default_ssh_run_id() -> String { "EST05nm_op_rerun21".into() }
fn default_run_dir_prefix() -> String { "NEMO5_EST_0.5nm_op_".into() }
fn default_rn_rdt() -> u32 { 240 }
fn default_subdomains() -> u32 { 256 }
fn default_cold_start_date() -> ForecastDate {
    ForecastDate::from_ymd(2021, 11, 1).unwrap_or_else(|_| ForecastDate::today())
}
fn default_today_run_hours() -> u32 { 120 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            run_id: default_run_id(),
            ssh_output_run_id: default_ssh_run_id(),
            run_dir_prefix: default_run_dir_prefix(),
            rn_rdt: default_rn_rdt(),
            subdomains: default_subdomains(),
            cold_start_date: default_cold_start_date(),
            today_run_hours: default_today_run_hours(),
        }
    }
}

// ============================================================
// 远程归档
// ============================================================

/// 远程归档配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// 是否上传
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 远程用户
    #[serde(default = "default_archive_user")]
    pub user: String,

    /// 远程主机
    #[serde(default = "default_archive_host")]
    pub host: String,

    /// ssh 端口
    #[serde(default = "default_archive_port")]
    pub port: u16,

    /// 远程根目录
    #[serde(default = "default_archive_root")]
    pub remote_root: String,

    /// 上传的预报日（相对起始日）
    #[serde(default = "default_lead_days")]
    pub lead_days: Vec<u32>,
}

fn default_true() -> bool { true }
fn default_archive_user() -> String { "nemo".into() }
fn default_archive_host() -> String { "archive.local".into() }
fn default_archive_port() -> u16 { 2222 }
fn default_archive_root() -> String { "/mnt/archive/ECMWF_op/".into() }
fn default_lead_days() -> Vec<u32> { vec![0] }

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            user: default_archive_user(),
            host: default_archive_host(),
            port: default_archive_port(),
            remote_root: default_archive_root(),
            lead_days: default_lead_days(),
        }
    }
}

// ============================================================
// 构建器参数
// ============================================================

/// 增量构建配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementConfig {
    /// 是否写出模式/EOF 对比调试文件
    #[serde(default = "default_true")]
    pub write_debug_compare: bool,
}

impl Default for IncrementConfig {
    fn default() -> Self {
        Self { write_debug_compare: true }
    }
}

/// 径流构建配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunoffConfig {
    /// 回溯天数
    #[serde(default = "default_lookback")]
    pub lookback_days: u32,
}

fn default_lookback() -> u32 { 4 }

impl Default for RunoffConfig {
    fn default() -> Self {
        Self { lookback_days: default_lookback() }
    }
}

// ============================================================
// 加载与验证
// ============================================================

impl PipelineConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;

        let config: PipelineConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 从进程环境变量构造
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// 从给定的环境查找函数构造
    ///
    /// - `HPCPERM`：工作根，派生 `<HPCPERM>/nemo_ecmwf/forcing` 与 `<HPCPERM>/nemo_ecmwf/setup_N5`
    /// - `FORCINGDIR`：覆盖强迫场目录
    /// - `SCRATCH`：前一日模式输出目录，同时派生 `<SCRATCH>/nemo` 运行根
    /// - `HOME`：派生 `~/.cmems_credentials`
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(hpcperm) = non_empty("HPCPERM") {
            let work = PathBuf::from(hpcperm).join("nemo_ecmwf");
            config.paths.forcing_dir = work.join("forcing");
            config.paths.setup_dir = work.join("setup_N5");
        }
        if let Some(forcing) = non_empty("FORCINGDIR") {
            config.paths.forcing_dir = PathBuf::from(forcing);
        }
        if let Some(scratch) = non_empty("SCRATCH") {
            let scratch = PathBuf::from(scratch);
            config.paths.model_root = scratch.join("nemo");
            config.paths.scratch_dir = scratch;
        }
        if let Some(home) = non_empty("HOME") {
            config.paths.credentials_file = Some(PathBuf::from(home).join(".cmems_credentials"));
        }

        config.validate()?;
        Ok(config)
    }

    /// 配置文件优先，否则从环境变量构造
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::from_env(),
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dirs = [
            ("paths.forcing_dir", &self.paths.forcing_dir),
            ("paths.scratch_dir", &self.paths.scratch_dir),
            ("paths.setup_dir", &self.paths.setup_dir),
            ("paths.model_root", &self.paths.model_root),
        ];
        for (key, dir) in dirs {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::invalid(key, "", "路径不能为空"));
            }
        }

        for (key, exe) in [
            ("tools.cdo", &self.tools.cdo),
            ("tools.copernicusmarine", &self.tools.copernicusmarine),
            ("tools.sbatch", &self.tools.sbatch),
            ("tools.rsync", &self.tools.rsync),
        ] {
            if exe.trim().is_empty() {
                return Err(ConfigError::invalid(key, exe, "可执行文件名不能为空"));
            }
        }

        if self.tools.timeout_secs == Some(0) {
            return Err(ConfigError::invalid("tools.timeout_secs", 0, "超时必须为正"));
        }

        if self.model.rn_rdt == 0 || 86_400 % self.model.rn_rdt != 0 {
            return Err(ConfigError::invalid(
                "model.rn_rdt",
                self.model.rn_rdt,
                "时间步长必须为正且整除一天",
            ));
        }

        if self.model.subdomains == 0 {
            return Err(ConfigError::invalid("model.subdomains", 0, "子区域数必须为正"));
        }

        if self.model.run_id.trim().is_empty() {
            return Err(ConfigError::Missing("model.run_id".into()));
        }

        if self.runoff.lookback_days == 0 {
            return Err(ConfigError::invalid("runoff.lookback_days", 0, "回溯天数必须至少为 1"));
        }

        Ok(())
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path.as_ref(), content).map_err(ConfigError::Io)?;
        Ok(())
    }

    /// 强迫场目录布局
    pub fn layout(&self) -> ForcingLayout {
        ForcingLayout::new(&self.paths, &self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.rn_rdt, 240);
        assert_eq!(config.model.cold_start_date.compact(), "20211101");
        assert_eq!(config.runoff.lookback_days, 4);
    }

    #[test]
    fn test_from_env_roots() {
        let vars = env(&[("HPCPERM", "/perm/u"), ("SCRATCH", "/scratch/u")]);
        let config = PipelineConfig::from_env_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.paths.forcing_dir, PathBuf::from("/perm/u/nemo_ecmwf/forcing"));
        assert_eq!(config.paths.scratch_dir, PathBuf::from("/scratch/u"));
        assert_eq!(config.paths.model_root, PathBuf::from("/scratch/u/nemo"));
    }

    #[test]
    fn test_forcingdir_overrides_hpcperm() {
        let vars = env(&[("HPCPERM", "/perm/u"), ("FORCINGDIR", "/data/forcing")]);
        let config = PipelineConfig::from_env_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.paths.forcing_dir, PathBuf::from("/data/forcing"));
    }

    #[test]
    fn test_invalid_timestep() {
        let mut config = PipelineConfig::default();
        config.model.rn_rdt = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");

        let mut config = PipelineConfig::default();
        config.paths.forcing_dir = PathBuf::from("/forcing");
        config.tools.timeout_secs = Some(3600);
        config.save_to_file(&path).unwrap();

        let loaded = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.paths.forcing_dir, PathBuf::from("/forcing"));
        assert_eq!(loaded.tools.timeout_secs, Some(3600));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "paths": { "forcing_dir": "/f" } }"#).unwrap();

        let loaded = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.paths.forcing_dir, PathBuf::from("/f"));
        assert_eq!(loaded.model.run_id, "EST05nm_op_rerun20");
    }
}
