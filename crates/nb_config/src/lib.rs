// crates/nb_config/src/lib.rs

//! NEMO Baltic Config Layer
//!
//! 配置层：显式的流水线配置对象、目录布局和凭据提供者。
//!
//! # 模块概览
//!
//! - [`pipeline_config`]: PipelineConfig（启动时构造一次）
//! - [`layout`]: ForcingLayout，所有带日期的文件名模板
//! - [`credentials`]: CMEMS 凭据提供者（环境变量 / 凭据文件）
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! nb_cli       ─> PipelineConfig::load
//! nb_workflow  ─> 按阶段传递 &PipelineConfig
//! nb_forcing   ─> ForcingLayout
//! nb_config    ─> (本层)
//! nb_foundation
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod credentials;
pub mod error;
pub mod layout;
pub mod pipeline_config;

// 重导出核心类型
pub use credentials::{ChainCredentials, Credentials, CredentialsProvider, EnvCredentials, FileCredentials};
pub use error::ConfigError;
pub use layout::{BoundaryKind, ForcingLayout};
pub use pipeline_config::{
    ArchiveConfig, IncrementConfig, ModelConfig, PathsConfig, PipelineConfig, RunoffConfig,
    ToolsConfig,
};
