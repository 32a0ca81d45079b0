// crates/nb_tools/src/remap.rs

//! 网格重映射（外部委托）
//!
//! 双线性插值到目标网格，由 CDO 完成。调用方只依赖 [`Remapper`] trait；
//! 结果按输出文件是否存在判定成功。

use std::path::PathBuf;
use std::sync::Arc;

use crate::process::{clear_stale_output, CommandRunner, ToolCommand, ToolOutcome};
use nb_foundation::NbResult;

/// 插值前的缺测处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// 不处理
    #[default]
    None,
    /// 缺测设为最近邻值 (`-setmisstonn`)
    NearestNeighbour,
    /// 先填补再最近邻 (`-fillmiss -setmisstonn`)
    FillThenNearestNeighbour,
}

impl MissingPolicy {
    /// 对应的 CDO 算子
    pub fn operators(&self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::NearestNeighbour => &["-setmisstonn"],
            Self::FillThenNearestNeighbour => &["-fillmiss", "-setmisstonn"],
        }
    }
}

/// 重映射请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapRequest {
    /// 源文件
    pub source: PathBuf,
    /// 目标网格描述（网格文件或 CDO 网格描述文件）
    pub grid: PathBuf,
    /// 输出文件
    pub output: PathBuf,
    /// 缺测处理
    pub policy: MissingPolicy,
}

impl RemapRequest {
    /// 创建请求
    pub fn new(
        source: impl Into<PathBuf>,
        grid: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        policy: MissingPolicy,
    ) -> Self {
        Self {
            source: source.into(),
            grid: grid.into(),
            output: output.into(),
            policy,
        }
    }
}

/// 重映射器
pub trait Remapper: Send + Sync {
    /// 执行重映射；返回值已满足成功判据（输出文件存在）
    fn remap(&self, request: &RemapRequest) -> NbResult<ToolOutcome>;
}

/// CDO 双线性重映射
#[derive(Clone)]
pub struct CdoRemapper {
    runner: Arc<dyn CommandRunner>,
    executable: String,
}

impl CdoRemapper {
    /// 创建
    pub fn new(runner: Arc<dyn CommandRunner>, executable: impl Into<String>) -> Self {
        Self {
            runner,
            executable: executable.into(),
        }
    }

    /// CDO 通用前缀参数（覆盖输出、加锁、NetCDF4 + zip2）
    pub fn base_command(&self) -> ToolCommand {
        ToolCommand::new(&self.executable).args(["-O", "-L", "-f", "nc4", "-z", "zip2"])
    }

    /// 构造重映射命令
    pub fn command(&self, request: &RemapRequest) -> ToolCommand {
        self.base_command()
            .args(request.policy.operators().iter().copied())
            .arg(format!("-remapbil,{}", request.grid.display()))
            .path_arg(&request.source)
            .path_arg(&request.output)
            .expect_output(&request.output)
    }
}

impl std::fmt::Debug for CdoRemapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdoRemapper")
            .field("executable", &self.executable)
            .finish()
    }
}

impl Remapper for CdoRemapper {
    fn remap(&self, request: &RemapRequest) -> NbResult<ToolOutcome> {
        if let Some(parent) = request.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        clear_stale_output(&request.output)?;
        self.runner.run_checked(&self.command(request))
    }
}
