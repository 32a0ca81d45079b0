// crates/nb_tools/src/sync.rs

//! 远程归档同步 (rsync over ssh)

use std::path::Path;
use std::sync::Arc;

use crate::process::{CommandRunner, ToolCommand, ToolOutcome};
use nb_foundation::NbResult;

/// 远程归档目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// 用户名
    pub user: String,
    /// 主机
    pub host: String,
    /// ssh 端口
    pub port: u16,
    /// 远程根目录（以 `/` 结尾）
    pub root: String,
}

impl RemoteTarget {
    /// 远程完整目录
    pub fn remote_dir(&self, relative: &str) -> String {
        format!("{}{}", self.root, relative)
    }
}

/// rsync 上传器
#[derive(Clone)]
pub struct RemoteSync {
    runner: Arc<dyn CommandRunner>,
    executable: String,
    target: RemoteTarget,
}

/// 固定的 rsync 选项
const RSYNC_OPTIONS: &[&str] = &["-avz", "--inplace", "--checksum", "--ignore-times"];

impl RemoteSync {
    /// 创建
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        executable: impl Into<String>,
        target: RemoteTarget,
    ) -> Self {
        Self {
            runner,
            executable: executable.into(),
            target,
        }
    }

    /// 目标
    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// 构造上传命令；远程目录在接收端按需创建
    pub fn command(&self, file: &Path, relative_dir: &str) -> ToolCommand {
        let remote = self.target.remote_dir(relative_dir);
        ToolCommand::new(&self.executable)
            .args(RSYNC_OPTIONS.iter().copied())
            .arg(format!("--rsh=ssh -p{}", self.target.port))
            .arg(format!("--rsync-path=mkdir -p {} && rsync", remote))
            .path_arg(file)
            .arg(format!("{}@{}:{}", self.target.user, self.target.host, remote))
    }

    /// 上传单个文件（按退出码判定）
    pub fn upload(&self, file: &Path, relative_dir: &str) -> NbResult<ToolOutcome> {
        self.runner.run_checked(&self.command(file, relative_dir))
    }
}

impl std::fmt::Debug for RemoteSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSync")
            .field("executable", &self.executable)
            .field("target", &self.target)
            .finish()
    }
}
