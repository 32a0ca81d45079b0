// crates/nb_tools/src/batch.rs

//! 批处理作业提交
//!
//! 以阻塞方式 (`sbatch -W`) 提交模式作业，作业结束后返回。
//! 调度器内部不在本模块范围内。

use std::path::PathBuf;
use std::sync::Arc;

use crate::process::{CommandRunner, ToolCommand, ToolOutcome};
use nb_foundation::NbResult;

/// 批处理作业
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    /// 作业脚本（相对工作目录）
    pub script: String,
    /// 工作目录
    pub workdir: PathBuf,
    /// 通过 `--export` 传入的额外变量
    pub exports: Vec<(String, String)>,
}

impl BatchJob {
    /// 创建作业
    pub fn new(script: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            workdir: workdir.into(),
            exports: Vec::new(),
        }
    }

    /// 追加导出变量
    pub fn export(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.exports.push((key.into(), value.into()));
        self
    }

    fn export_arg(&self) -> String {
        let mut s = String::from("--export=ALL");
        for (k, v) in &self.exports {
            s.push(',');
            s.push_str(k);
            s.push('=');
            s.push_str(v);
        }
        s
    }
}

/// Slurm sbatch 提交器
#[derive(Clone)]
pub struct BatchScheduler {
    runner: Arc<dyn CommandRunner>,
    executable: String,
}

impl BatchScheduler {
    /// 创建
    pub fn new(runner: Arc<dyn CommandRunner>, executable: impl Into<String>) -> Self {
        Self {
            runner,
            executable: executable.into(),
        }
    }

    /// 构造提交命令
    pub fn command(&self, job: &BatchJob) -> ToolCommand {
        ToolCommand::new(&self.executable)
            .arg("-W")
            .arg(job.export_arg())
            .arg(&job.script)
            .current_dir(&job.workdir)
    }

    /// 提交并等待结束；非 0 退出为外部工具错误
    pub fn submit_and_wait(&self, job: &BatchJob) -> NbResult<ToolOutcome> {
        tracing::info!("提交作业 {} (目录 {})", job.script, job.workdir.display());
        self.runner.run_checked(&self.command(job))
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("executable", &self.executable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;
    use nb_foundation::ErrorCategory;
    use std::path::Path;

    #[test]
    fn test_sbatch_command() {
        let runner = Arc::new(RecordingRunner::new());
        let scheduler = BatchScheduler::new(runner.clone(), "sbatch");
        let job = BatchJob::new("run_nemo", "/s/nemo/run").export("model_run_dir", "/s/nemo/run");
        scheduler.submit_and_wait(&job).unwrap();

        let cmds = runner.commands();
        assert_eq!(
            cmds[0].to_string(),
            "sbatch -W --export=ALL,model_run_dir=/s/nemo/run run_nemo"
        );
        assert_eq!(cmds[0].get_current_dir(), Some(Path::new("/s/nemo/run")));
    }

    #[test]
    fn test_failed_submission() {
        let runner = Arc::new(RecordingRunner::with_handler(|cmd| {
            Ok(ToolOutcome::from_command(cmd, Some(1)))
        }));
        let scheduler = BatchScheduler::new(runner, "sbatch");
        let err = scheduler
            .submit_and_wait(&BatchJob::new("run_nemo", "/tmp"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ExternalTool);
    }
}
