// crates/nb_tools/src/process.rs

//! 外部进程执行
//!
//! 所有外部工具（cdo、copernicusmarine、sbatch、rsync）都经由
//! [`CommandRunner`] 同步执行。执行结果是显式的 [`ToolOutcome`]：
//! 退出码、捕获的 stdout/stderr 以及期望输出文件是否存在。
//!
//! # 成功判据
//!
//! 声明了期望输出文件的命令以「输出文件存在」为准：
//!
//! | 输出文件 | 退出码 | 结果 |
//! |---------|--------|------|
//! | 存在     | 0      | 成功 |
//! | 存在     | 非 0   | 警告，继续 |
//! | 不存在   | 任意   | 失败 |
//!
//! 没有期望输出文件的命令以退出码为准。
//!
//! 输出路径按日期固定，调用方须在运行前用 [`clear_stale_output`] 删除旧文件，
//! 「存在」才表示本次调用生成了输出。

use parking_lot::Mutex;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nb_foundation::{NbError, NbResult};

/// 轮询子进程状态的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 错误信息中保留的 stderr 尾部行数
const STDERR_TAIL_LINES: usize = 20;

// ============================================================
// 命令
// ============================================================

/// 外部命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    secret_envs: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl ToolCommand {
    /// 创建命令
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            secret_envs: Vec::new(),
            cwd: None,
            output: None,
        }
    }

    /// 追加参数
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 追加路径参数
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// 追加多个参数
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 设置环境变量
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// 设置敏感环境变量（日志中隐藏）
    pub fn secret_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_envs.push((key.into(), value.into()));
        self
    }

    /// 设置工作目录
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// 声明期望输出文件
    pub fn expect_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// 程序名
    pub fn program(&self) -> &str {
        &self.program
    }

    /// 参数
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// 环境变量（不含敏感变量）
    pub fn get_envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// 敏感环境变量名
    pub fn secret_env_keys(&self) -> Vec<&str> {
        self.secret_envs.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// 工作目录
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// 期望输出文件
    pub fn expected_output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// 构造标准库命令
    fn to_std(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in self.envs.iter().chain(self.secret_envs.iter()) {
            cmd.env(k, v);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, _) in &self.secret_envs {
            write!(f, "{}=*** ", k)?;
        }
        write!(f, "{}", self.program)?;
        for a in &self.args {
            if a.contains(char::is_whitespace) {
                write!(f, " '{}'", a)?;
            } else {
                write!(f, " {}", a)?;
            }
        }
        Ok(())
    }
}

// ============================================================
// 执行结果
// ============================================================

/// 按成功判据归类的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// 成功
    Success,
    /// 输出存在但退出码非 0
    Degraded,
    /// 失败
    Failed,
}

/// 外部命令执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// 程序名
    pub tool: String,
    /// 退出码（被信号终止时为 None）
    pub exit_code: Option<i32>,
    /// 标准输出
    pub stdout: String,
    /// 标准错误
    pub stderr: String,
    /// 期望输出文件
    pub output: Option<PathBuf>,
    /// 期望输出文件是否存在
    pub output_exists: bool,
}

impl ToolOutcome {
    /// 根据命令和退出码构造，并检查输出文件
    pub fn from_command(cmd: &ToolCommand, exit_code: Option<i32>) -> Self {
        let output = cmd.expected_output().map(Path::to_path_buf);
        let output_exists = output.as_deref().is_some_and(Path::exists);
        Self {
            tool: cmd.program().to_string(),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            output,
            output_exists,
        }
    }

    /// 附加捕获的输出
    pub fn with_streams(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// 退出码是否为 0
    pub fn exited_ok(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// 按成功判据归类
    pub fn status(&self) -> OutcomeStatus {
        match (&self.output, self.output_exists, self.exited_ok()) {
            (Some(_), true, true) => OutcomeStatus::Success,
            (Some(_), true, false) => OutcomeStatus::Degraded,
            (Some(_), false, _) => OutcomeStatus::Failed,
            (None, _, true) => OutcomeStatus::Success,
            (None, _, false) => OutcomeStatus::Failed,
        }
    }

    /// 是否满足成功判据（含警告情形）
    pub fn is_success(&self) -> bool {
        self.status() != OutcomeStatus::Failed
    }

    fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }

    /// 应用成功判据：失败返回外部工具错误，退出码与输出不一致时记录警告
    pub fn check(self) -> NbResult<Self> {
        match self.status() {
            OutcomeStatus::Success => Ok(self),
            OutcomeStatus::Degraded => {
                tracing::warn!(
                    "{} 退出码 {:?}，但输出文件已生成: {}",
                    self.tool,
                    self.exit_code,
                    self.output
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                );
                Ok(self)
            }
            OutcomeStatus::Failed => {
                let reason = match &self.output {
                    Some(p) => format!(
                        "输出文件未生成: {} (退出码 {:?})",
                        p.display(),
                        self.exit_code
                    ),
                    None => format!("退出码 {:?}", self.exit_code),
                };
                let tail = self.stderr_tail();
                let message = if tail.is_empty() {
                    reason
                } else {
                    format!("{}\n{}", reason, tail)
                };
                Err(NbError::external_tool(self.tool, message))
            }
        }
    }
}

/// 运行前删除上一次遗留的输出文件
///
/// 成功判据按输出文件是否存在判断，固定路径上的旧文件会让失败的调用被当作成功。
pub fn clear_stale_output(path: &Path) -> NbResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("删除旧输出: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(NbError::io_with_source(
            format!("删除旧输出 {} 失败", path.display()),
            e,
        )),
    }
}

// ============================================================
// 执行器
// ============================================================

/// 命令执行器
pub trait CommandRunner: Send + Sync {
    /// 同步执行命令，返回原始结果（不应用成功判据）
    fn run(&self, cmd: &ToolCommand) -> NbResult<ToolOutcome>;

    /// 执行并应用成功判据
    fn run_checked(&self, cmd: &ToolCommand) -> NbResult<ToolOutcome> {
        self.run(cmd)?.check()
    }
}

/// 系统进程执行器
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// 无超时
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置超时
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn spawn_reader<R: Read + Send + 'static>(
        stream: Option<R>,
    ) -> std::thread::JoinHandle<String> {
        std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut s) = stream {
                let _ = s.read_to_string(&mut buf);
            }
            buf
        })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> NbResult<ToolOutcome> {
        tracing::info!("执行: {}", cmd);

        let mut child = cmd
            .to_std()
            .spawn()
            .map_err(|e| NbError::external_tool(cmd.program(), format!("无法启动: {}", e)))?;

        // 后台读取管道，避免输出过多时阻塞子进程
        let stdout = Self::spawn_reader(child.stdout.take());
        let stderr = Self::spawn_reader(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(limit) = self.timeout {
                        if started.elapsed() >= limit {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(NbError::tool_timeout(cmd.program(), limit.as_secs()));
                        }
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(NbError::external_tool(
                        cmd.program(),
                        format!("等待进程失败: {}", e),
                    ))
                }
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        let outcome = ToolOutcome::from_command(cmd, status.code()).with_streams(stdout, stderr);
        tracing::debug!(
            "{} 结束: 退出码 {:?}, 输出存在 {}",
            cmd.program(),
            outcome.exit_code,
            outcome.output_exists
        );
        Ok(outcome)
    }
}

// ============================================================
// 记录执行器
// ============================================================

type Handler = Box<dyn Fn(&ToolCommand) -> NbResult<ToolOutcome> + Send + Sync>;

/// 记录所有命令、由回调决定结果的执行器
///
/// 用于演练 (dry run) 和测试：不启动任何进程。
pub struct RecordingRunner {
    handler: Handler,
    commands: Mutex<Vec<ToolCommand>>,
}

impl RecordingRunner {
    /// 所有命令返回退出码 0，输出文件按实际文件系统检查
    pub fn new() -> Self {
        Self::with_handler(|cmd| Ok(ToolOutcome::from_command(cmd, Some(0))))
    }

    /// 自定义结果
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&ToolCommand) -> NbResult<ToolOutcome> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// 已记录的命令
    pub fn commands(&self) -> Vec<ToolCommand> {
        self.commands.lock().clone()
    }

    /// 已记录命令的文本形式
    pub fn command_lines(&self) -> Vec<String> {
        self.commands.lock().iter().map(ToString::to_string).collect()
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("commands", &self.commands.lock().len())
            .finish()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &ToolCommand) -> NbResult<ToolOutcome> {
        tracing::info!("记录: {}", cmd);
        self.commands.lock().push(cmd.clone());
        (self.handler)(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_foundation::ErrorCategory;

    fn outcome(output: Option<&str>, exists: bool, code: i32) -> ToolOutcome {
        ToolOutcome {
            tool: "cdo".into(),
            exit_code: Some(code),
            stdout: String::new(),
            stderr: "cdo remapbil: abort".into(),
            output: output.map(PathBuf::from),
            output_exists: exists,
        }
    }

    #[test]
    fn test_success_predicate() {
        assert_eq!(outcome(Some("o.nc"), true, 0).status(), OutcomeStatus::Success);
        assert_eq!(outcome(Some("o.nc"), true, 1).status(), OutcomeStatus::Degraded);
        assert_eq!(outcome(Some("o.nc"), false, 0).status(), OutcomeStatus::Failed);
        assert_eq!(outcome(Some("o.nc"), false, 1).status(), OutcomeStatus::Failed);
        assert_eq!(outcome(None, false, 0).status(), OutcomeStatus::Success);
        assert_eq!(outcome(None, false, 2).status(), OutcomeStatus::Failed);
    }

    #[test]
    fn test_check() {
        assert!(outcome(Some("o.nc"), true, 1).check().is_ok());
        let err = outcome(Some("o.nc"), false, 1).check().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ExternalTool);
        assert!(err.to_string().contains("abort"));
    }

    #[test]
    fn test_clear_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("remap.nc");
        std::fs::write(&out, b"old").unwrap();
        clear_stale_output(&out).unwrap();
        assert!(!out.exists());
        // 不存在时不报错
        clear_stale_output(&out).unwrap();
    }

    #[test]
    fn test_display_hides_secrets() {
        let cmd = ToolCommand::new("copernicusmarine")
            .arg("subset")
            .arg("--variable")
            .arg("sla")
            .secret_env("COPERNICUSMARINE_SERVICE_PASSWORD", "hunter2")
            .arg("--rsh=ssh -p2222");
        let line = cmd.to_string();
        assert!(line.contains("COPERNICUSMARINE_SERVICE_PASSWORD=***"));
        assert!(!line.contains("hunter2"));
        assert!(line.ends_with("'--rsh=ssh -p2222'"));
    }

    #[test]
    fn test_recording_runner() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.nc");
        std::fs::write(&out, b"").unwrap();

        let runner = RecordingRunner::new();
        let cmd = ToolCommand::new("cdo").arg("-O").expect_output(&out);
        let outcome = runner.run_checked(&cmd).unwrap();
        assert!(outcome.output_exists);

        let missing = ToolCommand::new("cdo").expect_output(dir.path().join("y.nc"));
        assert!(runner.run_checked(&missing).is_err());
        assert_eq!(runner.commands().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_exit_code() {
        let runner = SystemRunner::new();
        let outcome = runner
            .run(&ToolCommand::new("sh").arg("-c").arg("echo hi; echo err >&2; exit 3"))
            .unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout.trim(), "hi");
        assert_eq!(outcome.stderr.trim(), "err");
        assert!(!outcome.is_success());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_timeout() {
        let runner = SystemRunner::with_timeout(Some(Duration::from_millis(200)));
        let err = runner
            .run(&ToolCommand::new("sleep").arg("5"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ExternalTool);
    }

    #[test]
    fn test_missing_program() {
        let err = SystemRunner::new()
            .run(&ToolCommand::new("definitely-not-a-real-tool-nb"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ExternalTool);
    }
}
