// crates/nb_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `NbError` 枚举和 `NbResult` 类型别名，用于整个流水线的错误处理。
//!
//! # 错误分类
//!
//! 每个错误都归入 [`ErrorCategory`] 中的一类：
//!
//! 1. **配置错误**: 缺少凭据、路径或配置值无效，立即报告，不重试
//! 2. **输入缺失**: 上游文件不存在（仅径流构建器有回退窗口）
//! 3. **结构不匹配**: 数组形状、维度或变量与预期不符，总是致命
//! 4. **外部工具失败**: 委托命令失败（以输出文件是否存在为准）
//! 5. **IO**: 本地文件系统错误
//!
//! # 示例
//!
//! ```
//! use nb_foundation::error::{NbError, NbResult, ErrorCategory};
//!
//! fn load_credentials() -> NbResult<()> {
//!     Err(NbError::missing_config("CMEMS_USERNAME"))
//! }
//!
//! let err = load_credentials().unwrap_err();
//! assert_eq!(err.category(), ErrorCategory::Configuration);
//! ```

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 统一结果类型
pub type NbResult<T> = Result<T, NbError>;

/// 流水线错误类型
#[derive(Error, Debug)]
pub enum NbError {
    // ========================================================================
    // IO 相关错误
    // ========================================================================

    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound {
        /// 未找到的路径
        path: PathBuf,
    },

    /// 文件解析错误
    #[error("文件解析错误: {file}: {message}")]
    ParseError {
        /// 文件路径
        file: PathBuf,
        /// 错误信息
        message: String,
    },

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    // ========================================================================
    // 结构（schema）错误
    // ========================================================================

    /// 数组形状不匹配
    #[error("形状不匹配: {name} 期望{expected:?}, 实际{actual:?}")]
    ShapeMismatch {
        /// 数据名称
        name: String,
        /// 期望形状
        expected: Vec<usize>,
        /// 实际形状
        actual: Vec<usize>,
    },

    /// 维度数不匹配
    #[error("维度数不匹配: {name} 期望{expected}维, 实际{actual}维")]
    RankMismatch {
        /// 数据名称
        name: String,
        /// 期望维数
        expected: usize,
        /// 实际维数
        actual: usize,
    },

    /// 变量不存在
    #[error("变量不存在: {name} (可用变量: {available:?})")]
    VariableNotFound {
        /// 查找的变量名（或别名列表）
        name: String,
        /// 数据集中可用的变量
        available: Vec<String>,
    },

    /// 数据结构错误
    #[error("数据结构错误: {message}")]
    Schema {
        /// 具体错误信息
        message: String,
    },

    // ========================================================================
    // 配置错误
    // ========================================================================

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 缺少配置项
    #[error("缺少必需的配置项: {key}")]
    MissingConfig {
        /// 配置键名
        key: String,
    },

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    // ========================================================================
    // 外部工具错误
    // ========================================================================

    /// 外部工具失败
    #[error("外部工具失败: {tool}: {message}")]
    ExternalTool {
        /// 工具名称 (cdo, copernicusmarine, sbatch, rsync)
        tool: String,
        /// 失败描述
        message: String,
    },

    /// 外部工具超时
    #[error("外部工具超时: {tool} 超过 {seconds} 秒")]
    ToolTimeout {
        /// 工具名称
        tool: String,
        /// 超时秒数
        seconds: u64,
    },

    // ========================================================================
    // 其他
    // ========================================================================

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },

    /// 功能不可用（例如未启用 netcdf feature）
    #[error("功能不可用: {feature}")]
    NotAvailable {
        /// 功能描述
        feature: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 配置错误
    Configuration,
    /// 输入文件缺失
    MissingInput,
    /// 形状/结构不匹配
    Schema,
    /// 外部工具失败
    ExternalTool,
    /// 本地 IO
    Io,
    /// 其他内部错误
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::MissingInput => "missing-input",
            Self::Schema => "schema",
            Self::ExternalTool => "external-tool",
            Self::Io => "io",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl NbError {
    /// 从IO错误创建
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 从IO错误创建（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 文件不存在
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// 解析错误
    pub fn parse(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            message: message.into(),
        }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 形状不匹配
    pub fn shape_mismatch(name: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            name: name.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// 维度数不匹配
    pub fn rank_mismatch(name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::RankMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// 变量不存在
    pub fn variable_not_found(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::VariableNotFound {
            name: name.into(),
            available,
        }
    }

    /// 数据结构错误
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 缺少配置
    pub fn missing_config(key: impl Into<String>) -> Self {
        Self::MissingConfig { key: key.into() }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 外部工具失败
    pub fn external_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// 外部工具超时
    pub fn tool_timeout(tool: impl Into<String>, seconds: u64) -> Self {
        Self::ToolTimeout {
            tool: tool.into(),
            seconds,
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 功能不可用
    pub fn not_available(feature: impl Into<String>) -> Self {
        Self::NotAvailable {
            feature: feature.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 错误所属分类
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. }
            | Self::MissingConfig { .. }
            | Self::InvalidConfig { .. }
            | Self::NotAvailable { .. } => ErrorCategory::Configuration,
            Self::FileNotFound { .. } => ErrorCategory::MissingInput,
            Self::ShapeMismatch { .. }
            | Self::RankMismatch { .. }
            | Self::VariableNotFound { .. }
            | Self::Schema { .. }
            | Self::ParseError { .. }
            | Self::InvalidInput { .. } => ErrorCategory::Schema,
            Self::ExternalTool { .. } | Self::ToolTimeout { .. } => ErrorCategory::ExternalTool,
            Self::Io { .. } => ErrorCategory::Io,
            Self::Serialization { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// 是否为输入缺失错误
    pub fn is_missing_input(&self) -> bool {
        self.category() == ErrorCategory::MissingInput
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl NbError {
    /// 检查形状是否一致
    #[inline]
    pub fn check_shape(name: &str, expected: &[usize], actual: &[usize]) -> NbResult<()> {
        if expected != actual {
            Err(Self::shape_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查维数
    #[inline]
    pub fn check_rank(name: &str, expected: usize, actual: usize) -> NbResult<()> {
        if expected != actual {
            Err(Self::rank_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查必需文件是否存在
    #[inline]
    pub fn check_exists(path: &std::path::Path) -> NbResult<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(Self::file_not_found(path))
        }
    }
}

/// 条件不满足时返回给定错误
///
/// ```
/// use nb_foundation::{ensure, error::{NbError, NbResult}};
///
/// fn positive(n: i32) -> NbResult<i32> {
///     ensure!(n > 0, NbError::invalid_input("必须为正"));
///     Ok(n)
/// }
/// assert!(positive(-1).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for NbError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<chrono::ParseError> for NbError {
    fn from(err: chrono::ParseError) -> Self {
        Self::invalid_input(format!("日期解析失败: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NbError::file_not_found("/forcing/assim/ssh_rec.d20250702.t0000.nc");
        assert!(err.to_string().contains("ssh_rec.d20250702"));

        let err = NbError::shape_mismatch("increment", &[10, 20], &[10, 21]);
        assert!(err.to_string().contains("[10, 21]"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            NbError::missing_config("CMEMS_PASSWORD").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            NbError::file_not_found("x.nc").category(),
            ErrorCategory::MissingInput
        );
        assert_eq!(
            NbError::rank_mismatch("ssh", 2, 3).category(),
            ErrorCategory::Schema
        );
        assert_eq!(
            NbError::external_tool("cdo", "no output").category(),
            ErrorCategory::ExternalTool
        );
        assert!(NbError::file_not_found("x.nc").is_missing_input());
    }

    #[test]
    fn test_check_helpers() {
        assert!(NbError::check_shape("a", &[2, 3], &[2, 3]).is_ok());
        assert!(NbError::check_shape("a", &[2, 3], &[3, 2]).is_err());
        assert!(NbError::check_rank("a", 4, 4).is_ok());
        assert!(NbError::check_exists(std::path::Path::new("/definitely/not/here.nc")).is_err());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: NbError = io.into();
        assert_eq!(err.category(), ErrorCategory::Io);
    }
}
