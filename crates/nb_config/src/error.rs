// crates/nb_config/src/error.rs

//! 配置层错误类型

use nb_foundation::NbError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 缺失配置
    #[error("缺失配置: {0}")]
    Missing(String),
}

impl ConfigError {
    /// 无效值便捷构造
    pub fn invalid(key: &str, value: impl ToString, reason: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ConfigError> for NbError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => NbError::io_with_source("读取配置失败", e),
            ConfigError::Parse(msg) => NbError::config(msg),
            ConfigError::InvalidValue { key, value, reason } => {
                NbError::invalid_config(key, value, reason)
            }
            ConfigError::Missing(key) => NbError::missing_config(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_foundation::ErrorCategory;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("model.rn_rdt", 0, "必须为正");
        assert!(err.to_string().contains("model.rn_rdt"));
    }

    #[test]
    fn test_into_nb_error() {
        let err: NbError = ConfigError::Missing("CMEMS_USERNAME".into()).into();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
