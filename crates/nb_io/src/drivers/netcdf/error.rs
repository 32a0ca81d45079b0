// crates/nb_io/src/drivers/netcdf/error.rs

//! NetCDF 错误类型

use std::path::PathBuf;
use thiserror::Error;

use nb_foundation::NbError;

/// NetCDF 错误
#[derive(Debug, Error)]
pub enum NetCdfError {
    /// 文件不存在
    #[error("文件不存在: {}", .0.display())]
    FileNotFound(PathBuf),

    /// 打开失败
    #[error("打开文件失败 {}: {message}", path.display())]
    OpenFailed {
        /// 文件路径
        path: PathBuf,
        /// 底层信息
        message: String,
    },

    /// 读取失败
    #[error("读取变量 {variable} 失败: {message}")]
    ReadFailed {
        /// 变量名
        variable: String,
        /// 底层信息
        message: String,
    },

    /// 写出失败
    #[error("写出 {target} 失败: {message}")]
    WriteFailed {
        /// 写出目标（文件、变量或属性）
        target: String,
        /// 底层信息
        message: String,
    },

    /// NetCDF 不可用
    #[error("NetCDF 支持未启用 (需要 `netcdf` feature)")]
    NotAvailable,

    /// 其他错误
    #[error("NetCDF 错误: {0}")]
    Other(String),
}

impl NetCdfError {
    /// 写出失败
    pub fn write(target: impl Into<String>, e: impl std::fmt::Display) -> Self {
        Self::WriteFailed {
            target: target.into(),
            message: e.to_string(),
        }
    }

    /// 读取失败
    pub fn read(variable: impl Into<String>, e: impl std::fmt::Display) -> Self {
        Self::ReadFailed {
            variable: variable.into(),
            message: e.to_string(),
        }
    }
}

#[cfg(feature = "netcdf")]
impl From<netcdf::Error> for NetCdfError {
    fn from(e: netcdf::Error) -> Self {
        NetCdfError::Other(e.to_string())
    }
}

impl From<NetCdfError> for NbError {
    fn from(e: NetCdfError) -> Self {
        match e {
            NetCdfError::FileNotFound(path) => NbError::file_not_found(path),
            NetCdfError::NotAvailable => NbError::not_available("netcdf"),
            NetCdfError::OpenFailed { path, message } => {
                NbError::parse(path, message)
            }
            other => NbError::io(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_foundation::ErrorCategory;

    #[test]
    fn test_conversion() {
        let err: NbError = NetCdfError::FileNotFound(PathBuf::from("/x.nc")).into();
        assert_eq!(err.category(), ErrorCategory::MissingInput);

        let err: NbError = NetCdfError::write("sla", "boom").into();
        assert_eq!(err.category(), ErrorCategory::Io);
        assert!(err.to_string().contains("sla"));
    }
}
