// crates/nb_config/src/credentials.rs

//! CMEMS 凭据提供者
//!
//! 凭据在启动时解析并注入抓取器，组件不直接访问环境变量。

use std::fmt;
use std::path::{Path, PathBuf};

use nb_foundation::{NbError, NbResult};

/// 用户名环境变量
pub const USERNAME_VAR: &str = "CMEMS_USERNAME";
/// 密码环境变量
pub const PASSWORD_VAR: &str = "CMEMS_PASSWORD";

/// 远程目录服务凭据
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 凭据提供者
pub trait CredentialsProvider: Send + Sync {
    /// 解析凭据，缺失时返回配置错误
    fn credentials(&self) -> NbResult<Credentials>;

    /// 提供者名称 (用于日志)
    fn name(&self) -> &str {
        "anonymous"
    }
}

// ============================================================
// 环境变量
// ============================================================

/// 启动时从环境变量捕获的凭据
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    username: Option<String>,
    password: Option<String>,
}

impl EnvCredentials {
    /// 读取进程环境
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从查找函数读取
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            username: clean(lookup(USERNAME_VAR)),
            password: clean(lookup(PASSWORD_VAR)),
        }
    }
}

impl CredentialsProvider for EnvCredentials {
    fn credentials(&self) -> NbResult<Credentials> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Ok(Credentials {
                username: u.clone(),
                password: p.clone(),
            }),
            (None, _) => Err(NbError::missing_config(USERNAME_VAR)),
            (_, None) => Err(NbError::missing_config(PASSWORD_VAR)),
        }
    }

    fn name(&self) -> &str {
        "environment"
    }
}

// ============================================================
// 凭据文件
// ============================================================

/// 凭据文件：第一行用户名，第二行密码
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    /// 指定文件路径
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialsProvider for FileCredentials {
    fn credentials(&self) -> NbResult<Credentials> {
        if !self.path.is_file() {
            return Err(NbError::config(format!(
                "未设置 {} / {}，且凭据文件不存在: {}",
                USERNAME_VAR,
                PASSWORD_VAR,
                self.path.display()
            )));
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| NbError::io_with_source(format!("读取凭据文件失败: {}", self.path.display()), e))?;

        let mut lines = content.lines().map(str::trim);
        let username = lines.next().filter(|s| !s.is_empty());
        let password = lines.next().filter(|s| !s.is_empty());
        match (username, password) {
            (Some(u), Some(p)) => {
                tracing::info!("使用凭据文件: {}", self.path.display());
                Ok(Credentials {
                    username: u.to_string(),
                    password: p.to_string(),
                })
            }
            _ => Err(NbError::config(format!(
                "凭据文件格式错误（需两行：用户名、密码）: {}",
                self.path.display()
            ))),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

// ============================================================
// 链式
// ============================================================

/// 依次尝试多个提供者
#[derive(Default)]
pub struct ChainCredentials {
    providers: Vec<Box<dyn CredentialsProvider>>,
}

impl ChainCredentials {
    /// 创建空链
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    /// 追加提供者
    pub fn with(mut self, provider: impl CredentialsProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// 环境变量优先，其次凭据文件
    pub fn standard(env: EnvCredentials, file: Option<PathBuf>) -> Self {
        let chain = Self::new().with(env);
        match file {
            Some(path) => chain.with(FileCredentials::new(path)),
            None => chain,
        }
    }
}

impl CredentialsProvider for ChainCredentials {
    fn credentials(&self) -> NbResult<Credentials> {
        let mut last = None;
        for provider in &self.providers {
            match provider.credentials() {
                Ok(c) => return Ok(c),
                Err(e) => {
                    tracing::debug!("凭据提供者 {} 未给出凭据: {}", provider.name(), e);
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| NbError::missing_config(USERNAME_VAR)))
    }

    fn name(&self) -> &str {
        "chain"
    }
}

impl fmt::Debug for ChainCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ChainCredentials").field("providers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_foundation::ErrorCategory;
    use std::collections::HashMap;

    #[test]
    fn test_env_credentials() {
        let vars: HashMap<&str, &str> = [(USERNAME_VAR, "user"), (PASSWORD_VAR, "secret")].into();
        let env = EnvCredentials::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        let c = env.credentials().unwrap();
        assert_eq!(c.username, "user");
        assert!(!format!("{:?}", c).contains("secret"));
    }

    #[test]
    fn test_missing_env_is_config_error() {
        let env = EnvCredentials::from_lookup(|_| None);
        let err = env.credentials().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_file_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cmems_credentials");
        std::fs::write(&path, "fileuser\nfilepass\n").unwrap();

        let chain = ChainCredentials::standard(EnvCredentials::from_lookup(|_| None), Some(path));
        let c = chain.credentials().unwrap();
        assert_eq!(c.username, "fileuser");
        assert_eq!(c.password, "filepass");
    }

    #[test]
    fn test_all_absent() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ChainCredentials::standard(
            EnvCredentials::default(),
            Some(dir.path().join("missing")),
        );
        let err = chain.credentials().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds");
        std::fs::write(&path, "only-user\n").unwrap();
        assert!(FileCredentials::new(path).credentials().is_err());
    }
}
