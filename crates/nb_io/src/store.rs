// crates/nb_io/src/store.rs

//! 数据集存储后端
//!
//! 各构建阶段通过 [`DatasetStore`] 读写网格文件：生产环境使用
//! NetCDF 文件（[`crate::drivers::netcdf::NetCdfStore`]），测试使用
//! 内存存储 [`MemoryStore`]。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use nb_foundation::{NbError, NbResult};

/// 写出选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// zlib 压缩级别（None 表示不压缩）
    pub compression: Option<i32>,
    /// 是否启用 shuffle 过滤
    pub shuffle: bool,
}

impl WriteOptions {
    /// 不压缩（增量文件）
    pub fn uncompressed() -> Self {
        Self::default()
    }

    /// zlib 压缩
    pub fn compressed(level: i32, shuffle: bool) -> Self {
        Self {
            compression: Some(level),
            shuffle,
        }
    }
}

/// 存储后端 trait
pub trait DatasetStore: Send + Sync {
    /// 读取数据集，缺测值解码为 NaN
    fn read(&self, path: &Path) -> NbResult<Dataset>;

    /// 写出数据集；先写临时名，成功后再改名
    fn write(&self, path: &Path, dataset: &Dataset, options: &WriteOptions) -> NbResult<()>;

    /// 文件是否存在
    fn exists(&self, path: &Path) -> bool;

    /// 删除文件（不存在时不报错）
    fn remove(&self, path: &Path) -> NbResult<()>;

    /// 后端名称
    fn name(&self) -> &str;

    /// 读取，文件缺失时返回 FileNotFound
    fn require(&self, path: &Path) -> NbResult<Dataset> {
        if !self.exists(path) {
            return Err(NbError::file_not_found(path));
        }
        self.read(path)
    }
}

/// 临时文件名 `<name>.nc.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ============================================================
// 内存存储
// ============================================================

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<PathBuf, (Dataset, WriteOptions)>>,
}

impl MemoryStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接放入数据集（模拟外部工具的输出）
    pub fn insert(&self, path: impl Into<PathBuf>, dataset: Dataset) {
        self.files
            .write()
            .insert(path.into(), (dataset, WriteOptions::default()));
    }

    /// 文件的写出选项
    pub fn options_of(&self, path: &Path) -> Option<WriteOptions> {
        self.files.read().get(path).map(|(_, o)| *o)
    }

    /// 所有路径（排序）
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// 文件数量
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl DatasetStore for MemoryStore {
    fn read(&self, path: &Path) -> NbResult<Dataset> {
        self.files
            .read()
            .get(path)
            .map(|(ds, _)| ds.clone())
            .ok_or_else(|| NbError::file_not_found(path))
    }

    fn write(&self, path: &Path, dataset: &Dataset, options: &WriteOptions) -> NbResult<()> {
        dataset.validate()?;
        self.files
            .write()
            .insert(path.to_path_buf(), (dataset.clone(), *options));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn remove(&self, path: &Path) -> NbResult<()> {
        self.files.write().remove(path);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
