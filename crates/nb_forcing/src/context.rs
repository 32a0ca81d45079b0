// crates/nb_forcing/src/context.rs

//! 构建上下文
//!
//! 所有构建器共享同一份配置、目录布局、存储后端和外部工具委托。
//! 生产环境由 [`ForcingContext::from_config`] 组装，测试时注入内存存储和假委托。

use std::sync::Arc;
use std::time::Duration;

use nb_config::{ChainCredentials, EnvCredentials, ForcingLayout, PipelineConfig};
use nb_io::{DatasetStore, NetCdfStore};
use nb_tools::{CdoRemapper, CommandRunner, CopernicusMarineCli, MarineCatalog, Remapper, SystemRunner};

/// 构建上下文
#[derive(Clone)]
pub struct ForcingContext {
    config: Arc<PipelineConfig>,
    layout: ForcingLayout,
    store: Arc<dyn DatasetStore>,
    remapper: Arc<dyn Remapper>,
    catalog: Arc<dyn MarineCatalog>,
}

impl ForcingContext {
    /// 由各部件组装
    pub fn new(
        config: Arc<PipelineConfig>,
        store: Arc<dyn DatasetStore>,
        remapper: Arc<dyn Remapper>,
        catalog: Arc<dyn MarineCatalog>,
    ) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            store,
            remapper,
            catalog,
        }
    }

    /// 生产组装：NetCDF 存储、CDO、copernicusmarine
    pub fn from_config(config: Arc<PipelineConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        let credentials = ChainCredentials::standard(
            EnvCredentials::from_env(),
            config.paths.credentials_file.clone(),
        );
        let remapper = CdoRemapper::new(runner.clone(), config.tools.cdo.clone());
        let catalog = CopernicusMarineCli::new(
            runner,
            Arc::new(credentials),
            config.tools.copernicusmarine.clone(),
        );
        Self::new(
            config,
            Arc::new(NetCdfStore::new()),
            Arc::new(remapper),
            Arc::new(catalog),
        )
    }

    /// 按配置的超时创建系统命令执行器
    pub fn system_runner(config: &PipelineConfig) -> Arc<dyn CommandRunner> {
        let timeout = config.tools.timeout_secs.map(Duration::from_secs);
        Arc::new(SystemRunner::with_timeout(timeout))
    }

    /// 配置
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 目录布局
    pub fn layout(&self) -> &ForcingLayout {
        &self.layout
    }

    /// 存储后端
    pub fn store(&self) -> &dyn DatasetStore {
        self.store.as_ref()
    }

    /// 重映射委托
    pub fn remapper(&self) -> &dyn Remapper {
        self.remapper.as_ref()
    }

    /// 远程数据目录
    pub fn catalog(&self) -> &dyn MarineCatalog {
        self.catalog.as_ref()
    }
}

impl std::fmt::Debug for ForcingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForcingContext")
            .field("forcing_dir", &self.layout.forcing_dir())
            .field("store", &self.store.name())
            .finish()
    }
}
