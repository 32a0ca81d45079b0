// crates/nb_forcing/tests/common/mod.rs

//! 场景测试公共部件：内存存储 + 假外部委托

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nb_config::PipelineConfig;
use nb_forcing::ForcingContext;
use nb_foundation::{NbError, NbResult};
use nb_io::{Dataset, DatasetStore, MemoryStore};
use nb_tools::{MarineCatalog, RemapRequest, Remapper, SubsetRequest, ToolCommand, ToolOutcome};

/// 假目录：按数据集 ID 返回预置数据集
#[derive(Default)]
pub struct FakeCatalog {
    store: Arc<MemoryStore>,
    products: Mutex<HashMap<String, Dataset>>,
    requests: Mutex<Vec<SubsetRequest>>,
}

impl FakeCatalog {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    pub fn provide(&self, dataset_id: &str, ds: Dataset) {
        self.products.lock().insert(dataset_id.to_string(), ds);
    }

    pub fn requests(&self) -> Vec<SubsetRequest> {
        self.requests.lock().clone()
    }
}

impl MarineCatalog for FakeCatalog {
    fn fetch(&self, request: &SubsetRequest, output: &Path) -> NbResult<PathBuf> {
        self.requests.lock().push(request.clone());
        let ds = self
            .products
            .lock()
            .get(&request.dataset_id)
            .cloned()
            .ok_or_else(|| NbError::external_tool("copernicusmarine", "产品不可用"))?;
        self.store.insert(output, ds);
        Ok(output.to_path_buf())
    }
}

/// 假重映射：默认原样复制源数据集（目标网格与源网格相同）
#[derive(Default)]
pub struct FakeRemapper {
    store: Arc<MemoryStore>,
    requests: Mutex<Vec<RemapRequest>>,
}

impl FakeRemapper {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<RemapRequest> {
        self.requests.lock().clone()
    }
}

impl Remapper for FakeRemapper {
    fn remap(&self, request: &RemapRequest) -> NbResult<ToolOutcome> {
        self.requests.lock().push(request.clone());
        let ds = self.store.require(&request.source)?;
        self.store.insert(&request.output, ds);
        Ok(ToolOutcome::from_command(&ToolCommand::new("fake-remap"), Some(0)))
    }
}

/// 场景测试环境
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<FakeCatalog>,
    pub remapper: Arc<FakeRemapper>,
    pub ctx: ForcingContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut PipelineConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.paths.forcing_dir = dir.path().join("forcing");
        config.paths.scratch_dir = dir.path().join("scratch");
        config.paths.setup_dir = dir.path().join("setup");
        config.paths.model_root = dir.path().join("nemo");
        adjust(&mut config);

        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(FakeCatalog::new(store.clone()));
        let remapper = Arc::new(FakeRemapper::new(store.clone()));
        let ctx = ForcingContext::new(
            Arc::new(config),
            store.clone(),
            remapper.clone(),
            catalog.clone(),
        );
        Self {
            dir,
            store,
            catalog,
            remapper,
            ctx,
        }
    }

    /// 放入模式网格文件
    pub fn with_bathy(self) -> Self {
        self.store.insert(self.ctx.layout().bathy(), Dataset::new());
        self
    }
}
