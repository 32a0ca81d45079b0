// crates/nb_workflow/tests/common/mod.rs

//! 编排测试公共部件：临时目录中的运行环境、内存存储与假外部委托

#![allow(dead_code)]

use ndarray::{ArrayD, IxDyn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nb_config::PipelineConfig;
use nb_forcing::ForcingContext;
use nb_foundation::{ForecastDate, NbError, NbResult};
use nb_io::{Dataset, DatasetStore, MemoryStore, Variable};
use nb_tools::{
    MarineCatalog, RecordingRunner, RemapRequest, Remapper, SubsetRequest, ToolCommand,
    ToolOutcome,
};

/// 假目录：按数据集 ID 返回预置数据集
#[derive(Default)]
pub struct FakeCatalog {
    store: Arc<MemoryStore>,
    products: Mutex<HashMap<String, Dataset>>,
}

impl FakeCatalog {
    pub fn provide(&self, dataset_id: &str, ds: Dataset) {
        self.products.lock().insert(dataset_id.to_string(), ds);
    }
}

impl MarineCatalog for FakeCatalog {
    fn fetch(&self, request: &SubsetRequest, output: &Path) -> NbResult<PathBuf> {
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

/// 假重映射：原样复制源数据集
pub struct FakeRemapper {
    store: Arc<MemoryStore>,
}

impl Remapper for FakeRemapper {
    fn remap(&self, request: &RemapRequest) -> NbResult<ToolOutcome> {
        let ds = self.store.require(&request.source)?;
        self.store.insert(&request.output, ds);
        Ok(ToolOutcome::from_command(&ToolCommand::new("fake-remap"), Some(0)))
    }
}

/// 测试环境：强迫数据在内存中，模式运行目录在临时目录中
pub struct Env {
    pub dir: tempfile::TempDir,
    pub config: Arc<PipelineConfig>,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<FakeCatalog>,
    pub runner: Arc<RecordingRunner>,
    pub ctx: ForcingContext,
}

impl Env {
    pub fn new() -> Self {
        Self::with_runner(RecordingRunner::new())
    }

    pub fn with_runner(runner: RecordingRunner) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.paths.forcing_dir = dir.path().join("forcing");
        config.paths.scratch_dir = dir.path().join("scratch");
        config.paths.setup_dir = dir.path().join("setup");
        config.paths.model_root = dir.path().join("nemo");
        config.model.subdomains = 2;
        let config = Arc::new(config);

        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(FakeCatalog {
            store: store.clone(),
            ..Default::default()
        });
        let remapper = Arc::new(FakeRemapper {
            store: store.clone(),
        });
        let ctx = ForcingContext::new(config.clone(), store.clone(), remapper, catalog.clone());
        Self {
            dir,
            config,
            store,
            catalog,
            runner: Arc::new(runner),
            ctx,
        }
    }

    /// setup 目录：namelist 模板、xml、作业脚本与静态文件
    pub fn write_setup(&self) {
        let setup = &self.config.paths.setup_dir;
        fs::create_dir_all(setup).unwrap();
        fs::write(
            setup.join("namelist_ref_template_V110_op"),
            "cn_exp=\"_runid_\"\nnn_itend=_nn_itend_\nnn_stock=_stock1_\nln_rstart=_ln_rstart_\n\
             nn_date0=_nn_date0_\nrn_rdt=_rn_rdt_\nln_tsd_init=_ln_tsd_init_\n",
        )
        .unwrap();
        fs::write(setup.join("namelist_ice_ref_template_mm"), "ln_iceini=_ln_iceini_\n").unwrap();
        fs::write(setup.join("namelist_cfg"), "&namrun\n/\n").unwrap();
        fs::write(setup.join("iodef.xml"), "<xml/>").unwrap();
        fs::write(setup.join("run_nemo"), "#!/bin/bash\n").unwrap();
        fs::write(setup.join("nemo.exe"), "").unwrap();
        fs::write(setup.join("domain_cfg_EST_0.5nm_V110_fix.nc"), "").unwrap();
    }

    /// 前一日运行目录中的重启文件
    pub fn write_restarts(&self, date: &ForecastDate, step: u64) {
        let layout = self.config.layout();
        let rdir = layout.model_run_dir(&date.previous());
        let restarts = rdir.join("restarts");
        fs::create_dir_all(&restarts).unwrap();
        fs::write(rdir.join("stock1_num.dat"), format!("{}\n", step)).unwrap();
        for d in 0..self.config.model.subdomains {
            let prefix = format!("{}_{:08}", self.config.model.run_id, step);
            fs::write(restarts.join(format!("{}_restart_out_{:04}.nc", prefix, d)), "").unwrap();
            fs::write(restarts.join(format!("{}_restart_ice_out_{:04}.nc", prefix, d)), "").unwrap();
        }
    }

    /// 磁盘上的气象、径流、边界目录
    pub fn write_forcing_tree(&self, date: &ForecastDate) {
        let layout = self.config.layout();
        let meteo = layout.meteo_day_dir(date);
        fs::create_dir_all(&meteo).unwrap();
        fs::write(meteo.join(format!("FORCE_ecmwf_{}.nc", date.ymd_label())), "").unwrap();
        fs::write(layout.meteo_root().join("weights_meteo_bilin.nc"), "").unwrap();

        fs::create_dir_all(layout.runoff_dir().join("runoff_q_seasonal")).unwrap();
        fs::write(layout.river_salinity_static(), "").unwrap();
        fs::write(layout.runoff_discharge_climatology(date), "").unwrap();

        let bdy = layout.boundary_run_dir(date);
        fs::create_dir_all(&bdy).unwrap();
        fs::write(bdy.join(format!("bdy_hourly_2d_{}.nc", date.ymd_label())), "").unwrap();
        fs::write(bdy.join(format!("bdy_hourly_3d_{}.nc", date.ymd_label())), "").unwrap();
    }

    pub fn with_bathy(&self) {
        self.store.insert(self.ctx.layout().bathy(), Dataset::new());
    }
}

/// 小时级边界产品：`hours` 个时间步，起点 2025-07-01
pub fn boundary_product(hours: usize) -> Dataset {
    let mut ds = Dataset::new();
    ds.add_variable(
        Variable::from_vec("time", "time", (0..hours).map(|h| h as f64).collect())
            .with_attr("units", "hours since 2025-07-01 00:00:00"),
    )
    .unwrap();
    ds.add_variable(Variable::from_vec("depth", "depth", vec![0.5, 40.0, 140.0])).unwrap();
    ds.add_variable(Variable::from_vec("lat", "lat", vec![57.5, 58.5])).unwrap();
    ds.add_variable(Variable::from_vec("lon", "lon", vec![21.55])).unwrap();
    let d2 = ["time", "lat", "lon"];
    let d3 = ["time", "depth", "lat", "lon"];
    let sla = ArrayD::from_elem(IxDyn(&[hours, 2, 1]), 0.1);
    let so = ArrayD::from_shape_fn(IxDyn(&[hours, 3, 2, 1]), |ix| 6.5 + ix[1] as f64);
    let th = ArrayD::from_shape_fn(IxDyn(&[hours, 3, 2, 1]), |ix| 12.0 - ix[1] as f64);
    ds.add_variable(Variable::new("sla", &d2, sla).unwrap()).unwrap();
    ds.add_variable(Variable::new("so", &d3, so).unwrap()).unwrap();
    ds.add_variable(Variable::new("thetao", &d3, th).unwrap()).unwrap();
    ds
}

/// 一天的 2 m 气温
pub fn meteo(t2: f64) -> Dataset {
    let mut ds = Dataset::new();
    ds.add_variable(Variable::from_vec("time", "time", vec![0.0, 12.0])).unwrap();
    ds.add_variable(Variable::from_vec("lat", "lat", vec![58.0, 59.0])).unwrap();
    ds.add_variable(Variable::from_vec("lon", "lon", vec![22.0, 23.0])).unwrap();
    let data = ArrayD::from_elem(IxDyn(&[2, 2, 2]), t2);
    ds.add_variable(
        Variable::new("t2", &["time", "lat", "lon"], data)
            .unwrap()
            .with_attr("units", "K"),
    )
    .unwrap();
    ds
}
