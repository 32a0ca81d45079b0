// crates/nb_forcing/src/increment.rs

//! 同化增量构建
//!
//! 产出模式同化读取器使用的 `assim_background_increments.d<date>.nc`。
//!
//! # 两种模式
//!
//! - **冷启动**：抓取当日首小时 CMEMS SLA，最近邻重映射到模式网格，
//!   取首个时间步存为 SLA 状态文件，增量直接等于该 SLA；
//!   同时写出直接初始化 (DI) 背景场文件
//! - **业务化**：EOF 重构 SSH 重映射到模式网格后与前一日模式 SSH 做差
//!   `increment = rec - model`，两者先各自最近邻填补
//!
//! # 文件结构
//!
//! ```text
//! bckineta(t, y, x)   long_name=bckinetaIncrement units=m _FillValue=0
//! nav_lev(z)          1..=110
//! z_inc_datef         20191203.5
//! z_inc_dateb         YYYYMMDD
//! z_inc_daten         YYYYMMDD.000002
//! time                YYYYMMDD.000001
//! nav_lat, nav_lon    (y, x)，可选
//! ```
//!
//! 增量文件不压缩。由于 `_FillValue = 0`，经 NetCDF 读回时精确为 0 的格点会被
//! 解码为缺测。

use ndarray::{Array2, Axis, Ix2};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::context::ForcingContext;
use crate::fill::fill_variable;
use nb_foundation::{ForecastDate, NbError, NbResult, INCREMENT_DATEF};
use nb_io::axes::{find_dim, TIME_NAMES};
use nb_io::{DataType, Dataset, DatasetStore, Variable, WriteOptions, FILL_VALUE_ATTR, MISSING_VALUE_ATTR};
use nb_tools::{call_sites, MissingPolicy, RemapRequest, SubsetRequest};

/// 增量变量名
pub const INCREMENT_VAR: &str = "bckineta";
/// 增量文件的虚拟垂向层数
pub const INCREMENT_LEVELS: usize = 110;

const COLD_START_DESCRIPTION: &str = "NEMO assimilation increment from CMEMS SLA";
const OPERATIONAL_DESCRIPTION: &str = "Operational assimilation increment from SSH delta";
const DIRECT_INIT_DESCRIPTION: &str = "Direct Initialization background state file for NEMO";
const DEBUG_DESCRIPTION: &str = "Debug comparison of model vs EOF SSH";

// ============================================================
// 模式
// ============================================================

/// 增量构建模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IncrementMode {
    /// 冷启动：CMEMS SLA
    ColdStart,
    /// 业务化：EOF 重构减前一日模式
    #[default]
    Operational,
}

impl IncrementMode {
    /// 命令行名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ColdStart => "coldstart",
            Self::Operational => "operational",
        }
    }
}

impl fmt::Display for IncrementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncrementMode {
    type Err = NbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coldstart" | "cold-start" | "cold_start" => Ok(Self::ColdStart),
            "operational" | "op" => Ok(Self::Operational),
            other => Err(NbError::invalid_input(format!(
                "未知增量模式 '{}' (coldstart|operational)",
                other
            ))),
        }
    }
}

// ============================================================
// 日期标签
// ============================================================

/// 增量文件的日期标签
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncrementTags {
    /// `z_inc_datef`
    pub datef: f64,
    /// `z_inc_dateb`
    pub dateb: f64,
    /// `z_inc_daten`
    pub daten: f64,
    /// `time`
    pub time: f64,
}

impl IncrementTags {
    /// 目标日期的标签
    pub fn for_date(date: &ForecastDate) -> NbResult<Self> {
        Ok(Self {
            datef: INCREMENT_DATEF,
            dateb: date.tag(),
            daten: date.next_date_tag()?,
            time: date.analysis_time_tag()?,
        })
    }
}

// ============================================================
// 经纬度
// ============================================================

/// 模式网格二维经纬度
#[derive(Debug, Clone, PartialEq)]
pub struct NavCoordinates {
    /// 纬度 (y, x)
    pub lat: Array2<f64>,
    /// 经度 (y, x)
    pub lon: Array2<f64>,
}

impl NavCoordinates {
    /// 在数据集中查找形状为 `shape` 的二维经纬度
    pub fn find(ds: &Dataset, shape: (usize, usize)) -> Option<Self> {
        let grab = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| ds.variable(n))
                .map(Variable::squeeze)
                .find(|v| v.shape() == &[shape.0, shape.1][..])
                .and_then(|v| v.into_data().into_dimensionality::<Ix2>().ok())
        };
        Some(Self {
            lat: grab(&["latitude", "nav_lat", "lat"])?,
            lon: grab(&["longitude", "nav_lon", "lon"])?,
        })
    }

    fn add_to(&self, ds: &mut Dataset) -> NbResult<()> {
        let lat = Variable::new("nav_lat", &["y", "x"], self.lat.clone().into_dyn())?
            .with_attr("units", "degrees_north");
        let lon = Variable::new("nav_lon", &["y", "x"], self.lon.clone().into_dyn())?
            .with_attr("units", "degrees_east");
        ds.add_variable(lat)?;
        ds.add_variable(lon)
    }
}

fn index_coordinate(name: &str, n: usize) -> Variable {
    Variable::from_vec(name, name, (0..n).map(|i| i as f64).collect()).with_dtype(DataType::I32)
}

fn level_numbers() -> Vec<f64> {
    (1..=INCREMENT_LEVELS).map(|k| k as f64).collect()
}

fn to_array2(var: &Variable) -> NbResult<Array2<f64>> {
    NbError::check_rank(var.name(), 2, var.ndim())?;
    var.data()
        .into_dimensionality::<Ix2>()
        .map(|a| a.to_owned())
        .map_err(|e| NbError::schema(format!("{}: {}", var.name(), e)))
}

fn scalar(ds: &Dataset, name: &str) -> NbResult<f64> {
    ds.require(name)?
        .scalar_value()
        .ok_or_else(|| NbError::schema(format!("{} 不是标量", name)))
}

/// 有时间维时取首个时间步
fn first_time_step(var: &Variable) -> NbResult<Variable> {
    match find_dim(var, TIME_NAMES) {
        Some(t) => var.select(t, 0),
        None => Ok(var.clone()),
    }
}

// ============================================================
// 增量文件
// ============================================================

/// 同化增量文件
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementFile {
    field: Array2<f64>,
    tags: IncrementTags,
    nav: Option<NavCoordinates>,
    description: String,
}

impl IncrementFile {
    /// 由二维增量场创建
    pub fn new(field: Array2<f64>, tags: IncrementTags, description: impl Into<String>) -> Self {
        Self {
            field,
            tags,
            nav: None,
            description: description.into(),
        }
    }

    /// 附加经纬度，形状必须与增量场一致
    pub fn with_nav(mut self, nav: Option<NavCoordinates>) -> NbResult<Self> {
        if let Some(n) = &nav {
            let (ny, nx) = self.field.dim();
            NbError::check_shape("nav_lat", &[ny, nx], n.lat.shape())?;
            NbError::check_shape("nav_lon", &[ny, nx], n.lon.shape())?;
        }
        self.nav = nav;
        Ok(self)
    }

    /// 增量场 (y, x)
    pub fn field(&self) -> &Array2<f64> {
        &self.field
    }

    /// 日期标签
    pub fn tags(&self) -> &IncrementTags {
        &self.tags
    }

    /// 经纬度
    pub fn nav(&self) -> Option<&NavCoordinates> {
        self.nav.as_ref()
    }

    /// 全局描述
    pub fn description(&self) -> &str {
        &self.description
    }

    /// 转为数据集
    pub fn to_dataset(&self) -> NbResult<Dataset> {
        let (ny, nx) = self.field.dim();
        let mut ds = Dataset::new();
        ds.add_variable(index_coordinate("t", 1))?;
        ds.add_variable(Variable::from_vec("z", "z", level_numbers()).with_dtype(DataType::I32))?;
        ds.add_variable(index_coordinate("y", ny))?;
        ds.add_variable(index_coordinate("x", nx))?;

        let data = self.field.clone().insert_axis(Axis(0)).into_dyn();
        let increment = Variable::new(INCREMENT_VAR, &["t", "y", "x"], data)?
            .with_attr("long_name", "bckinetaIncrement")
            .with_attr("units", "m")
            .with_attr("coordinates", "nav_lat nav_lon")
            .with_attr(FILL_VALUE_ATTR, 0.0)
            .with_attr(MISSING_VALUE_ATTR, 0.0);
        ds.add_variable(increment)?;
        ds.add_variable(Variable::from_vec("nav_lev", "z", level_numbers()).with_dtype(DataType::I32))?;

        ds.add_variable(Variable::scalar("z_inc_datef", self.tags.datef))?;
        ds.add_variable(Variable::scalar("z_inc_dateb", self.tags.dateb))?;
        ds.add_variable(Variable::scalar("z_inc_daten", self.tags.daten))?;
        ds.add_variable(Variable::scalar("time", self.tags.time))?;

        if let Some(nav) = &self.nav {
            nav.add_to(&mut ds)?;
        }
        ds.set_attr("description", self.description.as_str());
        Ok(ds)
    }

    /// 从数据集解析
    pub fn from_dataset(ds: &Dataset) -> NbResult<Self> {
        let var = ds.require(INCREMENT_VAR)?;
        NbError::check_rank(INCREMENT_VAR, 3, var.ndim())?;
        let t = var.dims()[0].clone();
        let field = to_array2(&var.select(&t, 0)?)?;
        let tags = IncrementTags {
            datef: scalar(ds, "z_inc_datef")?,
            dateb: scalar(ds, "z_inc_dateb")?,
            daten: scalar(ds, "z_inc_daten")?,
            time: scalar(ds, "time")?,
        };
        let nav = NavCoordinates::find(ds, field.dim());
        Ok(Self {
            field,
            tags,
            nav,
            description: ds.attr_text("description").unwrap_or_default().to_string(),
        })
    }

    /// 写出（不压缩）
    pub fn write(&self, store: &dyn DatasetStore, path: &Path) -> NbResult<()> {
        store.write(path, &self.to_dataset()?, &WriteOptions::uncompressed())
    }

    /// 读取
    pub fn read(store: &dyn DatasetStore, path: &Path) -> NbResult<Self> {
        Self::from_dataset(&store.require(path)?)
    }
}

// ============================================================
// 直接初始化背景场
// ============================================================

/// 直接初始化背景场：全零 SSH + 同化日期
#[derive(Debug, Clone, PartialEq)]
pub struct DirectInitState {
    shape: (usize, usize),
    rdastp: f64,
    nav: Option<NavCoordinates>,
}

impl DirectInitState {
    /// 创建
    pub fn new(date: &ForecastDate, shape: (usize, usize), nav: Option<NavCoordinates>) -> Self {
        Self {
            shape,
            rdastp: date.tag(),
            nav,
        }
    }

    /// 转为数据集
    pub fn to_dataset(&self) -> NbResult<Dataset> {
        let (ny, nx) = self.shape;
        let mut ds = Dataset::new();
        ds.add_variable(index_coordinate("y", ny))?;
        ds.add_variable(index_coordinate("x", nx))?;
        let sshn = Variable::new("sshn", &["y", "x"], Array2::<f64>::zeros((ny, nx)).into_dyn())?
            .with_dtype(DataType::F32)
            .with_attr("long_name", "sea surface height")
            .with_attr("units", "m")
            .with_attr(FILL_VALUE_ATTR, 0.0)
            .with_attr(MISSING_VALUE_ATTR, 0.0);
        ds.add_variable(sshn)?;
        ds.add_variable(
            Variable::scalar("rdastp", self.rdastp)
                .with_attr("long_name", "assimilation date")
                .with_attr("units", "YYYYMMDD.XXXX"),
        )?;
        if let Some(nav) = &self.nav {
            nav.add_to(&mut ds)?;
        }
        ds.set_attr("description", DIRECT_INIT_DESCRIPTION);
        Ok(ds)
    }

    /// 写出（不压缩）
    pub fn write(&self, store: &dyn DatasetStore, path: &Path) -> NbResult<()> {
        store.write(path, &self.to_dataset()?, &WriteOptions::uncompressed())
    }
}

/// 模式/EOF SSH 对比调试数据集
pub fn debug_comparison(model: &Array2<f64>, eof: &Array2<f64>) -> NbResult<Dataset> {
    let (ny, nx) = model.dim();
    let mut ds = Dataset::new();
    ds.add_variable(index_coordinate("y", ny))?;
    ds.add_variable(index_coordinate("x", nx))?;
    ds.add_variable(Variable::new("ssh_model", &["y", "x"], model.clone().into_dyn())?)?;
    ds.add_variable(Variable::new("ssh_eof", &["y", "x"], eof.clone().into_dyn())?)?;
    ds.set_attr("description", DEBUG_DESCRIPTION);
    Ok(ds)
}

// ============================================================
// 构建器
// ============================================================

/// 增量构建器
#[derive(Debug)]
pub struct IncrementBuilder<'a> {
    ctx: &'a ForcingContext,
}

impl<'a> IncrementBuilder<'a> {
    /// 创建
    pub fn new(ctx: &'a ForcingContext) -> Self {
        Self { ctx }
    }

    /// 按模式构建，返回增量文件路径
    pub fn build(&self, date: &ForecastDate, mode: IncrementMode) -> NbResult<PathBuf> {
        tracing::info!("==== 同化增量 {} ({}) ====", date, mode);
        match mode {
            IncrementMode::ColdStart => self.cold_start(date),
            IncrementMode::Operational => self.operational(date),
        }
    }

    /// 冷启动：抓取 SLA 并生成增量和 DI 文件
    pub fn cold_start(&self, date: &ForecastDate) -> NbResult<PathBuf> {
        let state = self.fetch_sla_state(date)?;
        self.write_from_sla_state(date, &state)
    }

    /// 抓取首小时 SLA，重映射后取首个时间步存为 SLA 状态文件
    pub fn fetch_sla_state(&self, date: &ForecastDate) -> NbResult<PathBuf> {
        let layout = self.ctx.layout();
        let store = self.ctx.store();
        let work = layout.assim_work_dir(date);
        let raw = work.join("sla_raw.nc");
        let remapped = work.join("sla_remap.nc");

        let start = date.start_of_day();
        let request = SubsetRequest::new(
            call_sites::HOURLY_DATASET,
            call_sites::COLD_START_VARIABLES,
            start,
            start + chrono::Duration::hours(1),
            call_sites::COLD_START_BBOX,
        )?;
        self.ctx.catalog().fetch(&request, &raw)?;

        // CDO 按 lat/lon 识别坐标
        let mut ds = store.require(&raw)?;
        if ds.contains("latitude") && ds.contains("longitude") {
            ds.rename("latitude", "lat");
            ds.rename("longitude", "lon");
            store.write(&raw, &ds, &WriteOptions::uncompressed())?;
        }

        self.ctx.remapper().remap(&RemapRequest::new(
            &raw,
            layout.bathy(),
            &remapped,
            MissingPolicy::NearestNeighbour,
        ))?;

        let ds = store.require(&remapped)?;
        let sla = first_time_step(ds.require("sla")?)?;
        let mut state = Dataset::new();
        state.add_variable(sla.clone())?;
        for v in ds.variables() {
            let is_coordinate = v.name() != "sla"
                && !v.dims().is_empty()
                && v.dims().iter().all(|d| sla.dims().contains(d));
            if is_coordinate {
                state.add_variable(v.clone())?;
            }
        }

        let out = layout.sla_state(date);
        store.write(&out, &state, &WriteOptions::uncompressed())?;
        tracing::info!("SLA 状态文件: {}", out.display());
        Ok(out)
    }

    /// 由 SLA 状态文件生成增量和 DI 文件
    pub fn write_from_sla_state(&self, date: &ForecastDate, sla_state: &Path) -> NbResult<PathBuf> {
        let layout = self.ctx.layout();
        let store = self.ctx.store();

        let ds = store.require(sla_state)?;
        let sla = ds.require("sla")?.squeeze();
        let field = to_array2(&sla)?;
        let shape = field.dim();
        let nav = NavCoordinates::find(&ds, shape);

        let out = layout.increment(date);
        IncrementFile::new(field, IncrementTags::for_date(date)?, COLD_START_DESCRIPTION)
            .with_nav(nav.clone())?
            .write(store, &out)?;
        tracing::info!("增量文件: {}", out.display());

        let di = layout.direct_init(date);
        DirectInitState::new(date, shape, nav).write(store, &di)?;
        tracing::info!("DI 背景场文件: {}", di.display());
        Ok(out)
    }

    /// 业务化：EOF 重构 SSH 减前一日模式 SSH
    pub fn operational(&self, date: &ForecastDate) -> NbResult<PathBuf> {
        let layout = self.ctx.layout();
        let store = self.ctx.store();

        let eof = layout.eof_reconstruction(date);
        let model = layout.previous_model_ssh(date);
        for required in [&eof, &model] {
            if !store.exists(required) {
                return Err(NbError::file_not_found(required.clone()));
            }
        }

        let remapped = layout.eof_remapped(date);
        self.ctx.remapper().remap(&RemapRequest::new(
            &eof,
            layout.bathy(),
            &remapped,
            MissingPolicy::FillThenNearestNeighbour,
        ))?;

        let rec_ds = store.require(&remapped)?;
        let ssh = rec_ds.require("ssh")?;
        let ssh = match ssh.axis_of("time") {
            Some(_) => ssh.select("time", 0)?,
            None => ssh.clone(),
        };
        let rec = to_array2(&fill_variable(&ssh)?)?;

        let mod_ds = store.require(&model)?;
        let model_ssh = mod_ds.require("SSH")?;
        let model_ssh = match model_ssh.axis_of("time_counter") {
            Some(axis) => {
                let n = model_ssh.shape()[axis];
                if n == 0 {
                    return Err(NbError::schema("模式 SSH 的 time_counter 为空"));
                }
                model_ssh.select("time_counter", n - 1)?
            }
            None => model_ssh.clone(),
        };
        let modelled = to_array2(&fill_variable(&model_ssh)?)?;

        if rec.dim() != modelled.dim() {
            return Err(NbError::shape_mismatch(
                "ssh",
                modelled.shape(),
                rec.shape(),
            ));
        }
        let missing = rec.iter().filter(|v| v.is_nan()).count()
            + modelled.iter().filter(|v| v.is_nan()).count();
        if missing > 0 {
            tracing::warn!("填补后仍有 {} 个缺测格点（整场缺测）", missing);
        }

        if self.ctx.config().increment.write_debug_compare {
            let debug_path = layout.debug_compare(date);
            store.write(&debug_path, &debug_comparison(&modelled, &rec)?, &WriteOptions::uncompressed())?;
            tracing::debug!("对比调试文件: {}", debug_path.display());
        }

        let delta = &rec - &modelled;
        let nav = NavCoordinates::find(&rec_ds, delta.dim());
        let out = layout.increment(date);
        IncrementFile::new(delta, IncrementTags::for_date(date)?, OPERATIONAL_DESCRIPTION)
            .with_nav(nav)?
            .write(store, &out)?;
        tracing::info!("业务化增量文件: {}", out.display());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use nb_io::MemoryStore;

    fn date() -> ForecastDate {
        ForecastDate::parse("20250701").unwrap()
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("coldstart".parse::<IncrementMode>().unwrap(), IncrementMode::ColdStart);
        assert_eq!("Operational".parse::<IncrementMode>().unwrap(), IncrementMode::Operational);
        assert!("warm".parse::<IncrementMode>().is_err());
        assert_eq!(IncrementMode::default(), IncrementMode::Operational);
        assert_eq!(IncrementMode::ColdStart.to_string(), "coldstart");
    }

    #[test]
    fn test_tags() {
        let tags = IncrementTags::for_date(&date()).unwrap();
        assert_eq!(tags.datef, 20191203.5);
        assert_eq!(tags.dateb, 20250701.0);
        assert_eq!(tags.time, "20250701.000001".parse::<f64>().unwrap());
        assert_eq!(tags.daten, "20250701.000002".parse::<f64>().unwrap());
    }

    #[test]
    fn test_increment_schema() {
        let field = array![[0.1, -0.2, 0.3], [0.0, 0.5, f64::NAN]];
        let file = IncrementFile::new(field, IncrementTags::for_date(&date()).unwrap(), "d");
        let ds = file.to_dataset().unwrap();

        let inc = ds.require(INCREMENT_VAR).unwrap();
        assert_eq!(inc.dims(), &["t", "y", "x"]);
        assert_eq!(inc.shape(), &[1, 2, 3]);
        assert_eq!(inc.attr_text("units"), Some("m"));
        assert_eq!(inc.attr_text("coordinates"), Some("nav_lat nav_lon"));
        assert_eq!(inc.fill_value(), Some(0.0));
        assert_eq!(ds.dim_len("z"), Some(INCREMENT_LEVELS));
        let lev = ds.require("nav_lev").unwrap().to_vec();
        assert_eq!(lev.first(), Some(&1.0));
        assert_eq!(lev.last(), Some(&110.0));
        assert!(ds.variable("nav_lat").is_none());
        assert!(ds.validate().is_ok());
    }

    #[test]
    fn test_increment_store_roundtrip() {
        let store = MemoryStore::new();
        let field = array![[0.1, -0.2], [0.3, 0.4]];
        let nav = NavCoordinates {
            lat: array![[57.0, 57.0], [57.5, 57.5]],
            lon: array![[21.0, 21.5], [21.0, 21.5]],
        };
        let file = IncrementFile::new(field.clone(), IncrementTags::for_date(&date()).unwrap(), "d")
            .with_nav(Some(nav.clone()))
            .unwrap();
        let path = Path::new("/assim/assim_background_increments.d20250701.nc");
        file.write(&store, path).unwrap();
        assert_eq!(store.options_of(path), Some(WriteOptions::uncompressed()));

        let back = IncrementFile::read(&store, path).unwrap();
        assert_eq!(back.field(), &field);
        assert_eq!(back.tags(), file.tags());
        assert_eq!(back.nav(), Some(&nav));
        assert_eq!(back.description(), "d");
    }

    #[test]
    fn test_nav_shape_checked() {
        let nav = NavCoordinates {
            lat: Array2::zeros((3, 3)),
            lon: Array2::zeros((3, 3)),
        };
        let file = IncrementFile::new(Array2::zeros((2, 2)), IncrementTags::for_date(&date()).unwrap(), "d");
        assert!(file.with_nav(Some(nav)).is_err());
    }

    #[test]
    fn test_direct_init_dataset() {
        let ds = DirectInitState::new(&date(), (3, 4), None).to_dataset().unwrap();
        let sshn = ds.require("sshn").unwrap();
        assert_eq!(sshn.shape(), &[3, 4]);
        assert_eq!(sshn.dtype(), DataType::F32);
        assert!(sshn.data().iter().all(|&v| v == 0.0));
        let rdastp = ds.require("rdastp").unwrap();
        assert_eq!(rdastp.scalar_value(), Some(20250701.0));
        assert_eq!(rdastp.attr_text("units"), Some("YYYYMMDD.XXXX"));
    }

    #[test]
    fn test_debug_comparison() {
        let ds = debug_comparison(&array![[1.0, 2.0]], &array![[1.5, 2.5]]).unwrap();
        assert_eq!(ds.attr_text("description"), Some(DEBUG_DESCRIPTION));
        assert_eq!(ds.require("ssh_eof").unwrap().to_vec(), vec![1.5, 2.5]);
    }
}
