// crates/nb_config/src/layout.rs

//! 强迫场目录布局
//!
//! 集中所有带日期的文件名模板。下游模式按字面名称读取这些文件，
//! 因此模板必须保持不变。

use std::path::{Path, PathBuf};

use crate::pipeline_config::{ModelConfig, PathsConfig};
use nb_foundation::ForecastDate;

/// 边界文件分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// 表层：sla + 零速度占位
    Surface2d,
    /// 剖面：温盐 + 零速度占位
    Profile3d,
}

impl BoundaryKind {
    /// 文件名中的分组标记
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Surface2d => "2d",
            Self::Profile3d => "3d",
        }
    }
}

/// 目录布局
#[derive(Debug, Clone)]
pub struct ForcingLayout {
    forcing_dir: PathBuf,
    scratch_dir: PathBuf,
    setup_dir: PathBuf,
    model_root: PathBuf,
    run_dir_prefix: String,
    ssh_output_run_id: String,
}

impl ForcingLayout {
    /// 从配置创建
    pub fn new(paths: &PathsConfig, model: &ModelConfig) -> Self {
        Self {
            forcing_dir: paths.forcing_dir.clone(),
            scratch_dir: paths.scratch_dir.clone(),
            setup_dir: paths.setup_dir.clone(),
            model_root: paths.model_root.clone(),
            run_dir_prefix: model.run_dir_prefix.clone(),
            ssh_output_run_id: model.ssh_output_run_id.clone(),
        }
    }

    /// 强迫场根目录
    pub fn forcing_dir(&self) -> &Path {
        &self.forcing_dir
    }

    /// 模式配置目录
    pub fn setup_dir(&self) -> &Path {
        &self.setup_dir
    }

    /// 模式网格（bathymetry），同时作为重映射目标网格
    pub fn bathy(&self) -> PathBuf {
        self.forcing_dir.join("bathy_meter.nc")
    }

    // ------------------------------------------------------------
    // 同化
    // ------------------------------------------------------------

    /// 同化目录
    pub fn assim_dir(&self) -> PathBuf {
        self.forcing_dir.join("assim")
    }

    /// 单次运行的同化中间文件目录
    pub fn assim_work_dir(&self, date: &ForecastDate) -> PathBuf {
        self.assim_dir().join(format!("work_{}", date))
    }

    /// 冷启动 SLA 状态文件
    pub fn sla_state(&self, date: &ForecastDate) -> PathBuf {
        self.assim_dir().join(format!("sla_state_cmems_{}.nc", date))
    }

    /// 同化增量文件
    pub fn increment(&self, date: &ForecastDate) -> PathBuf {
        self.assim_dir()
            .join(format!("assim_background_increments.d{}.nc", date))
    }

    /// 直接初始化背景场文件
    pub fn direct_init(&self, date: &ForecastDate) -> PathBuf {
        self.assim_dir()
            .join(format!("assim_background_state_DI.d{}.nc", date))
    }

    /// EOF 重构 SSH（外部产品）
    pub fn eof_reconstruction(&self, date: &ForecastDate) -> PathBuf {
        self.assim_dir()
            .join("ssh_rec")
            .join(format!("ssh_rec.d{}.t0000.nc", date))
    }

    /// 重映射到模式网格后的 EOF SSH
    pub fn eof_remapped(&self, date: &ForecastDate) -> PathBuf {
        self.assim_dir().join(format!("ssh_rec_remapped_{}.nc", date))
    }

    /// 模式/EOF 对比调试文件
    pub fn debug_compare(&self, date: &ForecastDate) -> PathBuf {
        self.assim_dir().join(format!("debug_ssh_compare_{}.nc", date))
    }

    /// 前一日模式 SSH 输出
    pub fn previous_model_ssh(&self, date: &ForecastDate) -> PathBuf {
        let prev = date.previous();
        self.scratch_dir
            .join(format!("{}{}", self.run_dir_prefix, prev))
            .join(format!(
                "{}_2ts_SSH_grid_T_{}-{}.nc",
                self.ssh_output_run_id, prev, prev
            ))
    }

    // ------------------------------------------------------------
    // 边界
    // ------------------------------------------------------------

    /// 边界根目录
    pub fn boundary_dir(&self) -> PathBuf {
        self.forcing_dir.join("boundary")
    }

    /// 边界目标网格描述
    pub fn boundary_grid(&self) -> PathBuf {
        self.boundary_dir().join("gridfile_bdy_est05")
    }

    /// 原始抓取文件
    pub fn boundary_raw(&self, date: &ForecastDate) -> PathBuf {
        self.boundary_dir()
            .join("cmems_nrt")
            .join("raw")
            .join(format!("bc_est_{}.nc", date))
    }

    /// 边界产品根目录
    pub fn boundary_out_root(&self) -> PathBuf {
        self.boundary_dir().join("cmems_nrt_bc_V110")
    }

    /// 重映射后的多日边界文件
    pub fn boundary_remap(&self, date: &ForecastDate) -> PathBuf {
        self.boundary_out_root()
            .join(format!("bc_est_{}_remap.nc", date))
    }

    /// 某次运行的边界输出目录 `YYYY/MM/DD/00`
    pub fn boundary_run_dir(&self, run_date: &ForecastDate) -> PathBuf {
        self.boundary_out_root()
            .join(run_date.dir_components())
            .join("00")
    }

    /// 日边界文件 `bdy_hourly_{2d,3d}_yYYYYmMMdDD.nc`
    pub fn boundary_daily(
        &self,
        run_date: &ForecastDate,
        kind: BoundaryKind,
        day: &ForecastDate,
    ) -> PathBuf {
        self.boundary_run_dir(run_date)
            .join(format!("bdy_hourly_{}_{}.nc", kind.tag(), day.ymd_label()))
    }

    /// TEOS-10 日边界文件
    pub fn boundary_teos10(&self, run_date: &ForecastDate, day: &ForecastDate) -> PathBuf {
        self.boundary_run_dir(run_date)
            .join(format!("bdy_hourly_3d_TEOS10_{}.nc", day.ymd_label()))
    }

    // ------------------------------------------------------------
    // 气象
    // ------------------------------------------------------------

    /// 气象强迫根目录
    pub fn meteo_root(&self) -> PathBuf {
        self.forcing_dir.join("meteo").join("meteo_nemo_ecmwf_BAL")
    }

    /// 某日气象强迫目录 `YYYY/MM/DD/00`
    pub fn meteo_day_dir(&self, date: &ForecastDate) -> PathBuf {
        self.meteo_root().join(date.dir_components()).join("00")
    }

    /// 某日气象强迫文件
    pub fn meteo_file(&self, date: &ForecastDate) -> PathBuf {
        self.meteo_day_dir(date)
            .join(format!("FORCE_ecmwf_{}.nc", date.ymd_label()))
    }

    // ------------------------------------------------------------
    // 径流
    // ------------------------------------------------------------

    /// 径流根目录
    pub fn runoff_dir(&self) -> PathBuf {
        self.forcing_dir.join("runoff")
    }

    /// 径流温度目录
    pub fn runoff_temperature_dir(&self) -> PathBuf {
        self.runoff_dir().join("runoff_t_atmt2")
    }

    /// 径流温度文件
    pub fn runoff_temperature(&self, date: &ForecastDate) -> PathBuf {
        self.runoff_temperature_dir()
            .join(format!("river_data_t_{}.nc", date.ymd_label()))
    }

    /// 径流温度中间文件目录（每个日期一个）
    pub fn runoff_work_dir(&self, date: &ForecastDate) -> PathBuf {
        self.runoff_temperature_dir().join(format!(".work_{}", date))
    }

    /// 季节性流量气候态文件（固定 2015 年）
    pub fn runoff_discharge_climatology(&self, date: &ForecastDate) -> PathBuf {
        self.runoff_dir()
            .join("runoff_q_seasonal")
            .join(format!("river_data_y2015m{}d{}.nc", date.mm(), date.dd()))
    }

    /// 静态径流盐度文件
    pub fn river_salinity_static(&self) -> PathBuf {
        self.runoff_dir().join("river_data_s_c0.1.nc")
    }

    // ------------------------------------------------------------
    // 初始场与运行目录
    // ------------------------------------------------------------

    /// 初始场目录
    pub fn initial_dir(&self) -> PathBuf {
        self.forcing_dir.join("initial")
    }

    /// 初始场原始日均抓取
    pub fn initial_raw(&self, date: &ForecastDate) -> PathBuf {
        self.initial_dir()
            .join(format!("BAL-NEMO_PHY-DailyMeans-{}.nc", date))
    }

    /// 初始场水平重映射中间文件
    pub fn initial_remap(&self, date: &ForecastDate) -> PathBuf {
        self.initial_dir().join(format!("initial_remap_{}.nc", date))
    }

    /// 冷启动初始场
    pub fn initial_run(&self, date: &ForecastDate) -> PathBuf {
        self.initial_dir().join(format!("initial_run_t{}.nc", date))
    }

    /// 模式运行目录
    pub fn model_run_dir(&self, date: &ForecastDate) -> PathBuf {
        self.model_root
            .join(format!("{}{}", self.run_dir_prefix, date))
    }
}
