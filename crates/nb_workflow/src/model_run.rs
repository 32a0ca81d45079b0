// crates/nb_workflow/src/model_run.rs

//! 模式运行驱动
//!
//! 按固定顺序完成一次 NEMO 运行：
//!
//! 1. 由起始日期推导运行长度、步数与冷/热启动开关 ([`RunSettings`])
//! 2. 准备运行目录，复制 namelist / xml / 作业脚本，链接静态文件
//! 3. 模板替换生成 `namelist_ref` 与 `namelist_ice_ref`
//! 4. 冷启动链接初始场，否则链接前一日的分区重启文件
//! 5. 链接气象、径流、边界强迫
//! 6. 阻塞提交批处理作业
//! 7. 复制并上传输出到远程归档
//!
//! 单个强迫文件缺失只记录警告；必需目录缺失为 `FileNotFound`。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nb_config::{BoundaryKind, ForcingLayout, ModelConfig, PipelineConfig};
use nb_foundation::{DateWindow, ForecastDate, NbError, NbResult};
use nb_tools::{BatchJob, BatchScheduler, CommandRunner, RemoteSync, RemoteTarget, ToolOutcome};

// ============================================================
// 常量
// ============================================================

/// 主 namelist 模板
pub const NAMELIST_TEMPLATE: &str = "namelist_ref_template_V110_op";

/// 海冰 namelist 模板
pub const ICE_NAMELIST_TEMPLATE: &str = "namelist_ice_ref_template_mm";

/// 批处理作业脚本
pub const RUN_SCRIPT: &str = "run_nemo";

/// 运行目录下的固定子目录
const WORK_SUBDIRS: &[&str] = &[
    "initialstate",
    "restarts",
    "runoff_seas",
    "bc_V110",
    "forcing_ecmwf",
];

/// 从 setup 目录链接的静态文件 (源, 目标)
const STATIC_LINKS: &[(&str, &str)] = &[
    ("coordinates.bdy.nc", "coordinates.bdy.nc"),
    ("bfr_roughness.nc", "bfr_roughness.nc"),
    ("domain_cfg_EST_0.5nm_V110_fix.nc", "domain_cfg_EST_0.5nm_V110.nc"),
    ("nemo.exe", "nemo.exe"),
    ("xios_server.exe", "xios_server.exe"),
];

/// 提交前删除的上次运行残留
const STALE_FILES: &[&str] = &[
    "model_last_start",
    "model_last_end",
    "log.stdout",
    "log.stderr",
    "ocean.output",
];

/// 上传的输出产品 (文件前缀, 远程目录后缀)
pub const OUTPUT_PRODUCTS: &[(&str, &str)] = &[
    ("1h_stuvw", "1h_stuvw"),
    ("1d_ice_grid_T", "1d_ice"),
    ("1h_SURF_grid_T", "1h_surf"),
    ("1h_SURF_grid_U", "1h_surf"),
    ("1h_SURF_grid_V", "1h_surf"),
];

const SECONDS_PER_DAY: u64 = 86_400;

// ============================================================
// 运行参数
// ============================================================

/// 由起始日期推导的运行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// 起始日期
    pub start: ForecastDate,
    /// 是否冷启动
    pub cold_start: bool,
    /// 运行长度 [h]
    pub run_hours: u64,
    /// 时间步长 [s]
    pub rn_rdt: u32,
    /// 总步数
    pub nn_itend: u64,
    /// 一天的步数（重启写出间隔）
    pub stock1: u64,
    /// 两天的步数
    pub stock2: u64,
}

impl RunSettings {
    /// 推导运行参数
    ///
    /// 起始日等于冷启动日期时冷启动；起始日为今天（且非冷启动）时
    /// 运行 `today_run_hours` 小时，否则运行 `ndays * 24` 小时。
    pub fn configure(
        model: &ModelConfig,
        window: &DateWindow,
        today: ForecastDate,
    ) -> NbResult<Self> {
        if model.rn_rdt == 0 {
            return Err(NbError::invalid_config(
                "model.rn_rdt",
                "0",
                "时间步长必须为正",
            ));
        }
        let start = window.start;
        let cold_start = start == model.cold_start_date;
        let run_hours = if !cold_start && start == today {
            u64::from(model.today_run_hours)
        } else {
            u64::from(window.ndays) * 24
        };
        let rdt = u64::from(model.rn_rdt);
        Ok(Self {
            start,
            cold_start,
            run_hours,
            rn_rdt: model.rn_rdt,
            nn_itend: run_hours * 3600 / rdt,
            stock1: SECONDS_PER_DAY / rdt,
            stock2: 2 * SECONDS_PER_DAY / rdt,
        })
    }

    /// 运行覆盖的整天数
    pub fn run_days(&self) -> u64 {
        self.run_hours / 24
    }

    /// 从重启文件启动
    pub fn ln_rstart(&self) -> &'static str {
        fortran_bool(!self.cold_start)
    }

    /// 从初始场读取温盐
    pub fn ln_tsd_init(&self) -> &'static str {
        fortran_bool(self.cold_start)
    }

    /// 海冰初始化
    pub fn ln_iceini(&self) -> &'static str {
        fortran_bool(self.cold_start)
    }

    /// 主 namelist 的占位符替换表（按顺序应用）
    pub fn namelist_substitutions(&self, run_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("_runid_", run_id.to_string()),
            ("_nn_itend_", self.nn_itend.to_string()),
            ("_stock1_", self.stock1.to_string()),
            ("_stock2_", self.stock2.to_string()),
            ("_ln_rstart_", self.ln_rstart().to_string()),
            ("_nn_date0_", self.start.to_string()),
            ("_rn_rdt_", self.rn_rdt.to_string()),
            ("_ln_tsd_init_", self.ln_tsd_init().to_string()),
        ]
    }
}

fn fortran_bool(value: bool) -> &'static str {
    if value {
        ".true."
    } else {
        ".false."
    }
}

/// 依次替换模板中的占位符
pub fn render_template(template: &str, substitutions: &[(&str, String)]) -> String {
    substitutions
        .iter()
        .fold(template.to_string(), |acc, (key, value)| acc.replace(key, value))
}

/// 模式输出文件名 `<runid>_<prefix>_<from>-<to>.nc`
pub fn output_file_name(run_id: &str, prefix: &str, from: &ForecastDate, to: &ForecastDate) -> String {
    format!("{}_{}_{}-{}.nc", run_id, prefix, from, to)
}

// ============================================================
// 文件系统辅助
// ============================================================

fn io_err(action: &str, path: &Path, source: std::io::Error) -> NbError {
    NbError::io_with_source(format!("{} {}", action, path.display()), source)
}

fn ensure_dir(dir: &Path) -> NbResult<()> {
    fs::create_dir_all(dir).map_err(|e| io_err("创建目录", dir, e))
}

/// 创建符号链接，目标已存在时先删除；非 unix 平台复制文件
pub fn force_link(src: &Path, dst: &Path) -> NbResult<()> {
    if fs::symlink_metadata(dst).is_ok() {
        fs::remove_file(dst).map_err(|e| io_err("删除", dst, e))?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(src, dst).map_err(|e| io_err("链接", dst, e))?;
    #[cfg(not(unix))]
    fs::copy(src, dst).map_err(|e| io_err("复制", dst, e)).map(|_| ())?;
    Ok(())
}

/// 目录中文件名以 `prefix` 开头、以 `suffix` 结尾的条目，按路径排序
fn list_matching(dir: &Path, prefix: &str, suffix: &str) -> NbResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err("读取目录", dir, e))? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(prefix) && name.ends_with(suffix) {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// 删除目录中以 `prefix` 开头的文件或链接
fn remove_matching(dir: &Path, prefix: &str) -> NbResult<usize> {
    let stale = list_matching(dir, prefix, "")?;
    for path in &stale {
        fs::remove_file(path).map_err(|e| io_err("删除", path, e))?;
    }
    Ok(stale.len())
}

/// 读取前一次运行写出的重启步数
fn read_restart_step(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

// ============================================================
// 运行驱动
// ============================================================

/// 模式运行驱动
pub struct ModelRunner {
    config: Arc<PipelineConfig>,
    layout: ForcingLayout,
    settings: RunSettings,
    workdir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl ModelRunner {
    /// 以系统当前日期推导运行参数
    pub fn new(
        config: Arc<PipelineConfig>,
        window: DateWindow,
        runner: Arc<dyn CommandRunner>,
    ) -> NbResult<Self> {
        Self::with_today(config, window, runner, ForecastDate::today())
    }

    /// 指定「今天」推导运行参数
    pub fn with_today(
        config: Arc<PipelineConfig>,
        window: DateWindow,
        runner: Arc<dyn CommandRunner>,
        today: ForecastDate,
    ) -> NbResult<Self> {
        let settings = RunSettings::configure(&config.model, &window, today)?;
        let layout = config.layout();
        let workdir = layout.model_run_dir(&window.start);
        Ok(Self {
            config,
            layout,
            settings,
            workdir,
            runner,
        })
    }

    /// 运行参数
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// 运行目录
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn run_id(&self) -> &str {
        &self.config.model.run_id
    }

    /// 执行全部步骤，返回已上传的文件
    pub fn full_run(&self) -> NbResult<Vec<PathBuf>> {
        tracing::info!(
            "==== 模式运行 {} ({} h, {}) ====",
            self.settings.start,
            self.settings.run_hours,
            if self.settings.cold_start { "冷启动" } else { "热启动" }
        );
        self.prepare_workdir()?;
        self.generate_namelists()?;
        if self.settings.cold_start {
            self.link_initial_state()?;
        } else {
            self.link_restart()?;
        }
        self.link_meteo()?;
        self.link_runoff()?;
        self.link_boundary()?;
        self.launch()?;
        self.upload_outputs(&self.config.archive.lead_days)
    }

    /// 创建运行目录并从 setup 目录复制、链接静态文件
    pub fn prepare_workdir(&self) -> NbResult<()> {
        tracing::info!("准备运行目录: {}", self.workdir.display());
        ensure_dir(&self.workdir)?;
        for sub in WORK_SUBDIRS {
            ensure_dir(&self.workdir.join(sub))?;
        }
        ensure_dir(
            &self
                .workdir
                .join("output")
                .join(self.run_id())
                .join(self.settings.start.dir_components()),
        )?;

        let setup = self.layout.setup_dir();
        if !setup.is_dir() {
            return Err(NbError::file_not_found(setup));
        }
        let mut copies = list_matching(setup, "namelist_", "")?;
        copies.extend(list_matching(setup, "", ".xml")?);
        let script = setup.join(RUN_SCRIPT);
        if script.is_file() {
            copies.push(script);
        } else {
            tracing::warn!("缺少作业脚本: {}", script.display());
        }
        for src in copies.iter().filter(|p| p.is_file()) {
            if let Some(name) = src.file_name() {
                let dst = self.workdir.join(name);
                fs::copy(src, &dst).map_err(|e| io_err("复制", &dst, e))?;
            }
        }

        for (src_name, dst_name) in STATIC_LINKS {
            let src = setup.join(src_name);
            if src.exists() {
                force_link(&src, &self.workdir.join(dst_name))?;
            } else {
                tracing::warn!("缺少静态文件: {}", src.display());
            }
        }
        Ok(())
    }

    /// 生成 namelist 与重启步数文件
    pub fn generate_namelists(&self) -> NbResult<()> {
        let setup = self.layout.setup_dir();
        let main = self.settings.namelist_substitutions(self.run_id());
        self.render_file(&setup.join(NAMELIST_TEMPLATE), "namelist_ref", &main)?;
        let ice = [("_ln_iceini_", self.settings.ln_iceini().to_string())];
        self.render_file(&setup.join(ICE_NAMELIST_TEMPLATE), "namelist_ice_ref", &ice)?;

        for (name, value) in [
            ("stock1_num.dat", self.settings.stock1),
            ("stock2_num.dat", self.settings.stock2),
        ] {
            let path = self.workdir.join(name);
            fs::write(&path, format!("{}\n", value)).map_err(|e| io_err("写入", &path, e))?;
        }
        tracing::info!(
            "namelist: nn_itend={} stock1={} ln_rstart={}",
            self.settings.nn_itend,
            self.settings.stock1,
            self.settings.ln_rstart()
        );
        Ok(())
    }

    fn render_file(
        &self,
        template: &Path,
        name: &str,
        substitutions: &[(&str, String)],
    ) -> NbResult<PathBuf> {
        if !template.is_file() {
            return Err(NbError::file_not_found(template));
        }
        let content = fs::read_to_string(template).map_err(|e| io_err("读取", template, e))?;
        let out = self.workdir.join(name);
        fs::write(&out, render_template(&content, substitutions))
            .map_err(|e| io_err("写入", &out, e))?;
        Ok(out)
    }

    /// 冷启动：链接初始温盐场为 `initial_run.nc`
    pub fn link_initial_state(&self) -> NbResult<PathBuf> {
        let src = self.layout.initial_run(&self.settings.start);
        if !src.exists() {
            return Err(NbError::file_not_found(src));
        }
        let dst = self.workdir.join("initial_run.nc");
        force_link(&src, &dst)?;
        Ok(dst)
    }

    /// 热启动：链接前一日运行的分区重启文件，返回链接数
    pub fn link_restart(&self) -> NbResult<usize> {
        tracing::info!("==== 链接重启文件 ====");
        let rdir = self.layout.model_run_dir(&self.settings.start.previous());
        if !rdir.is_dir() {
            return Err(NbError::file_not_found(rdir));
        }
        let step = match read_restart_step(&rdir.join("stock1_num.dat")) {
            Some(step) => step,
            None => {
                tracing::warn!(
                    "{} 中没有可用的 stock1_num.dat，使用默认重启步数 {}",
                    rdir.display(),
                    self.settings.stock1
                );
                self.settings.stock1
            }
        };
        let prefix = format!("{}_{:08}", self.run_id(), step);
        let src_dir = rdir.join("restarts");
        let dst_dir = self.workdir.join("initialstate");
        ensure_dir(&dst_dir)?;
        remove_matching(&dst_dir, "restart_in_")?;
        remove_matching(&dst_dir, "restart_ice_in_")?;

        let mut linked = 0;
        for domain in 0..self.config.model.subdomains {
            for (out_kind, in_kind) in [("restart_out", "restart_in"), ("restart_ice_out", "restart_ice_in")] {
                let src = src_dir.join(format!("{}_{}_{:04}.nc", prefix, out_kind, domain));
                if src.exists() {
                    force_link(&src, &dst_dir.join(format!("{}_{:04}.nc", in_kind, domain)))?;
                    linked += 1;
                } else {
                    tracing::warn!("缺少重启文件: {}", src.display());
                }
            }
        }
        tracing::info!("链接 {} 个重启文件 ({})", linked, prefix);
        Ok(linked)
    }

    fn link_all(&self, files: &[PathBuf], dst_dir: &Path, label: &str) -> NbResult<usize> {
        if files.is_empty() {
            tracing::warn!("没有找到{}文件", label);
        }
        for file in files {
            if let Some(name) = file.file_name() {
                force_link(file, &dst_dir.join(name))?;
            }
        }
        Ok(files.len())
    }

    /// 链接气象强迫与插值权重
    pub fn link_meteo(&self) -> NbResult<usize> {
        tracing::info!("==== 链接气象强迫 ====");
        let dst_dir = self.workdir.join("forcing_ecmwf");
        ensure_dir(&dst_dir)?;
        remove_matching(&dst_dir, "FORCE_")?;

        let root = self.layout.meteo_root();
        if root.is_dir() {
            self.link_all(&list_matching(&root, "weights_meteo", "")?, &dst_dir, "气象权重")?;
        } else {
            tracing::warn!("气象根目录不存在: {}", root.display());
        }

        let day_dir = self.layout.meteo_day_dir(&self.settings.start);
        if !day_dir.is_dir() {
            return Err(NbError::file_not_found(day_dir));
        }
        self.link_all(&list_matching(&day_dir, "FORCE_", "")?, &dst_dir, "气象强迫")
    }

    /// 链接径流：静态盐度、逐日流量气候态、起始日的径流温度
    pub fn link_runoff(&self) -> NbResult<usize> {
        tracing::info!("==== 链接径流强迫 ====");
        let dst_dir = self.workdir.join("runoff_seas");
        ensure_dir(&dst_dir)?;
        remove_matching(&dst_dir, "river_data_")?;

        let salinity = self.layout.river_salinity_static();
        if !salinity.exists() {
            return Err(NbError::file_not_found(salinity));
        }
        force_link(&salinity, &dst_dir.join("river_data_s.nc"))?;
        let mut linked = 1;

        let start = self.settings.start;
        let temperature = self.layout.runoff_temperature(&start);
        for offset in 0..=self.settings.run_days() {
            let day = start.offset_days(offset as i64);
            let discharge = self.layout.runoff_discharge_climatology(&day);
            if discharge.exists() {
                force_link(&discharge, &dst_dir.join(format!("river_data_{}.nc", day.ymd_label())))?;
                linked += 1;
            } else {
                tracing::warn!("缺少径流流量文件: {}", discharge.display());
            }
            if temperature.exists() {
                force_link(
                    &temperature,
                    &dst_dir.join(format!("river_data_t_{}.nc", day.ymd_label())),
                )?;
                linked += 1;
            } else {
                tracing::warn!("缺少径流温度文件: {}", temperature.display());
            }
        }
        Ok(linked)
    }

    /// 链接本次运行的日边界文件
    pub fn link_boundary(&self) -> NbResult<usize> {
        tracing::info!("==== 链接边界强迫 ====");
        let dst_dir = self.workdir.join("bc_V110");
        ensure_dir(&dst_dir)?;
        remove_matching(&dst_dir, "bdy")?;

        let run_dir = self.layout.boundary_run_dir(&self.settings.start);
        if !run_dir.is_dir() {
            return Err(NbError::file_not_found(run_dir));
        }
        let mut linked = 0;
        for kind in [BoundaryKind::Surface2d, BoundaryKind::Profile3d] {
            let prefix = format!("bdy_hourly_{}_", kind.tag());
            let files = list_matching(&run_dir, &prefix, "")?;
            linked += self.link_all(&files, &dst_dir, &format!(" {} 边界", kind.tag()))?;
        }
        Ok(linked)
    }

    /// 清理残留文件，记录启动时间并阻塞提交作业
    pub fn launch(&self) -> NbResult<ToolOutcome> {
        tracing::info!("==== 提交 NEMO 作业 ====");
        for name in STALE_FILES {
            let path = self.workdir.join(name);
            if path.exists() {
                tracing::debug!("删除残留文件: {}", path.display());
                fs::remove_file(&path).map_err(|e| io_err("删除", &path, e))?;
            }
        }
        let stamp = self.workdir.join("model_last_start");
        fs::write(&stamp, format!("{}\n", chrono::Utc::now().timestamp()))
            .map_err(|e| io_err("写入", &stamp, e))?;

        let scheduler = BatchScheduler::new(self.runner.clone(), self.config.tools.sbatch.clone());
        let job = BatchJob::new(RUN_SCRIPT, &self.workdir)
            .export("model_run_dir", self.workdir.display().to_string());
        let outcome = scheduler.submit_and_wait(&job)?;
        tracing::info!("NEMO 作业结束");
        Ok(outcome)
    }

    /// 归档上传器
    pub fn remote_sync(&self) -> RemoteSync {
        let archive = &self.config.archive;
        RemoteSync::new(
            self.runner.clone(),
            self.config.tools.rsync.clone(),
            RemoteTarget {
                user: archive.user.clone(),
                host: archive.host.clone(),
                port: archive.port,
                root: archive.remote_root.clone(),
            },
        )
    }

    /// 把当日输出复制为次日时间戳的文件名并上传；上传失败只记录警告
    pub fn upload_outputs(&self, lead_days: &[u32]) -> NbResult<Vec<PathBuf>> {
        if !self.config.archive.enabled {
            tracing::info!("归档上传已关闭");
            return Ok(Vec::new());
        }
        tracing::info!("==== 上传模式输出 ====");
        let sync = self.remote_sync();
        let mut uploaded = Vec::new();
        for &lead in lead_days {
            let day = self.settings.start.offset_days(i64::from(lead));
            let next = day.next();
            for (prefix, remote_suffix) in OUTPUT_PRODUCTS {
                let same_day = self
                    .workdir
                    .join(output_file_name(self.run_id(), prefix, &day, &day));
                if !same_day.exists() {
                    tracing::warn!("缺少模式输出: {}", same_day.display());
                    continue;
                }
                let stamped = self
                    .workdir
                    .join(output_file_name(self.run_id(), prefix, &day, &next));
                fs::copy(&same_day, &stamped).map_err(|e| io_err("复制", &stamped, e))?;

                let remote = format!("NEMO/rerun/{}_{}/", self.run_id(), remote_suffix);
                match sync.upload(&stamped, &remote) {
                    Ok(_) => uploaded.push(stamped),
                    Err(e) => tracing::warn!("上传失败 {}: {}", stamped.display(), e),
                }
            }
        }
        Ok(uploaded)
    }
}

impl std::fmt::Debug for ModelRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRunner")
            .field("workdir", &self.workdir)
            .field("settings", &self.settings)
            .finish()
    }
}
