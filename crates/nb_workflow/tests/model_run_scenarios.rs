// crates/nb_workflow/tests/model_run_scenarios.rs

//! 模式运行驱动场景测试（临时目录 + 记录执行器）

mod common;

use common::Env;
use std::fs;

use nb_foundation::{DateWindow, ErrorCategory, ForecastDate};
use nb_tools::{RecordingRunner, ToolOutcome};
use nb_workflow::ModelRunner;

fn date(s: &str) -> ForecastDate {
    ForecastDate::parse(s).unwrap()
}

fn runner_for(env: &Env, start: ForecastDate, ndays: u32) -> ModelRunner {
    ModelRunner::with_today(
        env.config.clone(),
        DateWindow::new(start, ndays).unwrap(),
        env.runner.clone(),
        date("20300101"),
    )
    .unwrap()
}

#[test]
fn restart_run_prepares_links_and_submits() {
    let env = Env::new();
    let start = date("20250701");
    env.write_setup();
    env.write_restarts(&start, 360);
    env.write_forcing_tree(&start);

    let runner = runner_for(&env, start, 2);
    let workdir = runner.workdir().to_path_buf();
    assert!(workdir.ends_with("nemo/NEMO5_EST_0.5nm_op_20250701"));
    // 预置当日输出，用于上传
    fs::create_dir_all(&workdir).unwrap();
    fs::write(workdir.join("EST05nm_op_rerun20_1h_stuvw_20250701-20250701.nc"), "out").unwrap();

    let uploaded = runner.full_run().unwrap();

    for sub in ["initialstate", "restarts", "runoff_seas", "bc_V110", "forcing_ecmwf"] {
        assert!(workdir.join(sub).is_dir(), "{}", sub);
    }
    assert!(workdir.join("output/EST05nm_op_rerun20/2025/07/01").is_dir());
    assert!(workdir.join("iodef.xml").exists());
    assert!(workdir.join("run_nemo").exists());
    assert!(workdir.join("domain_cfg_EST_0.5nm_V110.nc").exists());

    let namelist = fs::read_to_string(workdir.join("namelist_ref")).unwrap();
    assert!(namelist.contains("cn_exp=\"EST05nm_op_rerun20\""));
    assert!(namelist.contains("nn_itend=720"));
    assert!(namelist.contains("ln_rstart=.true."));
    assert!(namelist.contains("nn_date0=20250701"));
    assert!(namelist.contains("rn_rdt=240"));
    let ice = fs::read_to_string(workdir.join("namelist_ice_ref")).unwrap();
    assert_eq!(ice, "ln_iceini=.false.\n");
    assert_eq!(fs::read_to_string(workdir.join("stock1_num.dat")).unwrap(), "360\n");
    assert_eq!(fs::read_to_string(workdir.join("stock2_num.dat")).unwrap(), "720\n");

    let init = workdir.join("initialstate");
    assert!(init.join("restart_in_0000.nc").exists());
    assert!(init.join("restart_ice_in_0001.nc").exists());
    assert!(workdir.join("forcing_ecmwf/FORCE_ecmwf_y2025m07d01.nc").exists());
    assert!(workdir.join("forcing_ecmwf/weights_meteo_bilin.nc").exists());
    assert!(workdir.join("runoff_seas/river_data_s.nc").exists());
    assert!(workdir.join("runoff_seas/river_data_y2025m07d01.nc").exists());
    assert!(workdir.join("bc_V110/bdy_hourly_3d_y2025m07d01.nc").exists());
    assert!(workdir.join("model_last_start").exists());

    let lines = env.runner.command_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("sbatch -W --export=ALL,model_run_dir="));
    assert!(lines[0].ends_with("run_nemo"));
    assert!(lines[1].starts_with("rsync -avz"));
    assert!(lines[1].contains("NEMO/rerun/EST05nm_op_rerun20_1h_stuvw/"));

    assert_eq!(uploaded.len(), 1);
    assert!(uploaded[0].ends_with("EST05nm_op_rerun20_1h_stuvw_20250701-20250702.nc"));
    assert_eq!(fs::read_to_string(&uploaded[0]).unwrap(), "out");
}

#[test]
fn restart_step_falls_back_to_own_stock1() {
    let env = Env::new();
    let start = date("20250701");
    env.write_setup();
    env.write_restarts(&start, 360);
    let rdir = env.config.layout().model_run_dir(&start.previous());
    fs::remove_file(rdir.join("stock1_num.dat")).unwrap();

    let runner = runner_for(&env, start, 1);
    runner.prepare_workdir().unwrap();
    assert_eq!(runner.link_restart().unwrap(), 4);
}

#[test]
fn missing_restart_directory_is_missing_input() {
    let env = Env::new();
    let start = date("20250701");
    env.write_setup();
    let runner = runner_for(&env, start, 1);
    runner.prepare_workdir().unwrap();
    let err = runner.link_restart().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::MissingInput);
}

#[test]
fn missing_boundary_directory_is_missing_input() {
    let env = Env::new();
    let start = date("20250701");
    env.write_setup();
    let runner = runner_for(&env, start, 1);
    runner.prepare_workdir().unwrap();
    assert_eq!(
        runner.link_boundary().unwrap_err().category(),
        ErrorCategory::MissingInput
    );
    assert_eq!(
        runner.link_meteo().unwrap_err().category(),
        ErrorCategory::MissingInput
    );
    assert_eq!(
        runner.link_runoff().unwrap_err().category(),
        ErrorCategory::MissingInput
    );
}

#[test]
fn cold_start_links_initial_state() {
    let env = Env::new();
    let cold = env.config.model.cold_start_date;
    env.write_setup();
    let initial = env.config.layout().initial_run(&cold);
    fs::create_dir_all(initial.parent().unwrap()).unwrap();
    fs::write(&initial, "ic").unwrap();

    let runner = runner_for(&env, cold, 1);
    assert!(runner.settings().cold_start);
    runner.prepare_workdir().unwrap();
    runner.generate_namelists().unwrap();
    let link = runner.link_initial_state().unwrap();
    assert_eq!(fs::read_to_string(link).unwrap(), "ic");
    let namelist = fs::read_to_string(runner.workdir().join("namelist_ref")).unwrap();
    assert!(namelist.contains("ln_rstart=.false."));
    assert!(namelist.contains("ln_tsd_init=.true."));
}

#[test]
fn failed_upload_only_warns() {
    let env = Env::with_runner(RecordingRunner::with_handler(|cmd| {
        let code = if cmd.program() == "rsync" { 255 } else { 0 };
        Ok(ToolOutcome::from_command(cmd, Some(code)))
    }));
    let start = date("20250701");
    env.write_setup();
    let runner = runner_for(&env, start, 1);
    runner.prepare_workdir().unwrap();
    let workdir = runner.workdir();
    fs::write(workdir.join("EST05nm_op_rerun20_1h_SURF_grid_T_20250701-20250701.nc"), "").unwrap();

    let uploaded = runner.upload_outputs(&[0]).unwrap();
    assert!(uploaded.is_empty());
    assert!(workdir
        .join("EST05nm_op_rerun20_1h_SURF_grid_T_20250701-20250702.nc")
        .exists());
    assert_eq!(env.runner.commands().len(), 1);
}

#[test]
fn failed_submission_is_external_tool_error() {
    let env = Env::with_runner(RecordingRunner::with_handler(|cmd| {
        Ok(ToolOutcome::from_command(cmd, Some(1)))
    }));
    let start = date("20250701");
    env.write_setup();
    let runner = runner_for(&env, start, 1);
    runner.prepare_workdir().unwrap();
    assert_eq!(runner.launch().unwrap_err().category(), ErrorCategory::ExternalTool);
}
