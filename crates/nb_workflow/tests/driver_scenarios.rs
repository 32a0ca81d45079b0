// crates/nb_workflow/tests/driver_scenarios.rs

//! 顶层驱动场景测试

mod common;

use common::{boundary_product, meteo, Env};
use parking_lot::Mutex;
use std::sync::Arc;

use nb_forcing::IncrementMode;
use nb_foundation::{ErrorCategory, ForecastDate};
use nb_tools::call_sites;
use nb_workflow::{PipelineDriver, PipelineEvent, RunRequest, StageKind, StageStatus};

fn date(s: &str) -> ForecastDate {
    ForecastDate::parse(s).unwrap()
}

fn recording_driver(env: &Env) -> (PipelineDriver, Arc<Mutex<Vec<PipelineEvent>>>) {
    let driver = PipelineDriver::new(env.config.clone(), env.ctx.clone(), env.runner.clone())
        .with_today(date("20300101"));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    driver
        .dispatcher()
        .add_fn_listener("recorder", move |e| sink.lock().push(e.clone()));
    (driver, events)
}

#[test]
fn operational_run_continues_after_increment_failure() {
    let env = Env::new();
    let processing = date("20250701");
    env.catalog.provide(call_sites::HOURLY_DATASET, boundary_product(3 * 24));
    env.with_bathy();
    env.store
        .insert(env.ctx.layout().meteo_file(&processing.previous()), meteo(280.15));
    env.write_setup();
    env.write_restarts(&processing, 360);
    env.write_forcing_tree(&processing);

    let (driver, events) = recording_driver(&env);
    let summary = driver.run(&RunRequest::new(date("20250702"), 2)).unwrap();

    assert_eq!(summary.date, processing);
    let status = |kind| summary.stage(kind).map(|s| s.status);
    // 没有 EOF 重构，增量失败但不终止
    assert_eq!(status(StageKind::Increment), Some(StageStatus::Failed));
    assert_eq!(status(StageKind::Initial), Some(StageStatus::Skipped));
    assert_eq!(status(StageKind::Boundary), Some(StageStatus::Completed));
    assert_eq!(status(StageKind::Runoff), Some(StageStatus::Completed));
    assert_eq!(status(StageKind::Model), Some(StageStatus::Completed));
    assert_eq!(summary.warnings().count(), 1);
    assert_eq!(summary.stage(StageKind::Boundary).unwrap().outputs.len(), 6);

    let events = events.lock();
    assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { ndays: 2, .. })));
    assert!(matches!(events.last(), Some(PipelineEvent::RunFinished { success: true })));
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::StageFailed {
            kind: StageKind::Increment,
            fatal: false,
            ..
        }
    )));

    assert!(env
        .runner
        .command_lines()
        .iter()
        .any(|l| l.starts_with("sbatch -W")));
}

#[test]
fn boundary_failure_stops_the_run() {
    let env = Env::new();
    let (driver, events) = recording_driver(&env);
    let request = RunRequest::new(date("20250702"), 2).with_mode(IncrementMode::Operational);
    let err = driver.run(&request).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ExternalTool);

    let events = events.lock();
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::StageFailed {
            kind: StageKind::Boundary,
            fatal: true,
            ..
        }
    )));
    assert!(!events.iter().any(|e| matches!(
        e,
        PipelineEvent::StageStarted {
            kind: StageKind::Runoff,
            ..
        }
    )));
    assert!(matches!(events.last(), Some(PipelineEvent::RunFinished { success: false })));
    assert!(env.runner.commands().is_empty());
}
