use imgbatch_core::api::{
    start_events_out, AppConfig, BatchDriver, CancelFlag, CliError, Pipeline, RunAccountant,
};
use imgbatch_plugins::factory;

use super::cli::RunArgs;
use super::{group_selection, select_pipelines};

/// Exit code when at least one item or group failed.
pub const EXIT_WITH_FAILURES: i32 = 2;
/// Exit code when a cancel request stopped the run early.
pub const EXIT_CANCELLED: i32 = 130;

/// Run the selected pipelines one after another.
pub async fn handle_run(
    args: RunArgs,
    cfg: &AppConfig,
    cancel: CancelFlag,
) -> Result<i32, CliError> {
    let selected = select_pipelines(cfg, &args.select.pipelines)?;
    let groups = group_selection(&args.select.groups);

    let mut events_cfg = cfg.events_out.clone();
    if let Some(path) = &args.events_out {
        events_cfg.enabled = true;
        events_cfg.path = path.clone();
    }
    let events = start_events_out(&events_cfg).await?;

    let progress = args.progress && atty::is(atty::Stream::Stdout);
    let mut any_failures = false;

    for pcfg in selected {
        let mut pcfg = pcfg.clone();
        if let Some(n) = args.max_workers {
            pcfg.max_workers = n;
        }
        if let Some(secs) = args.item_timeout_secs {
            pcfg.item_timeout_secs = Some(secs);
        }
        let pipeline = Pipeline::from_config(&pcfg)?;

        let sinks = factory::build_sinks(
            &args.format,
            args.ascii,
            progress,
            events.as_ref().map(|e| e.sender()),
        )?;
        let accountant = RunAccountant::new(&pipeline.name).with_sinks(sinks);
        let driver = BatchDriver::new(factory::build_stage(&pcfg)).with_cancel(cancel.clone());

        let summary = driver.run_pipeline(&pipeline, groups, accountant).await?;
        any_failures |= summary.has_failures();

        if cancel.is_cancelled() {
            tracing::warn!(pipeline = %pipeline.name, "run cancelled, later pipelines skipped");
            break;
        }
    }

    if let Some(events) = events {
        events.close().await;
    }

    Ok(if cancel.is_cancelled() {
        EXIT_CANCELLED
    } else if any_failures {
        EXIT_WITH_FAILURES
    } else {
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cli::SelectArgs;
    use imgbatch_core::api::PipelineConfig;

    fn args() -> RunArgs {
        RunArgs {
            select: SelectArgs::default(),
            max_workers: Some(2),
            item_timeout_secs: None,
            format: "jsonl".into(),
            progress: false,
            ascii: true,
            events_out: None,
        }
    }

    #[tokio::test]
    async fn test_copy_pipeline_then_resume() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        std::fs::create_dir_all(input.join("g")).unwrap();
        std::fs::write(input.join("g/a"), "a").unwrap();
        std::fs::write(input.join("g/b"), "b").unwrap();

        let cfg = AppConfig {
            pipelines: vec![PipelineConfig::new(
                "mirror",
                &input.display().to_string(),
                &tmp.path().join("out").display().to_string(),
            )],
            ..AppConfig::default()
        };

        let code = handle_run(args(), &cfg, CancelFlag::new()).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_to_string(tmp.path().join("out/g/b")).unwrap(), "b");

        let code = handle_run(args(), &cfg, CancelFlag::new()).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_missing_group_gives_failure_exit() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("in")).unwrap();
        let cfg = AppConfig {
            pipelines: vec![PipelineConfig::new(
                "mirror",
                &tmp.path().join("in").display().to_string(),
                &tmp.path().join("out").display().to_string(),
            )],
            ..AppConfig::default()
        };
        let mut a = args();
        a.select.groups = vec!["absent".into()];

        let code = handle_run(a, &cfg, CancelFlag::new()).await.unwrap();
        assert_eq!(code, EXIT_WITH_FAILURES);
    }
}
