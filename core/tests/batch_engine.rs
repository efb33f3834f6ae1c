mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{names, touch, Dataset, UpperStage};
use imgbatch_core::api::{
    plan, BatchDriver, BatchError, CancelFlag, GroupState, OutputNaming, Pipeline, PoolOptions,
    RunAccountant,
};
use pretty_assertions::assert_eq;

fn pipeline(ds: &Dataset, workers: usize) -> Pipeline {
    Pipeline::new("test", ds.input_root(), ds.output_root()).with_pool(PoolOptions::new(workers))
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let ds = Dataset::new(&[("g1", &["a", "b"]), ("g2", &["c"])]);
    let p = pipeline(&ds, 2);

    let driver = BatchDriver::new(UpperStage::default());
    let first = driver
        .run_pipeline(&p, None, RunAccountant::new("test"))
        .await
        .unwrap();
    assert_eq!(first.stats.succeeded, 3);
    assert_eq!(std::fs::read_to_string(ds.output("g1").join("a")).unwrap(), "A");

    let stage = Arc::new(UpperStage::default());
    let driver = BatchDriver::from_arc(stage.clone());
    let second = driver
        .run_pipeline(&p, None, RunAccountant::new("test"))
        .await
        .unwrap();
    assert_eq!(second.stats.submitted, 0);
    assert_eq!(second.stats.already_done, 3);
    assert_eq!(stage.calls(), 0);
    assert!(!second.has_failures());
}

#[tokio::test]
async fn test_one_failure_does_not_affect_siblings() {
    let ds = Dataset::new(&[("g", &["a", "bad_b", "c", "d"])]);
    let driver = BatchDriver::new(UpperStage::default());

    let summary = driver
        .run_pipeline(&pipeline(&ds, 4), None, RunAccountant::new("test"))
        .await
        .unwrap();

    assert_eq!(summary.stats.succeeded, 3);
    assert_eq!(summary.stats.failed, 1);
    assert_eq!(names(&ds.output("g")), vec!["a", "c", "d"]);

    let (group, failure) = summary.failures().next().unwrap();
    assert_eq!(group, "g");
    assert_eq!(failure.kind, "transform");
    assert!(failure.input.ends_with("bad_b"));
}

#[tokio::test]
async fn test_panicking_item_is_recorded_as_crash() {
    let ds = Dataset::new(&[("g", &["a", "panic_b", "c"])]);
    let driver = BatchDriver::new(UpperStage::default());

    let summary = driver
        .run_pipeline(&pipeline(&ds, 2), None, RunAccountant::new("test"))
        .await
        .unwrap();

    assert_eq!(summary.stats.succeeded, 2);
    let kinds: Vec<_> = summary.failures().map(|(_, f)| f.kind.clone()).collect();
    assert_eq!(kinds, vec!["crashed"]);
    assert_eq!(names(&ds.output("g")), vec!["a", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_pool_size() {
    let items: Vec<String> = (0..12).map(|i| format!("i{i:02}")).collect();
    let refs: Vec<&str> = items.iter().map(String::as_str).collect();
    let ds = Dataset::new(&[("g", &refs)]);

    let stage = Arc::new(UpperStage::slow(Duration::from_millis(30)));
    let driver = BatchDriver::from_arc(stage.clone());
    let summary = driver
        .run_pipeline(&pipeline(&ds, 3), None, RunAccountant::new("test"))
        .await
        .unwrap();

    assert_eq!(summary.stats.succeeded, 12);
    assert!(stage.peak() <= 3, "peak {} exceeds pool size", stage.peak());
    assert!(stage.peak() >= 2, "pool never ran items in parallel");
}

#[tokio::test]
async fn test_interrupted_run_resumes_where_it_stopped() {
    let ds = Dataset::new(&[("g", &["a", "b", "hang_c", "hang_d"])]);
    let p = pipeline(&ds, 4);

    let driver = BatchDriver::new(UpperStage::default());
    let interrupted = tokio::time::timeout(
        Duration::from_millis(300),
        driver.run_pipeline(&p, None, RunAccountant::new("test")),
    )
    .await;
    assert!(interrupted.is_err());
    assert_eq!(names(&ds.output("g")), vec!["a", "b"]);

    // The hanging inputs become ordinary ones for the second run.
    for name in ["hang_c", "hang_d"] {
        let from = ds.input_root().join("g").join(name);
        std::fs::rename(&from, ds.input_root().join("g").join(&name[5..])).unwrap();
    }

    let stage = Arc::new(UpperStage::default());
    let summary = BatchDriver::from_arc(stage.clone())
        .run_pipeline(&p, None, RunAccountant::new("test"))
        .await
        .unwrap();
    assert_eq!(summary.stats.already_done, 2);
    assert_eq!(summary.stats.succeeded, 2);
    assert_eq!(stage.calls(), 2);
    assert_eq!(names(&ds.output("g")), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_existing_output_is_left_untouched() {
    let ds = Dataset::new(&[("g", &["img1", "img2", "img3"])]);
    touch(&ds.output("g").join("img2_out"), "previous");
    let p = pipeline(&ds, 2).with_naming(OutputNaming::with_suffix("_out"));

    let summary = BatchDriver::new(UpperStage::default())
        .run_pipeline(&p, None, RunAccountant::new("test"))
        .await
        .unwrap();

    assert_eq!(summary.stats.submitted, 2);
    assert_eq!(summary.stats.already_done, 1);
    assert_eq!(summary.stats.succeeded, 2);
    assert_eq!(summary.stats.failed, 0);

    let g = summary.group("g").unwrap();
    assert_eq!(g.state, GroupState::Done);
    assert_eq!(g.discovered, 3);
    assert_eq!(g.already_done, 1);
    assert_eq!(g.submitted, 2);
    assert_eq!(g.succeeded, 2);
    assert_eq!(g.failed, 0);
    assert!(g.failures.is_empty());

    assert_eq!(
        names(&ds.output("g")),
        vec!["img1_out", "img2_out", "img3_out"]
    );
    assert_eq!(
        std::fs::read_to_string(ds.output("g").join("img2_out")).unwrap(),
        "previous"
    );
    assert_eq!(
        std::fs::read_to_string(ds.output("g").join("img3_out")).unwrap(),
        "IMG3"
    );
}

#[tokio::test]
async fn test_missing_group_does_not_stop_the_batch() {
    let ds = Dataset::new(&[("a", &["x"]), ("b", &["y"])]);
    let groups = vec!["a".to_string(), "missing".to_string(), "b".to_string()];

    let summary = BatchDriver::new(UpperStage::default())
        .run_pipeline(&pipeline(&ds, 1), Some(&groups), RunAccountant::new("test"))
        .await
        .unwrap();

    assert_eq!(summary.stats.failed_groups, 1);
    assert_eq!(summary.stats.succeeded, 2);
    assert_eq!(summary.group("missing").unwrap().state, GroupState::Failed);
    assert_eq!(summary.group("b").unwrap().state, GroupState::Done);
    assert!(summary.has_failures());
    assert!(!ds.output("missing").exists());
}

#[tokio::test]
async fn test_group_id_outside_the_roots_is_rejected() {
    let ds = Dataset::new(&[("a", &["x"])]);
    touch(&ds.input_root().join("..").join("escape").join("y"), "y");
    let groups = vec!["../escape".to_string(), "a".to_string()];

    let summary = BatchDriver::new(UpperStage::default())
        .run_pipeline(&pipeline(&ds, 1), Some(&groups), RunAccountant::new("test"))
        .await
        .unwrap();

    assert_eq!(summary.stats.failed_groups, 1);
    assert_eq!(summary.stats.succeeded, 1);
    assert_eq!(summary.group("../escape").unwrap().state, GroupState::Failed);
    // `out/../escape` would be the input directory itself.
    assert_eq!(names(&ds.output_root().join("..").join("escape")), vec!["y"]);
}

#[tokio::test]
async fn test_cancel_stops_before_next_group() {
    let ds = Dataset::new(&[("g1", &["a", "b"]), ("g2", &["c"])]);
    let cancel = CancelFlag::new();
    let stage = UpperStage {
        cancel_on_first: Some(cancel.clone()),
        ..UpperStage::default()
    };

    let summary = BatchDriver::new(stage)
        .with_cancel(cancel)
        .run_pipeline(&pipeline(&ds, 1), None, RunAccountant::new("test"))
        .await
        .unwrap();

    // g1 was already scheduling and drains fully.
    assert_eq!(summary.group("g1").unwrap().state, GroupState::Done);
    assert_eq!(summary.stats.succeeded, 2);
    assert_eq!(summary.group("g2").unwrap().state, GroupState::Cancelled);
    assert_eq!(summary.stats.cancelled_groups, 1);
    assert!(!ds.output("g2").exists());
}

#[tokio::test]
async fn test_two_level_groups_and_reference() {
    let ds = Dataset::new(&[("sub-01/T1", &["s1"]), ("sub-02/T1", &["s2"])]);
    let template = ds.tmp.path().join("template.bin");
    touch(&template, "tpl:");

    let p = pipeline(&ds, 2)
        .with_depth(2)
        .with_reference("prefix", template.display().to_string());
    let summary = BatchDriver::new(UpperStage::default())
        .run_pipeline(&p, None, RunAccountant::new("test"))
        .await
        .unwrap();

    assert_eq!(summary.groups.len(), 2);
    assert_eq!(
        std::fs::read_to_string(ds.output("sub-02/T1").join("s2")).unwrap(),
        "tpl:S2"
    );
}

#[tokio::test]
async fn test_missing_reference_is_fatal() {
    let ds = Dataset::new(&[("g", &["a"])]);
    let p = pipeline(&ds, 1).with_reference("prefix", "/nonexistent/template.nii.gz");

    let err = BatchDriver::new(UpperStage::default())
        .run_pipeline(&p, None, RunAccountant::new("test"))
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Reference { .. }));
    assert!(!ds.output("g").exists());
}

#[tokio::test]
async fn test_unusable_output_root_is_fatal() {
    let ds = Dataset::new(&[("g", &["a"])]);
    touch(&ds.output_root(), "not a directory");

    let err = BatchDriver::new(UpperStage::default())
        .run_pipeline(&pipeline(&ds, 1), None, RunAccountant::new("test"))
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::OutputRoot { .. }));
}

#[tokio::test]
async fn test_plan_reports_residual_without_writing() {
    let ds = Dataset::new(&[("g", &["a", "b"])]);
    touch(&ds.output("g").join("a"), "A");

    let plans = plan(&pipeline(&ds, 1), None).unwrap();
    assert_eq!(plans.len(), 1);
    let residual = plans[0].residual.as_ref().unwrap();
    assert_eq!(residual.already_done, 1);
    assert_eq!(residual.pending.len(), 1);
    assert_eq!(names(&ds.output("g")), vec!["a"]);
}
