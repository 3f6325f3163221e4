use mirrorsync::destination::Destination;
use mirrorsync::error::ErrorKind;
use mirrorsync::reconcile::RepairMode;
use mirrorsync::test_utils::{
    BALANCE_FULL_SQL, balance_dataset, balance_rows, create_test_pipeline,
    create_test_pipeline_with, row_batch,
};
use mirrorsync::types::{ExportMode, QueryRequest, TableName, Trigger};
use mirrorsync::validation::{FailureAction, RuleSet, ValidationRule};
use mirrorsync::writer::ExportSummary;
use mirrorsync_telemetry::tracing::init_test_tracing;

fn balance_table() -> TableName {
    TableName::new("fin", "balance")
}

#[tokio::test(flavor = "multi_thread")]
async fn full_export_writes_every_row_in_batches() {
    init_test_tracing();
    let (pipeline, source, destination) = create_test_pipeline().await;
    source
        .register(
            BALANCE_FULL_SQL,
            balance_rows(&[
                ("000001", 20231231, "1.5"),
                ("000002", 20231231, "2"),
                ("000003", 20240331, "3"),
            ]),
        )
        .await;

    let summary = pipeline
        .export(
            "balance",
            QueryRequest::new("balance", ExportMode::Full, Trigger::Manual),
        )
        .await
        .unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.failed_batches, 0);
    assert_eq!(summary.rows_written, 3);
    assert_eq!(
        destination.keys(&balance_table()).await,
        vec!["000001", "000002", "000003"]
    );

    let rows = destination.table_rows(&balance_table()).await;
    assert_eq!(rows[2]["bbrq"].as_deref(), Some("20240331"));
}

#[tokio::test(flavor = "multi_thread")]
async fn date_range_export_substitutes_requested_and_default_dates() {
    init_test_tracing();
    let (pipeline, source, _destination) = create_test_pipeline().await;

    let explicit = QueryRequest::new("balance", ExportMode::DateRange, Trigger::Manual)
        .with_dates(20240101u32, 20240331u32);
    let err = pipeline.export("balance", explicit).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoData);

    let defaulted = QueryRequest::new("balance", ExportMode::DateRange, Trigger::Scheduled);
    let _ = pipeline.export("balance", defaulted).await;

    let executed = source.executed().await;
    assert_eq!(
        executed[0].sql,
        "select zqdm, bbrq, amount from fin.balance where bbrq between 20240101 and 20240331;"
    );

    let today = pipeline.today().format("%Y%m%d").to_string();
    assert_eq!(
        executed.last().unwrap().sql,
        format!(
            "select zqdm, bbrq, amount from fin.balance where bbrq between {today} and {today};"
        )
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn skip_all_rule_aborts_without_writing() {
    init_test_tracing();
    let rules = RuleSet::new(vec![
        ValidationRule::new("amount >= 0", FailureAction::SkipAll).unwrap(),
    ]);
    let (pipeline, source, destination) =
        create_test_pipeline_with(balance_dataset().with_rules(rules)).await;
    source
        .register(
            BALANCE_FULL_SQL,
            balance_rows(&[("000001", 20231231, "1"), ("000002", 20231231, "-4")]),
        )
        .await;

    let err = pipeline
        .export(
            "balance",
            QueryRequest::new("balance", ExportMode::Full, Trigger::Manual),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationAbort);
    assert_eq!(destination.write_count().await, 0);
    assert!(destination.keys(&balance_table()).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn skip_row_rule_drops_only_failing_rows() {
    init_test_tracing();
    let rules = RuleSet::new(vec![
        ValidationRule::new("amount > 0", FailureAction::SkipRow).unwrap(),
    ]);
    let (pipeline, source, destination) =
        create_test_pipeline_with(balance_dataset().with_rules(rules)).await;
    source
        .register(
            BALANCE_FULL_SQL,
            balance_rows(&[
                ("000001", 20231231, "1"),
                ("000002", 20231231, "-4"),
                ("000003", 20231231, "3"),
            ]),
        )
        .await;

    let summary = pipeline
        .export(
            "balance",
            QueryRequest::new("balance", ExportMode::Full, Trigger::Manual),
        )
        .await
        .unwrap();

    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.skipped_rows, 1);
    assert_eq!(
        destination.keys(&balance_table()).await,
        vec!["000001", "000003"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_datasets_are_rejected() {
    init_test_tracing();
    let (pipeline, source, destination) = create_test_pipeline().await;

    let err = pipeline
        .export(
            "missing",
            QueryRequest::new("missing", ExportMode::Full, Trigger::Manual),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownDataset);
    assert!(source.executed().await.is_empty());
    assert_eq!(destination.write_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn compare_export_repairs_the_destination() {
    init_test_tracing();
    let (pipeline, source, destination) = create_test_pipeline().await;
    source
        .register(
            BALANCE_FULL_SQL,
            balance_rows(&[("000001", 20231231, "1"), ("000002", 20231231, "2")]),
        )
        .await;
    destination
        .write_batch(&row_batch(
            &balance_table(),
            &[("000001", 20231231, "1"), ("000007", 20231231, "7")],
        ))
        .await
        .unwrap();

    let summary = pipeline
        .export(
            "balance",
            QueryRequest::new("balance", ExportMode::Compare, Trigger::Manual),
        )
        .await
        .unwrap();

    assert_eq!(summary, ExportSummary::default());
    assert_eq!(
        destination.keys(&balance_table()).await,
        vec!["000001", "000002"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn report_only_reconciliation_lists_drift() {
    init_test_tracing();
    let (pipeline, source, destination) = create_test_pipeline().await;
    source
        .register(
            BALANCE_FULL_SQL,
            balance_rows(&[("000001", 20231231, "1"), ("000001", 20240331, "1")]),
        )
        .await;
    destination
        .write_batch(&row_batch(
            &balance_table(),
            &[("000001", 20231231, "1"), ("000003", 20231231, "3")],
        ))
        .await
        .unwrap();

    let summary = pipeline
        .reconcile("balance", RepairMode::REPORT_ONLY)
        .await
        .unwrap();

    assert_eq!(summary.rows_deleted, 0);
    assert_eq!(summary.rows_inserted, 0);
    assert_eq!(summary.result.keys_only_in_authoritative, vec!["000003"]);
    assert_eq!(
        summary.result.per_key_version_diff["000001"].extra_in_mirror,
        vec![20240331]
    );
    assert_eq!(
        destination.keys(&balance_table()).await,
        vec!["000001", "000003"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_reports_an_unreachable_destination() {
    init_test_tracing();
    let (pipeline, _source, destination) = create_test_pipeline().await;

    pipeline.health_check().await.unwrap();

    destination.set_reachable(false).await;
    let err = pipeline.health_check().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);

    destination.set_reachable(true).await;
    pipeline.health_check().await.unwrap();
}
