use std::sync::Arc;
use std::time::Duration;

use mirrorsync::catalog::ScheduledTask;
use mirrorsync::scheduler::TaskScheduler;
use mirrorsync::test_utils::{BALANCE_FULL_SQL, balance_rows, create_test_pipeline};
use mirrorsync::types::{ExportMode, TableName};
use mirrorsync_config::shared::RetryConfig;
use mirrorsync_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn catalog_schedules_drive_exports() {
    init_test_tracing();
    let (pipeline, source, destination) = create_test_pipeline().await;
    source
        .register(
            BALANCE_FULL_SQL,
            balance_rows(&[("000001", 20231231, "1"), ("000002", 20231231, "2")]),
        )
        .await;

    let table = TableName::new("fin", "balance");
    pipeline
        .catalog()
        .add_task(ScheduledTask::new(
            table.clone(),
            ExportMode::Full,
            "* * * * * *; not a schedule",
        ))
        .await;
    pipeline
        .catalog()
        .add_task(ScheduledTask::new(
            TableName::new("fin", "unknown"),
            ExportMode::Full,
            "* * * * * *",
        ))
        .await;

    let pipeline = Arc::new(pipeline);
    let scheduler = TaskScheduler::new(pipeline.clone(), pipeline.offset(), RetryConfig::new(1, 0));
    let registered = scheduler
        .register_catalog_tasks(pipeline.catalog().as_ref())
        .await
        .unwrap();
    assert_eq!(registered, 1);

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    scheduler.shutdown().await;

    assert!(destination.write_count().await >= 1);
    assert_eq!(destination.keys(&table).await, vec!["000001", "000002"]);
}
