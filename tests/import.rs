mod common;

use std::fs;

use common::{TestWorkspace, row_count, table_ddl};
use csv_etl::{
    data::Value,
    import::run_import,
    storage::Storage,
    worker::FileImportWorker,
};

#[test]
fn rejected_row_is_kept_verbatim_with_source_header() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.import.sample_rows = 1;
    let source = ws.write(
        "input/orders.csv",
        "id,amount,date\n1,10,2024-01-01\nx,20,2024-01-02\n",
    );
    let ctx = ws.context(config);

    let outcome = FileImportWorker::new(&ctx, &source).run();
    assert_eq!(outcome.table, "EXPORT_orders");
    assert_eq!((outcome.accepted, outcome.rejected), (1, 1));
    assert!(outcome.failure.is_none());

    let ddl = table_ddl(ctx.storage(), "EXPORT_orders");
    assert!(ddl.contains("\"id\" INTEGER"), "{ddl}");
    assert!(ddl.contains("\"amount\" INTEGER"), "{ddl}");
    assert!(ddl.contains("\"date\" DATETIME"), "{ddl}");

    let rejects = ws.read(&ws.path().join("rejects").join("orders_rejects.csv"));
    assert_eq!(rejects, "id,amount,date\nx,20,2024-01-02\n");

    let stored = ctx
        .storage()
        .execute_query("SELECT id, amount, date FROM \"EXPORT_orders\"", &[])
        .unwrap()
        .unwrap();
    assert_eq!(
        stored.rows,
        vec![vec![
            Value::Integer(1),
            Value::Integer(10),
            Value::Text("2024-01-01 00:00:00".into()),
        ]]
    );
}

#[test]
fn sampled_non_numeric_value_makes_the_column_text() {
    let ws = TestWorkspace::new();
    let source = ws.write(
        "input/orders.csv",
        "id,amount,date\n1,10,2024-01-01\nx,20,2024-01-02\n",
    );
    let ctx = ws.context(ws.config());

    let outcome = FileImportWorker::new(&ctx, &source).run();
    assert_eq!((outcome.accepted, outcome.rejected), (2, 0));
    assert!(table_ddl(ctx.storage(), "EXPORT_orders").contains("\"id\" VARCHAR(11)"));
    assert!(!ws.path().join("rejects").join("orders_rejects.csv").exists());
}

#[test]
fn failed_file_contributes_nothing_to_totals() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.import.batch_size = 2;
    ws.write(
        "input/good.csv",
        "id,name\n1,a\n2,b\n3,c\n4,d,extra\n5,e\n6,f\n",
    );
    ws.write_bytes("input/broken.csv", b"id,name\n1,a\n2,b\n3,\xff\xfe\n4,d\n");
    let ctx = ws.context(config);

    let summary = run_import(&ctx, &ctx.config().import.input_folder).unwrap();
    assert_eq!(summary.outcomes.len(), 2);
    let broken = &summary.outcomes[0];
    let good = &summary.outcomes[1];
    assert_eq!(broken.file, "broken.csv");
    assert_eq!(good.file, "good.csv");

    assert_eq!((good.accepted, good.rejected), (5, 1));
    assert!(broken.is_failed());
    assert!(!broken.failure.as_deref().unwrap_or_default().is_empty());
    assert_eq!((broken.accepted, broken.rejected), (0, 0));
    assert_eq!(summary.failed_files, 1);
    assert_eq!((summary.total_accepted, summary.total_rejected), (5, 1));

    // Chunks committed before the failure stay in the table.
    assert_eq!(row_count(ctx.storage(), "EXPORT_broken"), 2);
    assert_eq!(row_count(ctx.storage(), "EXPORT_good"), 5);
}

#[test]
fn reimport_keeps_ddl_and_writes_reject_header_once_per_run() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.import.batch_size = 1;
    config.import.sample_rows = 2;
    ws.write(
        "input/metrics.csv",
        "name,score\nalpha,1.5\nbeta,2\ngamma,n/a\ndelta,oops\n",
    );
    let ctx = ws.context(config);
    let folder = ctx.config().import.input_folder.clone();
    let rejects = ws.path().join("rejects").join("metrics_rejects.csv");

    let first = run_import(&ctx, &folder).unwrap();
    assert_eq!((first.total_accepted, first.total_rejected), (2, 2));
    let ddl = table_ddl(ctx.storage(), "EXPORT_metrics");
    assert!(ddl.contains("\"score\" FLOAT"), "{ddl}");
    assert_eq!(ws.read(&rejects), "name,score\ngamma,n/a\ndelta,oops\n");

    let second = run_import(&ctx, &folder).unwrap();
    assert_eq!((second.total_accepted, second.total_rejected), (2, 2));
    assert_eq!(table_ddl(ctx.storage(), "EXPORT_metrics"), ddl);
    assert_eq!(row_count(ctx.storage(), "EXPORT_metrics"), 4);
    assert_eq!(ws.read(&rejects), "name,score\ngamma,n/a\ndelta,oops\n");
}

#[test]
fn bounded_workers_and_table_locks_import_every_file() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.import.max_workers = Some(2);
    config.import.lock_tables = true;
    for idx in 0..5 {
        let body = (0..20)
            .map(|n| format!("{n},item {n},2024-02-{:02}\n", n % 28 + 1))
            .collect::<String>();
        ws.write(
            &format!("input/batch_{idx}.csv"),
            &format!("n,label,day\n{body}"),
        );
    }
    let ctx = ws.context(config);

    let summary = run_import(&ctx, &ctx.config().import.input_folder).unwrap();
    assert_eq!(summary.failed_files, 0);
    assert_eq!(summary.total_accepted, 100);
    assert_eq!(ctx.storage().list_tables().unwrap().len(), 5);
    for idx in 0..5 {
        assert_eq!(row_count(ctx.storage(), &format!("EXPORT_batch_{idx}")), 20);
    }
}

#[test]
fn empty_input_folder_yields_empty_summary() {
    let ws = TestWorkspace::new();
    let ctx = ws.context(ws.config());
    let summary = run_import(&ctx, &ctx.config().import.input_folder).unwrap();
    assert!(summary.outcomes.is_empty());
    assert_eq!((summary.total_accepted, summary.total_rejected), (0, 0));
}

#[test]
fn header_only_file_creates_table_without_rows() {
    let ws = TestWorkspace::new();
    let source = ws.write("input/shell.csv", "a,b\n");
    let ctx = ws.context(ws.config());
    let outcome = FileImportWorker::new(&ctx, &source).run();
    assert!(!outcome.is_failed());
    assert_eq!((outcome.accepted, outcome.rejected), (0, 0));
    assert!(ctx.storage().table_exists("EXPORT_shell").unwrap());
}

#[test]
fn empty_file_fails_in_inference() {
    let ws = TestWorkspace::new();
    let source = ws.write("input/blank.csv", "");
    let ctx = ws.context(ws.config());
    let outcome = FileImportWorker::new(&ctx, &source).run();
    assert!(outcome.is_failed());
    assert!(outcome.failure.unwrap().starts_with("INFER"));
}

#[test]
fn processed_files_are_archived_and_stale_rejects_cleared() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.import.move_processed = true;
    config.import.clear_rejects = true;
    ws.write("input/people.csv", "age\n30\n41\n");
    let stale = ws.write("rejects/people_rejects.csv", "age\nold\n");
    let ctx = ws.context(config);

    let summary = run_import(&ctx, &ctx.config().import.input_folder).unwrap();
    assert_eq!(summary.total_accepted, 2);
    assert!(!stale.exists());
    assert!(!ws.path().join("input").join("people.csv").exists());

    let archived = fs::read_dir(ws.path().join("input").join("processed"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].starts_with("people_"));
    assert!(archived[0].ends_with(".csv"));
}

#[test]
fn batch_write_failure_counts_zero_and_writes_no_rejects() {
    let ws = TestWorkspace::new();
    let ctx = ws.context(ws.config());
    ctx.storage()
        .execute_query("CREATE TABLE \"EXPORT_x\" (\"other\" INTEGER)", &[])
        .expect("pre-create table");
    let source = ws.write("input/x.csv", "a\n1\n2\n");

    let outcome = FileImportWorker::new(&ctx, &source).run();
    assert!(outcome.failure.is_none(), "{:?}", outcome.failure);
    assert_eq!((outcome.accepted, outcome.rejected), (0, 0));
    assert!(!ws.path().join("rejects").join("x_rejects.csv").exists());
    assert_eq!(row_count(ctx.storage(), "EXPORT_x"), 0);
}

#[test]
fn blank_integer_cells_are_rejected_and_blank_floats_load_as_null() {
    let ws = TestWorkspace::new();
    let source = ws.write("input/scores.csv", "id,score\n1,2.5\n,3.5\n3,\n");
    let ctx = ws.context(ws.config());

    let outcome = FileImportWorker::new(&ctx, &source).run();
    assert_eq!((outcome.accepted, outcome.rejected), (2, 1));
    let rejects = ws.read(&ws.path().join("rejects").join("scores_rejects.csv"));
    assert_eq!(rejects, "id,score\n,3.5\n");

    let nulls = ctx
        .storage()
        .execute_query("SELECT id FROM \"EXPORT_scores\" WHERE score IS NULL", &[])
        .unwrap()
        .unwrap();
    assert_eq!(nulls.rows, vec![vec![Value::Integer(3)]]);
}
