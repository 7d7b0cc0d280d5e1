mod common;

use std::fs;

use common::TestWorkspace;
use csv_etl::{
    data::Value,
    export::{ExportOutcome, discover_export_tables, export_table, run_export},
    import::run_import,
    storage::Storage,
};

fn exported_files(dir: &std::path::Path) -> Vec<String> {
    let mut names = fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn empty_tables_are_skipped_and_filled_tables_written_once() {
    let ws = TestWorkspace::new();
    let ctx = ws.context(ws.config());
    let storage = ctx.storage();
    storage
        .execute_query("CREATE TABLE \"EXPORT_empty\" (\"a\" INTEGER)", &[])
        .unwrap();
    storage
        .execute_query("CREATE TABLE \"EXPORT_full\" (\"a\" INTEGER, \"b\" VARCHAR(20))", &[])
        .unwrap();
    for (a, b) in [(1, "one"), (2, "two, quoted")] {
        storage
            .execute_query(
                "INSERT INTO \"EXPORT_full\" VALUES (?1, ?2)",
                &[Value::Integer(a), Value::Text(b.to_string())],
            )
            .unwrap();
    }
    let dest = ws.path().join("out");

    assert_eq!(
        export_table(storage, "EXPORT_empty", &dest).unwrap(),
        ExportOutcome::Skipped
    );
    assert!(exported_files(&dest).is_empty());

    let outcome = export_table(storage, "EXPORT_full", &dest).unwrap();
    let ExportOutcome::Written { path, rows } = outcome else {
        panic!("expected a written export");
    };
    assert_eq!(rows, 2);
    let files = exported_files(&dest);
    assert_eq!(files.len(), 1);
    let name = &files[0];
    assert!(name.starts_with("EXPORT_full_"));
    // EXPORT_full_YYYYMMDD_HHMMSS.csv
    assert_eq!(name.len(), "EXPORT_full_".len() + 15 + 4);
    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "a,b\n1,one\n2,\"two, quoted\"\n"
    );
}

#[test]
fn run_export_isolates_failing_tables() {
    let ws = TestWorkspace::new();
    ws.write("input/sales.csv", "region,total\nnorth,10.5\nsouth,7\n");
    let ctx = ws.context(ws.config());
    run_import(&ctx, &ctx.config().import.input_folder).unwrap();
    let dest = ws.path().join("export");

    let requested = vec!["missing_table".to_string(), "EXPORT_sales".to_string()];
    let summary = run_export(&ctx, &dest, Some(requested.as_slice())).unwrap();
    assert_eq!((summary.written, summary.skipped, summary.failed), (1, 0, 1));
    assert_eq!(summary.exports[0].table, "missing_table");
    assert!(matches!(summary.exports[0].outcome, ExportOutcome::Failed(_)));

    let files = exported_files(&dest);
    assert_eq!(files.len(), 1);
    let contents = fs::read_to_string(dest.join(&files[0])).unwrap();
    assert_eq!(contents, "region,total\nnorth,10.5\nsouth,7\n");
}

#[test]
fn discovery_only_returns_prefixed_tables() {
    let ws = TestWorkspace::new();
    let ctx = ws.context(ws.config());
    for table in ["EXPORT_b", "export_a", "audit_log"] {
        ctx.storage()
            .execute_query(&format!("CREATE TABLE \"{table}\" (x INTEGER)"), &[])
            .unwrap();
    }
    let tables = discover_export_tables(ctx.storage(), "EXPORT_").unwrap();
    assert_eq!(tables, vec!["EXPORT_b", "export_a"]);

    let summary = run_export(&ctx, &ws.path().join("export"), None).unwrap();
    assert_eq!(summary.skipped, 2);
    assert!(exported_files(&ws.path().join("export")).is_empty());
}
