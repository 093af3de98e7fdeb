use harvester::config::DownloadConfig;
use harvester::download::{select_fresh, DownloadResolver};
use harvester::{ExportError, SystemClock};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn write_aged(dir: &Path, name: &str, age: Duration) {
    let path = dir.join(name);
    std::fs::write(&path, name).unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

fn resolver(dir: &Path, max_wait_secs: u64) -> DownloadResolver {
    let config = DownloadConfig {
        max_wait_secs,
        poll_interval_secs: 2,
        ..DownloadConfig::default()
    };
    DownloadResolver::new(dir, &config, Arc::new(SystemClock))
}

#[test]
fn newest_fresh_file_wins() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(dir.path(), "older.csv", Duration::from_secs(20));
    write_aged(dir.path(), "newer.csv", Duration::from_secs(5));
    write_aged(dir.path(), "newest.xlsx", Duration::from_secs(1));

    let found = select_fresh(dir.path(), "csv", SystemTime::now(), Duration::from_secs(60))
        .unwrap()
        .unwrap();
    assert_eq!(found.path, dir.path().join("newer.csv"));
    assert_eq!(found.format, "csv");
}

#[test]
fn stale_newest_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(dir.path(), "yesterday.csv", Duration::from_secs(24 * 3600));

    let found = select_fresh(dir.path(), "csv", SystemTime::now(), Duration::from_secs(60)).unwrap();
    assert!(found.is_none());
}

#[test]
fn extension_match_ignores_case_and_dot() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(dir.path(), "Report.CSV", Duration::from_secs(2));

    let found = select_fresh(dir.path(), ".csv", SystemTime::now(), Duration::from_secs(60)).unwrap();
    assert!(found.is_some());
}

#[tokio::test(start_paused = true)]
async fn file_arriving_during_polling_is_found() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver(dir.path(), 60);
    let target = dir.path().join("export.csv");

    let writer = {
        let target = target.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            std::fs::write(&target, "a,b\n").unwrap();
        })
    };

    let artifact = resolver.resolve().await.unwrap();
    writer.await.unwrap();
    assert_eq!(artifact.path, target);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_the_wait_budget() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(dir.path(), "leftover.csv", Duration::from_secs(600));

    let started = tokio::time::Instant::now();
    let err = resolver(dir.path(), 10).resolve().await.unwrap_err();
    assert!(matches!(err, ExportError::DownloadNotFound(_)));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11), "{waited:?}");
}

#[tokio::test]
async fn missing_directory_is_a_download_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolver(&dir.path().join("nope"), 0)
        .resolve()
        .await
        .unwrap_err();
    match err {
        ExportError::DownloadNotFound(msg) => assert!(msg.contains("last error"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}
