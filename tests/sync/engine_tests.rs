// Reconciliation cycle tests against the in-memory remote

use datapush::sync::{ManifestStore, SyncEngine};
use std::sync::Arc;
use tempfile::TempDir;

use crate::support::{config, set_of, write_file, MockConnector, DEST};

struct Env {
    source: TempDir,
    state: TempDir,
    remote: MockConnector,
}

impl Env {
    fn new() -> Self {
        Self {
            source: TempDir::new().unwrap(),
            state: TempDir::new().unwrap(),
            remote: MockConnector::new(),
        }
    }

    fn engine(&self, ignore_extensions: &[&str]) -> SyncEngine {
        SyncEngine::new(
            config(self.source.path(), self.state.path(), ignore_extensions),
            Arc::new(self.remote.clone()),
        )
    }

    fn local_store(&self) -> ManifestStore {
        ManifestStore::new(
            self.state.path().join("already_uploaded.txt"),
            format!("{}/.already_uploaded.txt", DEST),
        )
    }
}

#[tokio::test]
async fn test_first_cycle_mirrors_tree() {
    let env = Env::new();
    write_file(env.source.path(), "docs/readme.txt", b"read me");
    write_file(env.source.path(), "data.csv", b"a,b\n1,2\n");

    let report = env.engine(&[]).run_cycle().await.unwrap();

    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.files_uploaded, 2);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.bytes_uploaded, 7 + 8);

    assert_eq!(env.remote.remote_file("/mirror/docs/readme.txt").unwrap(), b"read me");
    assert_eq!(env.remote.remote_file("/mirror/data.csv").unwrap(), b"a,b\n1,2\n");
    assert!(env.remote.with(|s| s.dirs.contains("/mirror/docs")));
    assert!(env.remote.with(|s| s.dirs.contains("/mirror")));

    let expected = set_of(&["docs/readme.txt", "data.csv"]);
    assert_eq!(env.local_store().load_local().unwrap(), expected);
    assert_eq!(env.remote.remote_manifest().unwrap(), expected);
}

#[tokio::test]
async fn test_manifests_pushed_after_every_file() {
    let env = Env::new();
    write_file(env.source.path(), "a", b"1");
    write_file(env.source.path(), "b", b"2");

    env.engine(&[]).run_cycle().await.unwrap();

    let puts = env.remote.with(|s| s.puts.clone());
    assert_eq!(
        puts,
        vec![
            "/mirror/a".to_string(),
            "/mirror/.already_uploaded.txt".to_string(),
            "/mirror/b".to_string(),
            "/mirror/.already_uploaded.txt".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_second_cycle_is_idempotent() {
    let env = Env::new();
    write_file(env.source.path(), "docs/readme.txt", b"read me");
    write_file(env.source.path(), "data.csv", b"1,2");

    let engine = env.engine(&[]);
    engine.run_cycle().await.unwrap();
    let puts_after_first = env.remote.total_puts();

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.files_uploaded, 0);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(env.remote.total_puts(), puts_after_first);
}

#[tokio::test]
async fn test_new_file_picked_up_next_cycle() {
    let env = Env::new();
    write_file(env.source.path(), "old.txt", b"old");

    let engine = env.engine(&[]);
    engine.run_cycle().await.unwrap();

    write_file(env.source.path(), "new/new.txt", b"new");
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.files_uploaded, 1);
    assert_eq!(env.remote.data_puts(), vec!["/mirror/old.txt", "/mirror/new/new.txt"]);
    assert_eq!(
        env.remote.remote_manifest().unwrap(),
        set_of(&["old.txt", "new/new.txt"])
    );
}

#[tokio::test]
async fn test_ignored_extension_never_uploaded() {
    let env = Env::new();
    write_file(env.source.path(), "x.tmp", b"scratch");
    write_file(env.source.path(), "keep.txt", b"keep");

    let report = env.engine(&[".tmp"]).run_cycle().await.unwrap();

    assert_eq!(report.files_scanned, 1);
    assert_eq!(env.remote.data_puts(), vec!["/mirror/keep.txt"]);
    assert!(!env.local_store().load_local().unwrap().contains("x.tmp"));
}

#[tokio::test]
async fn test_ignore_list_is_not_retroactive() {
    let env = Env::new();
    write_file(env.source.path(), "report.tmp", b"r");

    env.engine(&[]).run_cycle().await.unwrap();
    let report = env.engine(&[".tmp"]).run_cycle().await.unwrap();

    assert_eq!(report.files_scanned, 0);
    assert!(env.local_store().load_local().unwrap().contains("report.tmp"));
    assert!(env.remote.remote_manifest().unwrap().contains("report.tmp"));
}

#[tokio::test]
async fn test_partial_failure_then_recovery() {
    let env = Env::new();
    write_file(env.source.path(), "a", b"aaaa");
    write_file(env.source.path(), "b", b"bbbb");
    write_file(env.source.path(), "c", b"cccc");
    env.remote.with(|s| s.fail_put = Some("/mirror/b".to_string()));

    let engine = env.engine(&[]);
    let err = engine.run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), "remote");
    // c was never attempted
    assert_eq!(env.remote.data_puts(), vec!["/mirror/a", "/mirror/b"]);
    assert_eq!(env.local_store().load_local().unwrap(), set_of(&["a"]));
    assert_eq!(env.remote.remote_manifest().unwrap(), set_of(&["a"]));
    assert_eq!(env.remote.with(|s| s.closes), 1);

    env.remote.with(|s| s.fail_put = None);
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.files_uploaded, 2);
    assert_eq!(
        env.remote.data_puts(),
        vec!["/mirror/a", "/mirror/b", "/mirror/b", "/mirror/c"]
    );
    // The partial copy of b was overwritten
    assert_eq!(env.remote.remote_file("/mirror/b").unwrap(), b"bbbb");
    assert_eq!(env.local_store().load_local().unwrap(), set_of(&["a", "b", "c"]));
    assert_eq!(env.remote.remote_manifest().unwrap(), set_of(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_failed_manifest_push_converges_next_cycle() {
    let env = Env::new();
    write_file(env.source.path(), "data.csv", b"1,2");
    env.remote
        .with(|s| s.fail_put = Some("/mirror/.already_uploaded.txt".to_string()));

    let engine = env.engine(&[]);
    let err = engine.run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), "remote");
    assert_eq!(env.remote.data_puts(), vec!["/mirror/data.csv"]);
    assert_eq!(env.local_store().load_local().unwrap(), set_of(&["data.csv"]));
    assert_eq!(env.remote.with(|s| s.closes), 1);

    env.remote.with(|s| s.fail_put = None);
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.files_uploaded, 0);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(env.remote.data_puts(), vec!["/mirror/data.csv"]);
    // The interrupted push may have left a truncated line behind, never a lost entry
    assert!(env.remote.remote_manifest().unwrap().contains("data.csv"));
}

#[tokio::test]
async fn test_carriage_return_in_file_name_uploaded_once() {
    let env = Env::new();
    write_file(env.source.path(), "weird\r", b"w");

    let engine = env.engine(&[]);
    engine.run_cycle().await.unwrap();
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.files_uploaded, 0);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(env.remote.data_puts(), vec!["/mirror/weird\r"]);
    assert_eq!(env.local_store().load_local().unwrap(), set_of(&["weird\r"]));
}

#[tokio::test]
async fn test_remote_manifest_restores_lost_local_manifest() {
    let env = Env::new();
    write_file(env.source.path(), "data.csv", b"1,2");
    write_file(env.source.path(), "fresh.csv", b"3,4");
    env.remote.seed_file("/mirror/data.csv", b"1,2");
    env.remote.seed_file("/mirror/.already_uploaded.txt", b"data.csv\n");

    let report = env.engine(&[]).run_cycle().await.unwrap();

    assert_eq!(report.files_uploaded, 1);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(env.remote.data_puts(), vec!["/mirror/fresh.csv"]);
    assert_eq!(
        env.local_store().load_local().unwrap(),
        set_of(&["data.csv", "fresh.csv"])
    );
}

#[tokio::test]
async fn test_local_manifest_restores_lost_remote_manifest() {
    let env = Env::new();
    write_file(env.source.path(), "data.csv", b"1,2");
    env.local_store().persist_local(&set_of(&["data.csv"])).unwrap();

    let report = env.engine(&[]).run_cycle().await.unwrap();

    assert_eq!(report.files_uploaded, 0);
    assert!(env.remote.data_puts().is_empty());
    assert_eq!(env.remote.remote_manifest().unwrap(), set_of(&["data.csv"]));
}

#[tokio::test]
async fn test_manifests_are_merged_not_replaced() {
    let env = Env::new();
    write_file(env.source.path(), "l.txt", b"l");
    write_file(env.source.path(), "r.txt", b"r");
    env.local_store().persist_local(&set_of(&["l.txt", "gone.txt"])).unwrap();
    env.remote.seed_file("/mirror/.already_uploaded.txt", b"r.txt\n");

    let report = env.engine(&[]).run_cycle().await.unwrap();

    assert_eq!(report.files_uploaded, 0);
    let expected = set_of(&["l.txt", "r.txt", "gone.txt"]);
    assert_eq!(env.local_store().load_local().unwrap(), expected);
    assert_eq!(env.remote.remote_manifest().unwrap(), expected);
}

#[tokio::test]
async fn test_connection_failure_changes_nothing() {
    let env = Env::new();
    write_file(env.source.path(), "a", b"a");
    env.remote.with(|s| s.fail_connect = true);

    let err = env.engine(&[]).run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), "connection");
    assert_eq!(env.remote.with(|s| s.connects), 1);
    assert_eq!(env.remote.total_puts(), 0);
    assert!(!env.state.path().join("already_uploaded.txt").exists());
}

#[tokio::test]
async fn test_remote_manifest_fetch_failure_aborts_cycle() {
    let env = Env::new();
    write_file(env.source.path(), "a", b"a");
    env.remote.seed_file("/mirror/.already_uploaded.txt", b"a\n");
    env.remote.with(|s| s.fail_get = true);

    let err = env.engine(&[]).run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), "remote");
    assert_eq!(env.remote.total_puts(), 0);
    assert_eq!(env.remote.with(|s| s.closes), 1);
}

#[tokio::test]
async fn test_manifest_inside_source_is_not_mirrored() {
    let source = TempDir::new().unwrap();
    let remote = MockConnector::new();
    write_file(source.path(), "a.txt", b"a");

    let engine = SyncEngine::new(
        config(source.path(), source.path(), &[]),
        Arc::new(remote.clone()),
    );
    engine.run_cycle().await.unwrap();
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.files_scanned, 1);
    assert_eq!(remote.data_puts(), vec!["/mirror/a.txt"]);
}
