mod common;

use common::{FakeToolchain, llrs_project, load_config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use webbundle::config::Overrides;
use webbundle::{BuildOutput, Orchestrator, Result};

const CONFIG: &str = "[watch]\ndebounce_ms = 50\n";

#[tokio::test]
async fn test_burst_of_changes_builds_once() {
    let project = llrs_project(CONFIG);
    let config = load_config(project.path(), &Overrides::default());
    let toolchain = Arc::new(FakeToolchain::new());
    let orchestrator = Orchestrator::with_runner(config, toolchain.clone());

    let (tx, rx) = mpsc::unbounded_channel();
    let source = project.path().join("src/lib.rs");
    let sender = async move {
        for _ in 0..20 {
            tx.send(vec![source.clone()]).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    };

    let mut results = Vec::new();
    let watcher = orchestrator.watch_events(rx, |result: &Result<BuildOutput>| {
        results.push(result.is_ok());
    });
    tokio::join!(sender, watcher);

    assert_eq!(toolchain.calls(), 1);
    assert_eq!(results, vec![true]);
    assert!(project.path().join("dist/llrs.js").is_file());
}

#[tokio::test]
async fn test_change_during_build_supersedes_it() {
    let project = llrs_project(CONFIG);
    let config = load_config(project.path(), &Overrides::default());
    let toolchain = Arc::new(FakeToolchain::slow(Duration::from_millis(400)));
    let orchestrator = Orchestrator::with_runner(config, toolchain.clone());

    let (tx, rx) = mpsc::unbounded_channel();
    let source = project.path().join("src/lib.rs");
    let sender = async move {
        tx.send(vec![source.clone()]).unwrap();
        // The first build is inside the toolchain by now
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(vec![source]).unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
    };

    let mut results = Vec::new();
    let watcher = orchestrator.watch_events(rx, |result: &Result<BuildOutput>| {
        results.push(result.is_ok());
    });
    tokio::join!(sender, watcher);

    assert_eq!(toolchain.calls(), 2);
    assert_eq!(results, vec![true]);
}

#[tokio::test]
async fn test_failed_rebuild_is_reported_and_output_kept() {
    let project = llrs_project(CONFIG);
    let config = load_config(project.path(), &Overrides::default());
    let orchestrator = Orchestrator::with_runner(config, Arc::new(FakeToolchain::new()));
    orchestrator.build().await.unwrap();
    let before = common::snapshot(&project.path().join("dist"));

    std::fs::write(project.path().join("style.scss"), "body { color: $nope; }\n").unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(vec![project.path().join("style.scss")]).unwrap();
    drop(tx);

    let mut errors = Vec::new();
    orchestrator
        .watch_events(rx, |result: &Result<BuildOutput>| {
            if let Err(e) = result {
                errors.push(e.to_string());
            }
        })
        .await;

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("style.scss"));
    assert_eq!(common::snapshot(&project.path().join("dist")), before);
}

#[tokio::test]
async fn test_source_write_triggers_one_rebuild() {
    let project = llrs_project(CONFIG);
    let lib = project.path().join("src/lib.rs");
    std::fs::create_dir_all(project.path().join("src")).unwrap();
    std::fs::write(&lib, "pub fn run_app() {}\n").unwrap();

    let config = load_config(project.path(), &Overrides::default());
    let toolchain = Arc::new(FakeToolchain::new());
    let orchestrator = Orchestrator::with_runner(config, toolchain.clone());

    let editor = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(&lib, "pub fn run_app() { web_sys::console::log_1(&\"hi\".into()); }\n")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        orchestrator.stop();
    };

    let mut results = Vec::new();
    let watching = orchestrator.watch(|result: &Result<BuildOutput>| {
        results.push(result.is_ok());
    });
    let ((), watched) = tokio::join!(editor, watching);
    watched.unwrap();

    assert_eq!(toolchain.calls(), 1);
    assert_eq!(results, vec![true]);
    assert!(project.path().join("dist/llrs.js").is_file());
}

#[tokio::test]
async fn test_stop_ends_watch() {
    let project = llrs_project(CONFIG);
    std::fs::create_dir_all(project.path().join("src")).unwrap();
    let config = load_config(project.path(), &Overrides::default());
    let orchestrator = Orchestrator::with_runner(config, Arc::new(FakeToolchain::new()));

    let stopper = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.stop();
    };
    let watching = orchestrator.watch(|_| {});

    let ((), watched) = tokio::join!(stopper, watching);
    watched.unwrap();
}

#[tokio::test]
async fn test_empty_batches_are_ignored() {
    let project = llrs_project(CONFIG);
    let config = load_config(project.path(), &Overrides::default());
    let toolchain = Arc::new(FakeToolchain::new());
    let orchestrator = Orchestrator::with_runner(config, toolchain.clone());

    let (tx, rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();
    tx.send(Vec::new()).unwrap();
    drop(tx);

    orchestrator.watch_events(rx, |_| {}).await;
    assert_eq!(toolchain.calls(), 0);
}
