#![cfg(unix)]

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use sigmux_frame::Dtype;
use sigmux_repo::{
    ReadOptions, RecordingOptions, Repository, SampleBatch, SignalOptions,
};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/sigmuxcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[test]
fn check_prints_parsed_definitions_as_json() {
    let output = Command::new(env!("CARGO_BIN_EXE_sigmux"))
        .args([
            "--format",
            "json",
            "check",
            r#"stream <rec1> "/tmp/p1" rate=100 (sig:<a> sig:<b>)"#,
        ])
        .output()
        .expect("check command should run");

    assert!(output.status.success(), "check should exit 0");
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(stdout.contains("\"kind\": \"stream\""));
    assert!(stdout.contains("\"pipe\": \"/tmp/p1\""));
    assert!(stdout.contains("\"rate\": 100"));
}

#[test]
fn syntax_errors_exit_with_usage_code() {
    let output = Command::new(env!("CARGO_BIN_EXE_sigmux"))
        .args(["check", "pipeline <rec1> \"/tmp/p1\" (sig:<a>)"])
        .output()
        .expect("check command should run");

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf-8");
    assert!(stderr.contains("syntax error"));
}

#[test]
fn run_streams_between_file_recordings() {
    let dir = unique_temp_dir("run");
    let repo_root = dir.join("repo");
    let pipe = dir.join("data.pipe");

    // Seed a source recording with one exactly-representable ramp.
    let repo = sigmux_repo::FsRepository::open(&repo_root).expect("repo should open");
    let mut store = repo
        .create_recording("rec1", &RecordingOptions::default())
        .expect("source recording should be created");
    let mut sink = store
        .new_signal(
            "rec1/a",
            Some("mV"),
            &SignalOptions {
                rate: Some(100.0),
                ..SignalOptions::default()
            },
        )
        .expect("source signal should be created");
    let values: Vec<f64> = (0..200).map(|i| f64::from(i) / 2.0).collect();
    sink.append(&values, Dtype::F4).expect("seed should append");
    store.finalize(2.0).expect("seed should finalize");
    drop(sink);

    let definitions = format!(
        r#"
        stream <rec1> "{pipe}" rate=100 (sig:<a>)
        recording <rec2> "{pipe}" rate=100 (sig:<c>)
        "#,
        pipe = pipe.display()
    );

    let output = Command::new(env!("CARGO_BIN_EXE_sigmux"))
        .args(["--log-level", "error", "run", "--repo"])
        .arg(&repo_root)
        .arg(&definitions)
        .output()
        .expect("run command should run");
    assert!(
        output.status.success(),
        "pipeline should exit 0, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // The destination recording holds the streamed samples.
    let repo: Arc<dyn Repository> =
        Arc::new(sigmux_repo::FsRepository::open(&repo_root).expect("repo should reopen"));
    let info = repo
        .resolve_recording("rec2")
        .expect("destination recording should exist");
    assert_eq!(info.signals.len(), 1);
    assert_eq!(info.signals[0].uri, "rec2/c");

    let mut source = repo
        .open_signal("rec2/c", ReadOptions::default())
        .expect("destination signal should open");
    let mut collected = Vec::new();
    while let Some(batch) = source.next_batch().expect("batch should read") {
        let SampleBatch::Uniform {
            values: mut batch, ..
        } = batch
        else {
            panic!("expected uniform data");
        };
        collected.append(&mut batch);
    }
    assert_eq!(collected, values);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn no_stream_run_validates_without_writing() {
    let dir = unique_temp_dir("nostream");
    let repo_root = dir.join("repo");
    let pipe = dir.join("dry.pipe");

    let repo = sigmux_repo::FsRepository::open(&repo_root).expect("repo should open");
    let mut store = repo
        .create_recording("rec1", &RecordingOptions::default())
        .expect("source recording should be created");
    let mut sink = store
        .new_signal(
            "rec1/a",
            None,
            &SignalOptions {
                rate: Some(10.0),
                ..SignalOptions::default()
            },
        )
        .expect("source signal should be created");
    sink.append(&[1.0, 2.0], Dtype::F4).expect("seed should append");
    store.finalize(0.2).expect("seed should finalize");

    let definitions = format!(
        r#"
        stream <rec1> "{pipe}" rate=10 (sig:<a>)
        recording <rec2> "{pipe}" rate=10 (sig:<c>)
        "#,
        pipe = pipe.display()
    );

    let output = Command::new(env!("CARGO_BIN_EXE_sigmux"))
        .args(["--log-level", "error", "run", "--no-stream", "--repo"])
        .arg(&repo_root)
        .arg(&definitions)
        .output()
        .expect("run command should run");
    assert!(
        output.status.success(),
        "dry run should exit 0, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(pipe.exists(), "dry run should still create the pipe");
    assert!(
        repo.resolve_recording("rec2").is_err(),
        "dry run must not create the destination recording"
    );

    let _ = std::fs::remove_dir_all(&dir);
}
