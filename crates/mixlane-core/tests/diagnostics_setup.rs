use mixlane_core::{MixConfig, init_tracing, init_tracing_from_config};

#[test]
fn tracing_writes_into_the_log_dir_and_tolerates_reinit() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let log_dir = temp.path().join("logs");

    let first = init_tracing(&log_dir).expect("first init should succeed");
    tracing::info!("diagnostics smoke line");

    let mut config = MixConfig::default();
    config.diagnostics.log_dir = temp.path().join("second");
    config.diagnostics.trace_file_prefix = "session-two".to_string();
    let second = init_tracing_from_config(&config.diagnostics)
        .expect("second init only warns about the existing subscriber");

    assert_ne!(first.session_id, second.session_id);
    let log_files: Vec<String> = std::fs::read_dir(&log_dir)
        .expect("log dir should exist")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(
        log_files
            .iter()
            .any(|name| name.starts_with("mixlane-") && name.ends_with(".log")),
        "log files: {log_files:?}"
    );
    assert!(config.diagnostics.log_dir.is_dir());
}
