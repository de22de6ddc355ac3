use std::time::Duration;

use mixlane_core::{ExportFormat, MixConfig, MixSession, SurroundMode};

#[test]
fn partial_file_overrides_only_named_keys() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("mixlane.config.toml");
    std::fs::write(
        &path,
        r#"
[audio]
sample_rate = 44100
surround_mode = "7.1"

[monitor]
interval_ms = 33

[export]
default_format = "ogg"
"#,
    )
    .expect("config should be written");

    let config = MixConfig::from_path(&path).expect("config should parse");

    assert_eq!(config.audio.sample_rate, 44_100);
    assert_eq!(config.audio.surround_mode, SurroundMode::Surround71);
    assert_eq!(config.audio.block_frames, 1_024);
    assert_eq!(config.monitor.interval(), Duration::from_millis(33));
    assert_eq!(config.monitor.window_frames, 2_048);
    assert_eq!(config.export.default_format, ExportFormat::Ogg);
    assert_eq!(config.diagnostics.trace_file_prefix, "mixlane");
}

#[test]
fn session_adopts_configured_audio_settings() {
    let config = MixConfig::from_toml_str(
        r#"
[audio]
sample_rate = 32000
surround_mode = "5.1"
"#,
    )
    .expect("config should parse");

    let session = MixSession::new(config);
    let state = session.snapshot();
    assert_eq!(state.sample_rate, 32_000);
    assert_eq!(state.surround_mode, SurroundMode::Surround51);
    assert!(!state.graph_ready);
}

#[test]
fn invalid_files_are_rejected_with_context() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "[audio\nsample_rate = ").expect("config should be written");

    let err = MixConfig::from_path(&path).expect_err("broken TOML should fail");
    assert!(format!("{err:#}").contains("broken.toml"));

    assert!(MixConfig::from_toml_str("[audio]\nsample_rate = 0\n").is_err());
    assert!(MixConfig::from_path(&temp.path().join("missing.toml")).is_err());
}

#[test]
fn export_options_follow_config() {
    let config = MixConfig::from_toml_str(
        r#"
[audio]
block_frames = 256

[export]
progress_every_blocks = 8
"#,
    )
    .expect("config should parse");

    let options = config.export_options();
    assert_eq!(options.block_frames, 256);
    assert_eq!(options.progress_every_blocks, 8);
    assert_eq!(options.sample_rate, Some(48_000));
}
