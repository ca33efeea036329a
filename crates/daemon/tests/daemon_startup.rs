use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;

/// Config pointing every database and the batch directory into `dir`.
fn single_sweep_config(dir: &Path) -> String {
    format!(
        r#"
[database]
catalog_path = "{dir}/catalog.db"
video_registry_path = "{dir}/video-imports.db"
music_registry_path = "{dir}/music-imports.db"

[sync]
enabled = false
batches_dir = "{dir}/batches"

[[sources]]
identifier = "upnp://nas"
friendly_name = "NAS"
media_types = ["movie", "set"]

[[imports]]
source = "upnp://nas"
path = "/movies"
media_types = ["movie", "set"]
"#,
        dir = dir.display()
    )
}

fn write_movie_batch(dir: &Path) {
    let batch_dir = dir.join("batches").join("upnp___nas");
    std::fs::create_dir_all(&batch_dir).unwrap();
    let batch = serde_json::json!([
        {"media_type": "movie", "title": "Heat", "year": 1995, "file_path": "smb://nas/heat.mkv"},
        {"media_type": "movie", "title": "Ronin", "year": 1998, "file_path": "smb://nas/ronin.mkv"}
    ]);
    std::fs::write(batch_dir.join("movie.json"), batch.to_string()).unwrap();
}

async fn run_daemon(config_path: &Path, metrics_path: &Path) -> std::process::Output {
    let child = tokio::process::Command::new(env!("CARGO_BIN_EXE_mediaimportd"))
        .env("MEDIAIMPORT_CONFIG", config_path)
        .env("MEDIAIMPORT_METRICS_FILE", metrics_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .output();

    timeout(Duration::from_secs(30), child)
        .await
        .expect("Daemon did not exit")
        .expect("Failed to run daemon")
}

#[tokio::test]
async fn test_single_sweep_imports_batch() {
    let dir = TempDir::new().unwrap();
    write_movie_batch(dir.path());
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, single_sweep_config(dir.path())).unwrap();
    let metrics_path = dir.path().join("mediaimport.prom");

    let output = run_daemon(&config_path, &metrics_path).await;
    assert!(
        output.status.success(),
        "daemon failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(dir.path().join("catalog.db").exists());
    assert!(dir.path().join("video-imports.db").exists());

    let metrics = std::fs::read_to_string(&metrics_path).unwrap();
    assert!(metrics.contains(r#"mediaimport_sync_passes_total{result="success"} 1"#));
    assert!(metrics.contains(r#"mediaimport_items_retrieved_total{media_type="movie"} 2"#));
    assert!(metrics.contains(r#"mediaimport_registered_imports{domain="video"} 1"#));
}

#[tokio::test]
async fn test_second_run_keeps_registry() {
    let dir = TempDir::new().unwrap();
    write_movie_batch(dir.path());
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, single_sweep_config(dir.path())).unwrap();
    let metrics_path = dir.path().join("mediaimport.prom");

    assert!(run_daemon(&config_path, &metrics_path).await.status.success());
    assert!(run_daemon(&config_path, &metrics_path).await.status.success());

    // The seeded import is registered once however often the daemon starts
    let metrics = std::fs::read_to_string(&metrics_path).unwrap();
    assert!(metrics.contains(r#"mediaimport_registered_imports{domain="video"} 1"#));
    assert!(metrics.contains(r#"mediaimport_registered_sources{domain="video"} 1"#));
}

#[tokio::test]
async fn test_invalid_config_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
[sync]
interval_secs = 0
"#,
    )
    .unwrap();

    let output = run_daemon(&config_path, &dir.path().join("mediaimport.prom")).await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_missing_config_exits_with_error() {
    let dir = TempDir::new().unwrap();

    let output = run_daemon(
        &dir.path().join("missing.toml"),
        &dir.path().join("mediaimport.prom"),
    )
    .await;
    assert!(!output.status.success());
}
