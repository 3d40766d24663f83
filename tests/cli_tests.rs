//! Integration tests for the songplay-etl command handlers

#![cfg(all(feature = "cli", feature = "duckdb-backend"))]

use songplay_warehouse::cli::commands::etl::{EtlAction, EtlArgs, handle_etl};
use songplay_warehouse::cli::error::CliError;
use songplay_warehouse::config::EtlConfig;
use songplay_warehouse::warehouse::{DuckDbWarehouse, Warehouse};
use std::io::Write;
use tempfile::TempDir;

fn write_config(dir: &TempDir, song_data: &std::path::Path) -> std::path::PathBuf {
    let mut config = EtlConfig::duckdb(dir.path().join("sparkify.duckdb").display().to_string());
    config.staging.song_data = Some(song_data.display().to_string());
    config.logging.directory = dir.path().join("logs");

    let path = dir.path().join("dwh.toml");
    config.save(&path).unwrap();
    path
}

#[test]
fn test_cli_reset_run_and_dedup() {
    let dir = TempDir::new().unwrap();
    let song_data = dir.path().join("songs.json");
    let mut songs = std::fs::File::create(&song_data).unwrap();
    writeln!(
        songs,
        r#"{{"num_songs": 1, "artist_id": "A1", "artist_name": "Thundercat", "song_id": "S1", "title": "Fair Chance", "duration": 237.0, "year": 2020}}"#
    )
    .unwrap();
    drop(songs);

    let config_path = write_config(&dir, &song_data);
    let args = |action| EtlArgs {
        config: Some(config_path.clone()),
        action,
    };

    handle_etl(&args(EtlAction::ResetSchema)).unwrap();
    handle_etl(&args(EtlAction::Run)).unwrap();
    handle_etl(&args(EtlAction::Run)).unwrap();
    handle_etl(&args(EtlAction::Dedup)).unwrap();

    assert!(dir.path().join("logs").read_dir().unwrap().next().is_some());

    let rt = tokio::runtime::Runtime::new().unwrap();
    let warehouse = DuckDbWarehouse::new(dir.path().join("sparkify.duckdb")).unwrap();
    let songs = rt
        .block_on(warehouse.query("SELECT COUNT(*) AS n FROM songs"))
        .unwrap();
    assert_eq!(songs.scalar_i64(), Some(1));
}

#[test]
fn test_cli_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dwh.toml");
    std::fs::write(&path, "[warehouse]\nbackend = \"postgres\"\n").unwrap();

    let result = handle_etl(&EtlArgs {
        config: Some(path.clone()),
        action: EtlAction::Run,
    });
    match result {
        Err(CliError::ConfigError(config_path, message)) => {
            assert_eq!(config_path, path);
            assert!(message.contains("host"));
        }
        other => panic!("expected a configuration error, got {:?}", other),
    }
}
