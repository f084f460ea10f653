// src/error.rs - Error types for the file boundaries
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    #[error("{path} contains no frames")]
    Empty { path: PathBuf },
    #[error(
        "Row {row} in {path} has player index {player} but the frame has {num_players} players"
    )]
    PlayerOutOfRange {
        path: PathBuf,
        row: usize,
        player: usize,
        num_players: usize,
    },
    #[error("Row {row} in {path} has a pose but no positive pixels_per_inch")]
    MissingPixelsPerInch { path: PathBuf, row: usize },
}
