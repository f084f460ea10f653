// src/main.rs - Replays a recorded pose session through setup tracking and exports the results
use anyhow::{Context, Result};
use clap::Parser;
use pose_setup::config::AppConfig;
use pose_setup::data::{load_frames, SessionExporter};
use pose_setup::pipeline::SetupPipeline;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pose_setup",
    about = "Replays a recorded pose session through setup tracking"
)]
struct Args {
    /// Pose replay CSV, as written by generate_session
    input: PathBuf,

    /// JSON config; without one the player count comes from the input
    #[arg(long)]
    config: Option<PathBuf>,

    /// Export directory, overrides the config
    #[arg(long)]
    output: Option<PathBuf>,

    /// Session name used for the export folder
    #[arg(long)]
    session: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let frames = load_frames(&args.input)
        .with_context(|| format!("loading frames from {}", args.input.display()))?;
    let reported_players = frames.iter().map(|frame| frame.num_players()).max().unwrap_or(1);

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig {
            num_players: reported_players,
            ..AppConfig::default()
        },
    };
    if let Some(output) = args.output {
        config.output_directory = Some(output);
    }
    if reported_players > config.num_players {
        warn!(
            reported = reported_players,
            configured = config.num_players,
            "input has more players than configured; extra players are ignored"
        );
    }

    info!(
        input = %args.input.display(),
        frames = frames.len(),
        players = config.num_players,
        "replaying session"
    );

    let mut pipeline = SetupPipeline::new(&config);
    let mut exporter = SessionExporter::new(config.output_dir(), args.session);

    for frame in &frames {
        let result = pipeline.process_frame(frame);
        exporter.begin_frame(result.timestamp);
        for update in &result.updates {
            if let Some(targets) = pipeline.targets(update.player_index) {
                exporter.add_player(update.player_index, update.summary, targets);
            }
        }
    }

    info!(frames = pipeline.frames_processed(), "replay finished");

    let csv_path = exporter.export_csv().context("exporting session csv")?;
    let report_path = exporter.generate_report().context("writing session report")?;

    let manager = pipeline.manager();
    for player in 0..manager.num_players() {
        if let Some(state) = manager.player_state(player) {
            println!("Player {}: {}", player, state.name());
        }
    }
    println!(
        "Ready players: {}/{}",
        manager.ready_player_count(),
        manager.num_players()
    );
    println!("Session data: {}", csv_path.display());
    println!("Report: {}", report_path.display());

    Ok(())
}
