// src/bin/generate_session.rs - Writes a synthetic pose session for the replay binary
use anyhow::{bail, Context, Result};
use clap::Parser;
use pose_setup::data::write_frames;
use pose_setup::pose::{BodyPose, FrameGeometry, JointIndex, PoseFrame, Rect};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const FRAME_WIDTH: f64 = 1280.0;
const FRAME_HEIGHT: f64 = 720.0;
const PIXELS_PER_INCH: f64 = 6.0;

/// Scripted phases, in seconds since the player's entry.
const ABSENT_UNTIL: f64 = 1.0;
const WALK_IN_UNTIL: f64 = 3.0;
const STAND_UNTIL: f64 = 5.0;
const RAISE_UNTIL: f64 = 8.0;

fn crop() -> Rect {
    Rect::new(320.0, 120.0, 640.0, 480.0)
}

fn player_pose(center_x: f64, raised: bool, t: f64) -> BodyPose {
    // a few pixels of sway so the smoothers have something to do
    let jitter_x = (t * 7.3).sin() * 3.0;
    let jitter_y = (t * 5.1).cos() * 2.0;
    let x = center_x + jitter_x;
    let wrist_y = if raised { 420.0 } else { 200.0 };
    let elbow_y = if raised { 370.0 } else { 250.0 };

    BodyPose::new(PIXELS_PER_INCH)
        .with_joint(JointIndex::Nose, x, 240.0 + jitter_y)
        .with_joint(JointIndex::Chest, x, 360.0 + jitter_y)
        .with_joint(JointIndex::LeftShoulder, x - 60.0, 300.0 + jitter_y)
        .with_joint(JointIndex::RightShoulder, x + 60.0, 300.0 + jitter_y)
        .with_joint(JointIndex::LeftElbow, x - 90.0, elbow_y + jitter_y)
        .with_joint(JointIndex::RightElbow, x + 90.0, elbow_y + jitter_y)
        .with_joint(JointIndex::LeftWrist, x - 100.0, wrist_y + jitter_y)
        .with_joint(JointIndex::RightWrist, x + 100.0, wrist_y + jitter_y)
        .with_joint(JointIndex::LeftHip, x - 40.0, 480.0 + jitter_y)
        .with_joint(JointIndex::RightHip, x + 40.0, 480.0 + jitter_y)
}

/// Pose of `player` at session time `t`, following the scripted phases.
fn scripted_pose(player: usize, num_players: usize, t: f64) -> Option<BodyPose> {
    let local = t - player as f64;
    if local < ABSENT_UNTIL {
        return None;
    }

    let crop = crop();
    let slot_width = crop.width / num_players as f64;
    let center_x = crop.x + slot_width * (player as f64 + 0.5);
    let entry_x = crop.x + slot_width * player as f64;

    let x = if local < WALK_IN_UNTIL {
        let progress = (local - ABSENT_UNTIL) / (WALK_IN_UNTIL - ABSENT_UNTIL);
        entry_x + (center_x - entry_x) * progress
    } else {
        center_x
    };
    let raised = (STAND_UNTIL..RAISE_UNTIL).contains(&local);
    Some(player_pose(x, raised, t))
}

#[derive(Parser, Debug)]
#[command(
    name = "generate_session",
    about = "Writes a synthetic pose session for the replay binary"
)]
struct Args {
    /// Output CSV path
    output: PathBuf,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    players: u64,

    #[arg(long, default_value_t = 12.0)]
    seconds: f64,

    #[arg(long, default_value_t = 30.0)]
    fps: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.fps <= 0.0 || args.seconds <= 0.0 {
        bail!("--seconds and --fps must be positive");
    }
    let num_players = args.players as usize;
    let geometry = FrameGeometry::new(FRAME_WIDTH, FRAME_HEIGHT, crop());
    let frame_count = (args.seconds * args.fps).round() as usize;

    let frames: Vec<PoseFrame> = (0..frame_count)
        .map(|i| {
            let t = i as f64 / args.fps;
            let players = (0..num_players)
                .map(|player| scripted_pose(player, num_players, t))
                .collect();
            PoseFrame::new(t, geometry, players)
        })
        .collect();

    write_frames(&args.output, &frames)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        path = %args.output.display(),
        frames = frames.len(),
        players = num_players,
        "synthetic session written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["generate_session", "out.csv"]).unwrap();
        assert_eq!(args.output, PathBuf::from("out.csv"));
        assert_eq!(args.players, 1);
        assert_eq!(args.seconds, 12.0);
        assert_eq!(args.fps, 30.0);
    }

    #[test]
    fn test_short_help_does_not_name_the_output() {
        let err = Args::try_parse_from(["generate_session", "-h"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_second_output_is_rejected() {
        let err = Args::try_parse_from(["generate_session", "a.csv", "b.csv"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_zero_players_is_rejected() {
        let err =
            Args::try_parse_from(["generate_session", "out.csv", "--players", "0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_players_share_the_crop() {
        let pose = scripted_pose(1, 2, 6.0).unwrap();
        let chest = pose.node(JointIndex::Chest);
        // slot 1 of 2 is centered at 320 + 320 * 1.5
        assert!((chest.x - 800.0).abs() < 4.0, "{}", chest.x);
        assert!(scripted_pose(1, 2, 1.5).is_none());
    }
}
