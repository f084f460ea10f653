// src/pipeline.rs - Per-frame processing: smoothing, targets and setup tracking for all players
use crate::config::AppConfig;
use crate::pose::{BodyPose, PoseFrame};
use crate::setup_manager::{DetectionPolicy, PlayerUpdate, SetupStateManager};
use crate::smoothing::BodyPoseSmoother;
use crate::targets::PlayerTargets;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PlayerFrameResult {
    pub player_index: usize,
    pub smoothed_pose: Option<BodyPose>,
}

#[derive(Debug, Clone)]
pub struct FrameResult {
    pub timestamp: f64,
    pub players: Vec<PlayerFrameResult>,
    pub updates: Vec<PlayerUpdate>,
    pub policy: DetectionPolicy,
}

/// Owns every per-player component and runs them over incoming frames.
///
/// Setup tracking sees the raw pose; smoothing only feeds the targets.
pub struct SetupPipeline {
    smoothers: Vec<BodyPoseSmoother>,
    targets: Vec<PlayerTargets>,
    manager: SetupStateManager,
    frames_processed: u64,
}

impl SetupPipeline {
    /// Builds the pipeline with setup tracking enabled.
    pub fn new(config: &AppConfig) -> Self {
        let num_players = config.num_players.max(1);
        let mut manager = SetupStateManager::new(
            num_players,
            config.tracker.clone(),
            config.detector.clone(),
        );
        manager.set_tracking_enabled(true);

        Self {
            smoothers: (0..num_players)
                .map(|_| BodyPoseSmoother::new(&config.smoothing))
                .collect(),
            targets: (0..num_players)
                .map(|player| PlayerTargets::new(config.targets.clone(), player))
                .collect(),
            manager,
            frames_processed: 0,
        }
    }

    pub fn num_players(&self) -> usize {
        self.targets.len()
    }

    pub fn manager(&self) -> &SetupStateManager {
        &self.manager
    }

    pub fn targets(&self, player_index: usize) -> Option<&PlayerTargets> {
        self.targets.get(player_index)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn process_frame(&mut self, frame: &PoseFrame) -> FrameResult {
        self.frames_processed += 1;
        if frame.players.len() > self.num_players() {
            debug!(
                reported = frame.players.len(),
                tracked = self.num_players(),
                "frame reports more players than are tracked"
            );
        }

        let num_players = frame.num_players();
        let players = self
            .smoothers
            .iter_mut()
            .zip(self.targets.iter_mut())
            .enumerate()
            .map(|(player_index, (smoother, targets))| {
                let smoothed_pose =
                    smoother.smooth(frame.player_pose(player_index), frame.timestamp);
                targets.update(
                    smoothed_pose.as_ref(),
                    &frame.geometry,
                    num_players,
                    frame.timestamp,
                );
                PlayerFrameResult {
                    player_index,
                    smoothed_pose,
                }
            })
            .collect();

        let updates = self.manager.process_frame(frame);

        FrameResult {
            timestamp: frame.timestamp,
            players,
            updates,
            policy: self.manager.policy(),
        }
    }
}
