// src/setup_manager.rs - Setup trackers for every player plus the detection policy they imply
use crate::pose::PoseFrame;
use crate::setup_detector::SetupDetectorConfig;
use crate::setup_tracker::{SetupStateTracker, SetupStateType, SetupSummary, SetupTrackerConfig};
use tracing::info;

/// Detection-side switches derived from how many players are in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionPolicy {
    /// Detection viewport frozen instead of following the players.
    pub viewport_locked: bool,
    /// Automatic dewarp tilt correction disabled.
    pub dewarp_locked: bool,
    pub tracking_consistency: bool,
}

impl DetectionPolicy {
    pub fn for_ready_players(ready: usize, num_players: usize) -> Self {
        let any_playing = ready >= 1;
        let all_playing = num_players > 0 && ready == num_players;
        Self {
            viewport_locked: any_playing,
            dewarp_locked: any_playing,
            tracking_consistency: all_playing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerUpdate {
    pub player_index: usize,
    pub summary: SetupSummary,
}

pub struct SetupStateManager {
    num_players: usize,
    tracker_config: SetupTrackerConfig,
    detector_config: SetupDetectorConfig,
    trackers: Vec<SetupStateTracker>,
    player_states: Vec<SetupStateType>,
    policy: DetectionPolicy,
}

impl SetupStateManager {
    /// Creates a manager with tracking disabled.
    pub fn new(
        num_players: usize,
        tracker_config: SetupTrackerConfig,
        detector_config: SetupDetectorConfig,
    ) -> Self {
        Self {
            num_players,
            tracker_config,
            detector_config,
            trackers: Vec::new(),
            player_states: vec![SetupStateType::default(); num_players],
            policy: DetectionPolicy::default(),
        }
    }

    pub fn num_players(&self) -> usize {
        self.num_players
    }

    pub fn is_tracking(&self) -> bool {
        !self.trackers.is_empty()
    }

    pub fn policy(&self) -> DetectionPolicy {
        self.policy
    }

    pub fn player_state(&self, player_index: usize) -> Option<SetupStateType> {
        self.player_states.get(player_index).copied()
    }

    pub fn tracker(&self, player_index: usize) -> Option<&SetupStateTracker> {
        self.trackers.get(player_index)
    }

    pub fn ready_player_count(&self) -> usize {
        self.player_states
            .iter()
            .filter(|state| **state == SetupStateType::Playing)
            .count()
    }

    /// Starts or stops tracking. Stopping reports a dummy summary for every
    /// player that was being tracked.
    pub fn set_tracking_enabled(&mut self, enabled: bool) -> Vec<PlayerUpdate> {
        match (enabled, self.is_tracking()) {
            (true, false) => {
                self.create_trackers();
                Vec::new()
            }
            (false, true) => self.clear_trackers(),
            (true, true) | (false, false) => Vec::new(),
        }
    }

    /// Recreates every tracker from scratch.
    pub fn reset(&mut self) -> Vec<PlayerUpdate> {
        let updates = self.clear_trackers();
        self.create_trackers();
        updates
    }

    /// Feeds `frame` to every player's tracker. Returns nothing while
    /// tracking is disabled.
    pub fn process_frame(&mut self, frame: &PoseFrame) -> Vec<PlayerUpdate> {
        let summaries: Vec<SetupSummary> = self
            .trackers
            .iter_mut()
            .map(|tracker| tracker.process_frame(frame))
            .collect();

        summaries
            .into_iter()
            .enumerate()
            .map(|(player_index, summary)| self.on_tracker_updated(player_index, summary))
            .collect()
    }

    fn create_trackers(&mut self) {
        info!(players = self.num_players, "setup tracking started");
        self.trackers = (0..self.num_players)
            .map(|player_index| {
                SetupStateTracker::new(
                    self.tracker_config.clone(),
                    self.detector_config.clone(),
                    player_index,
                )
            })
            .collect();
    }

    fn clear_trackers(&mut self) -> Vec<PlayerUpdate> {
        let tracked = self.trackers.len();
        self.trackers.clear();
        if tracked > 0 {
            info!(players = tracked, "setup tracking stopped");
        }
        (0..tracked)
            .map(|player_index| self.on_tracker_updated(player_index, SetupSummary::dummy()))
            .collect()
    }

    fn on_tracker_updated(&mut self, player_index: usize, summary: SetupSummary) -> PlayerUpdate {
        if let Some(state) = self.player_states.get_mut(player_index) {
            if *state != summary.state {
                *state = summary.state;
                self.reconfigure_detection();
            }
        }
        PlayerUpdate {
            player_index,
            summary,
        }
    }

    fn reconfigure_detection(&mut self) {
        let next = DetectionPolicy::for_ready_players(self.ready_player_count(), self.num_players);
        let previous = self.policy;

        if previous.viewport_locked != next.viewport_locked {
            info!(locked = next.viewport_locked, "detection viewport lock changed");
        }
        if previous.dewarp_locked != next.dewarp_locked {
            info!(locked = next.dewarp_locked, "dewarp lock changed");
        }
        if previous.tracking_consistency != next.tracking_consistency {
            info!(enabled = next.tracking_consistency, "tracking consistency changed");
        }
        self.policy = next;
    }
}
