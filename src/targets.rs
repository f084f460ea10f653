// src/targets.rs - On-screen hand and chest targets for one player
use crate::pose::{BodyPose, FrameGeometry, JointIndex, PoseNode, Rect, Side};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// How far along elbow->wrist the hand sits; 1.0 is the wrist itself.
    pub elbow_wrist_ratio_for_hand: f64,
    pub auto_hide: bool,
    pub auto_hide_waiting_time: f64,
    /// Rectangle the player's slice of the detection frame is mapped onto.
    /// `x`/`y` is its center.
    pub reference: Rect,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            elbow_wrist_ratio_for_hand: 1.3,
            auto_hide: true,
            auto_hide_waiting_time: 0.5,
            reference: Rect::new(0.0, 0.0, 1920.0, 1080.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    LeftHand,
    RightHand,
    Chest,
}

impl TargetKind {
    pub const ALL: [TargetKind; 3] = [
        TargetKind::LeftHand,
        TargetKind::RightHand,
        TargetKind::Chest,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetKind::LeftHand => "left_hand",
            TargetKind::RightHand => "right_hand",
            TargetKind::Chest => "chest",
        }
    }

    fn slot(self) -> usize {
        match self {
            TargetKind::LeftHand => 0,
            TargetKind::RightHand => 1,
            TargetKind::Chest => 2,
        }
    }
}

/// Extrapolates past the wrist along the forearm. Not clamped to the segment.
pub fn hand_position(elbow: Vector2<f64>, wrist: Vector2<f64>, ratio: f64) -> Vector2<f64> {
    elbow + (wrist - elbow) * ratio
}

/// Maps a detection-frame point of `player_index` into `reference`.
///
/// The frame is split into `num_players` equal vertical slices. The slice
/// center lands on the reference center and y is flipped so that larger
/// reference y is higher up.
pub fn detection_to_reference(
    point: Vector2<f64>,
    geometry: &FrameGeometry,
    player_index: usize,
    num_players: usize,
    reference: &Rect,
) -> Vector2<f64> {
    let player_frame_width = geometry.frame_size.x / num_players.max(1) as f64;
    let frame_height = geometry.frame_size.y;
    let center_x = (0.5 + player_index as f64) * player_frame_width;
    let center_y = 0.5 * frame_height;

    let x_rate = (point.x - center_x) / player_frame_width;
    let y_rate = -(point.y - center_y) / frame_height;

    Vector2::new(
        x_rate * reference.width + reference.x,
        y_rate * reference.height + reference.y,
    )
}

/// Hides a target once it has gone undetected for longer than the wait time.
#[derive(Debug, Clone, Default)]
pub struct VisibilityTimer {
    last_detection_time: Option<f64>,
}

impl VisibilityTimer {
    pub fn update(&mut self, detected: bool, timestamp: f64, waiting_time: f64) -> bool {
        if detected {
            self.last_detection_time = Some(timestamp);
            return true;
        }
        match self.last_detection_time {
            Some(last) => timestamp - last < waiting_time,
            None => false,
        }
    }

    pub fn last_detection_time(&self) -> Option<f64> {
        self.last_detection_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetState {
    /// Last mapped position; kept while the target is hidden.
    pub position: Option<Vector2<f64>>,
    pub visible: bool,
}

/// Target positions and visibility for one player, updated once per frame.
#[derive(Debug, Clone)]
pub struct PlayerTargets {
    config: TargetConfig,
    player_index: usize,
    states: [TargetState; 3],
    timers: [VisibilityTimer; 3],
}

impl PlayerTargets {
    pub fn new(config: TargetConfig, player_index: usize) -> Self {
        Self {
            config,
            player_index,
            states: [TargetState::default(); 3],
            timers: Default::default(),
        }
    }

    pub fn player_index(&self) -> usize {
        self.player_index
    }

    pub fn get(&self, kind: TargetKind) -> TargetState {
        self.states[kind.slot()]
    }

    pub fn update(
        &mut self,
        pose: Option<&BodyPose>,
        geometry: &FrameGeometry,
        num_players: usize,
        timestamp: f64,
    ) {
        for kind in TargetKind::ALL {
            let mapped = pose.and_then(|pose| self.locate(kind, pose, geometry, num_players));

            let state = &mut self.states[kind.slot()];
            if let Some(position) = mapped {
                state.position = Some(position);
            }

            let visible = self.timers[kind.slot()].update(
                mapped.is_some(),
                timestamp,
                self.config.auto_hide_waiting_time,
            );
            state.visible = if self.config.auto_hide {
                visible
            } else {
                state.position.is_some()
            };
        }
    }

    fn locate(
        &self,
        kind: TargetKind,
        pose: &BodyPose,
        geometry: &FrameGeometry,
        num_players: usize,
    ) -> Option<Vector2<f64>> {
        let map = |node: &PoseNode| {
            node.detected_position().map(|point| {
                detection_to_reference(
                    point,
                    geometry,
                    self.player_index,
                    num_players,
                    &self.config.reference,
                )
            })
        };

        match kind {
            TargetKind::LeftHand | TargetKind::RightHand => {
                let side = if kind == TargetKind::LeftHand {
                    Side::Left
                } else {
                    Side::Right
                };
                let elbow = map(pose.node(side.elbow()))?;
                let wrist = map(pose.node(side.wrist()))?;
                Some(hand_position(elbow, wrist, self.config.elbow_wrist_ratio_for_hand))
            }
            TargetKind::Chest => map(pose.node(JointIndex::Chest)),
        }
    }
}
