// src/smoothing.rs - Per-joint pose smoothing across detection gaps
use crate::filter::{Filter2D, FilterKind};
use crate::pose::{BodyPose, JointIndex, JOINT_COUNT};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub joints: Vec<JointIndex>,
    pub filter: FilterKind,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            joints: vec![
                JointIndex::LeftWrist,
                JointIndex::RightWrist,
                JointIndex::LeftElbow,
                JointIndex::RightElbow,
                JointIndex::Chest,
            ],
            filter: FilterKind::default(),
        }
    }
}

struct JointSmoothingState {
    last_valid_position: Vector2<f64>,
    started: bool,
    filter: Box<dyn Filter2D>,
}

/// Smooths a configured subset of joints; everything else passes through.
pub struct BodyPoseSmoother {
    joints: Vec<JointIndex>,
    states: [Option<JointSmoothingState>; JOINT_COUNT],
}

impl BodyPoseSmoother {
    pub fn new(config: &SmoothingConfig) -> Self {
        let mut states: [Option<JointSmoothingState>; JOINT_COUNT] =
            std::array::from_fn(|_| None);
        let mut joints = Vec::with_capacity(config.joints.len());

        for &joint in &config.joints {
            let slot = &mut states[joint.index()];
            if slot.is_some() {
                continue;
            }
            *slot = Some(JointSmoothingState {
                last_valid_position: Vector2::zeros(),
                started: false,
                filter: config.filter.build_2d(),
            });
            joints.push(joint);
        }

        Self { joints, states }
    }

    pub fn joints(&self) -> &[JointIndex] {
        &self.joints
    }

    pub fn is_started(&self, joint: JointIndex) -> bool {
        self.states[joint.index()]
            .as_ref()
            .map(|state| state.started)
            .unwrap_or(false)
    }

    /// Returns a smoothed copy of `pose`.
    ///
    /// Detected joints feed the filter. Undetected joints whose filter has
    /// started are fed the last valid position so the filter keeps settling,
    /// and take the result as coordinates while staying undetected. Joints
    /// that were never detected are left untouched.
    pub fn smooth(&mut self, pose: Option<&BodyPose>, timestamp: f64) -> Option<BodyPose> {
        let mut smoothed = pose?.clone();

        for &joint in &self.joints {
            let Some(state) = self.states[joint.index()].as_mut() else {
                continue;
            };
            let node = smoothed.node_mut(joint);

            let new_position = if node.is_detected {
                let position = state.filter.filter(node.x, node.y, Some(timestamp));
                state.started = true;
                state.last_valid_position = position;
                position
            } else if state.started {
                let last = state.last_valid_position;
                state.filter.filter(last.x, last.y, Some(timestamp))
            } else {
                continue;
            };

            node.x = new_position.x;
            node.y = new_position.y;
        }

        Some(smoothed)
    }
}
