// src/pose.rs - Per-frame pose input from the detection collaborator
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

pub const JOINT_COUNT: usize = 10;

/// Tracked body joints. The discriminant is the slot in [`BodyPose::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointIndex {
    Nose = 0,
    Chest = 1,
    LeftShoulder = 2,
    RightShoulder = 3,
    LeftElbow = 4,
    RightElbow = 5,
    LeftWrist = 6,
    RightWrist = 7,
    LeftHip = 8,
    RightHip = 9,
}

impl JointIndex {
    pub const ALL: [JointIndex; JOINT_COUNT] = [
        JointIndex::Nose,
        JointIndex::Chest,
        JointIndex::LeftShoulder,
        JointIndex::RightShoulder,
        JointIndex::LeftElbow,
        JointIndex::RightElbow,
        JointIndex::LeftWrist,
        JointIndex::RightWrist,
        JointIndex::LeftHip,
        JointIndex::RightHip,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            JointIndex::Nose => "nose",
            JointIndex::Chest => "chest",
            JointIndex::LeftShoulder => "left_shoulder",
            JointIndex::RightShoulder => "right_shoulder",
            JointIndex::LeftElbow => "left_elbow",
            JointIndex::RightElbow => "right_elbow",
            JointIndex::LeftWrist => "left_wrist",
            JointIndex::RightWrist => "right_wrist",
            JointIndex::LeftHip => "left_hip",
            JointIndex::RightHip => "right_hip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn shoulder(self) -> JointIndex {
        match self {
            Side::Left => JointIndex::LeftShoulder,
            Side::Right => JointIndex::RightShoulder,
        }
    }

    pub fn elbow(self) -> JointIndex {
        match self {
            Side::Left => JointIndex::LeftElbow,
            Side::Right => JointIndex::RightElbow,
        }
    }

    pub fn wrist(self) -> JointIndex {
        match self {
            Side::Left => JointIndex::LeftWrist,
            Side::Right => JointIndex::RightWrist,
        }
    }
}

/// One joint reading in frame pixels.
///
/// Coordinates of an undetected node are meaningless unless smoothing has
/// carried a last valid position into them; `is_detected` is never changed
/// by smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseNode {
    pub x: f64,
    pub y: f64,
    pub is_detected: bool,
}

impl PoseNode {
    pub fn detected(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            is_detected: true,
        }
    }

    pub fn not_detected() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn detected_position(&self) -> Option<Vector2<f64>> {
        self.is_detected.then(|| self.position())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyPose {
    pub nodes: [PoseNode; JOINT_COUNT],
    pub pixels_per_inch: f64,
}

impl BodyPose {
    pub fn new(pixels_per_inch: f64) -> Self {
        Self {
            nodes: [PoseNode::not_detected(); JOINT_COUNT],
            pixels_per_inch,
        }
    }

    pub fn with_joint(mut self, joint: JointIndex, x: f64, y: f64) -> Self {
        self.nodes[joint.index()] = PoseNode::detected(x, y);
        self
    }

    pub fn node(&self, joint: JointIndex) -> &PoseNode {
        &self.nodes[joint.index()]
    }

    pub fn node_mut(&mut self, joint: JointIndex) -> &mut PoseNode {
        &mut self.nodes[joint.index()]
    }

    pub fn chest(&self) -> &PoseNode {
        self.node(JointIndex::Chest)
    }

    /// A wrist counts as raised when it and its shoulder are detected and the
    /// wrist's y is greater than the shoulder's.
    pub fn is_raising_hand(&self, side: Side) -> bool {
        let wrist = self.node(side.wrist());
        let shoulder = self.node(side.shoulder());
        if !wrist.is_detected || !shoulder.is_detected {
            return false;
        }
        wrist.y > shoulder.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Raw frame size plus the crop the tracker actually processes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub frame_size: Vector2<f64>,
    pub process_frame_crop: Rect,
}

impl FrameGeometry {
    pub fn new(width: f64, height: f64, process_frame_crop: Rect) -> Self {
        Self {
            frame_size: Vector2::new(width, height),
            process_frame_crop,
        }
    }

    /// Geometry whose process crop is the whole frame.
    pub fn uncropped(width: f64, height: f64) -> Self {
        Self::new(width, height, Rect::new(0.0, 0.0, width, height))
    }
}

/// Everything the detection collaborator reports for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    pub timestamp: f64,
    pub geometry: FrameGeometry,
    /// One slot per player; `None` when no pose was found for that player.
    pub players: Vec<Option<BodyPose>>,
}

impl PoseFrame {
    pub fn new(timestamp: f64, geometry: FrameGeometry, players: Vec<Option<BodyPose>>) -> Self {
        Self {
            timestamp,
            geometry,
            players,
        }
    }

    pub fn num_players(&self) -> usize {
        self.players.len().max(1)
    }

    pub fn player_pose(&self, player_index: usize) -> Option<&BodyPose> {
        self.players.get(player_index).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_slots_match_all_order() {
        for (i, joint) in JointIndex::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
        }
    }

    #[test]
    fn test_raising_hand_requires_both_nodes() {
        let pose = BodyPose::new(5.0)
            .with_joint(JointIndex::LeftShoulder, 100.0, 300.0)
            .with_joint(JointIndex::LeftWrist, 100.0, 420.0)
            .with_joint(JointIndex::RightWrist, 200.0, 500.0);

        assert!(pose.is_raising_hand(Side::Left));
        // right shoulder missing
        assert!(!pose.is_raising_hand(Side::Right));
    }

    #[test]
    fn test_raising_hand_compares_y() {
        let pose = BodyPose::new(5.0)
            .with_joint(JointIndex::RightShoulder, 0.0, 300.0)
            .with_joint(JointIndex::RightWrist, 0.0, 300.0);
        assert!(!pose.is_raising_hand(Side::Right));
    }

    #[test]
    fn test_missing_player_slot() {
        let frame = PoseFrame::new(0.0, FrameGeometry::uncropped(640.0, 480.0), vec![None]);
        assert!(frame.player_pose(0).is_none());
        assert!(frame.player_pose(3).is_none());
        assert_eq!(frame.num_players(), 1);
    }
}
