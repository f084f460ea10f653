// src/setup_detector.rs - Per-frame positioning issues with strict/loose hysteresis
use crate::history::TimeWindowedHistory;
use crate::pose::{BodyPose, FrameGeometry, PoseFrame};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupIssueType {
    None = 0,
    NoPose = 1,
    ChestTooHigh = 2,
    ChestTooLow = 3,
    ChestTooLeft = 4,
    ChestTooRight = 5,
    TooFar = 6,
    TooClose = 7,
    TooFarInProcessFrame = 8,
    TooCloseInProcessFrame = 9,
    NotAtCenter = 10,
}

const ISSUE_SLOTS: usize = 11;

impl SetupIssueType {
    pub fn name(self) -> &'static str {
        match self {
            SetupIssueType::None => "none",
            SetupIssueType::NoPose => "no_pose",
            SetupIssueType::ChestTooHigh => "chest_too_high",
            SetupIssueType::ChestTooLow => "chest_too_low",
            SetupIssueType::ChestTooLeft => "chest_too_left",
            SetupIssueType::ChestTooRight => "chest_too_right",
            SetupIssueType::TooFar => "too_far",
            SetupIssueType::TooClose => "too_close",
            SetupIssueType::TooFarInProcessFrame => "too_far_in_process_frame",
            SetupIssueType::TooCloseInProcessFrame => "too_close_in_process_frame",
            SetupIssueType::NotAtCenter => "not_at_center",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }

    pub fn default_priority() -> Vec<SetupIssueType> {
        vec![
            SetupIssueType::TooClose,
            SetupIssueType::TooFar,
            SetupIssueType::TooCloseInProcessFrame,
            SetupIssueType::TooFarInProcessFrame,
            SetupIssueType::ChestTooHigh,
            SetupIssueType::ChestTooLow,
            SetupIssueType::ChestTooLeft,
            SetupIssueType::ChestTooRight,
            SetupIssueType::NoPose,
            SetupIssueType::NotAtCenter,
        ]
    }
}

/// One frame's reading for one issue type.
///
/// The loose condition sits inside the strict one: it trips earlier and
/// clears later. `has_data == false` frames are ignored by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IssueInfo {
    pub has_data: bool,
    pub has_issue_under_strict_condition: bool,
    pub has_issue_under_loose_condition: bool,
}

impl IssueInfo {
    fn measured(strict: bool, loose: bool) -> Self {
        Self {
            has_data: true,
            has_issue_under_strict_condition: strict,
            has_issue_under_loose_condition: loose,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupCenterStrategy {
    DisplayFrame,
    ProcessFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupDetection {
    pub has_enough_data: bool,
    pub current_issue: SetupIssueType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupDetectorConfig {
    pub chest_strict_loose_half_margin_inches: f64,
    pub chest_to_top_min_inches: f64,
    pub chest_to_bottom_min_inches: f64,
    pub chest_to_left_min_inches: f64,
    pub chest_to_right_min_inches: f64,
    pub chest_x_to_center_max_inches: f64,

    pub issue_evaluation_time_window: f64,
    pub issue_min_required_data_time: f64,
    pub issue_entry_state_ratio: f64,
    pub issue_cancel_state_ratio: f64,

    pub distance_ratio_strict_loose_half_margin: f64,
    pub frame_height_min_inches: f64,
    pub frame_height_max_inches: f64,
    pub process_frame_height_min_inches: f64,
    pub process_frame_height_max_inches: f64,

    pub center_strategy: SetupCenterStrategy,
    /// Tracked issues, most important first.
    pub issue_priority: Vec<SetupIssueType>,
}

impl Default for SetupDetectorConfig {
    fn default() -> Self {
        Self {
            chest_strict_loose_half_margin_inches: 1.0,
            chest_to_top_min_inches: 12.0,
            chest_to_bottom_min_inches: 18.0,
            chest_to_left_min_inches: 12.0,
            chest_to_right_min_inches: 12.0,
            chest_x_to_center_max_inches: 10.0,
            issue_evaluation_time_window: 0.5,
            issue_min_required_data_time: 0.2,
            issue_entry_state_ratio: 0.8,
            issue_cancel_state_ratio: 0.4,
            distance_ratio_strict_loose_half_margin: 0.03,
            frame_height_min_inches: 40.0,
            frame_height_max_inches: 240.0,
            process_frame_height_min_inches: 40.0,
            process_frame_height_max_inches: 100.0,
            center_strategy: SetupCenterStrategy::ProcessFrame,
            issue_priority: SetupIssueType::default_priority(),
        }
    }
}

/// Readings for every issue slot in one frame, indexed by issue ordinal.
pub type IssueReadings = [IssueInfo; ISSUE_SLOTS];

pub fn reading(readings: &IssueReadings, issue: SetupIssueType) -> IssueInfo {
    readings[issue.slot()]
}

/// Linear map of a frame height in inches onto `[min, max] -> [0, 1]`.
pub fn distance_ratio(frame_height_pixels: f64, ppi: f64, min_inches: f64, max_inches: f64) -> f64 {
    let height_inches = frame_height_pixels / ppi;
    (height_inches - min_inches) / (max_inches - min_inches)
}

/// Strict and loose readings for the "too close" / "too far" pair.
fn distance_infos(ratio: f64, half_margin: f64) -> (IssueInfo, IssueInfo) {
    let too_close = IssueInfo::measured(ratio < -half_margin, ratio < half_margin);
    let too_far = IssueInfo::measured(ratio > 1.0 + half_margin, ratio > 1.0 - half_margin);
    (too_close, too_far)
}

/// Classifies one frame for `player_index`.
pub fn classify(
    config: &SetupDetectorConfig,
    pose: Option<&BodyPose>,
    geometry: &FrameGeometry,
    player_index: usize,
    num_players: usize,
) -> IssueReadings {
    let mut readings = [IssueInfo::default(); ISSUE_SLOTS];

    let Some(pose) = pose else {
        readings[SetupIssueType::NoPose.slot()] = IssueInfo::measured(true, true);
        return readings;
    };
    readings[SetupIssueType::NoPose.slot()] = IssueInfo::measured(false, false);

    let ppi = pose.pixels_per_inch;
    let frame_size = geometry.frame_size;
    let crop = geometry.process_frame_crop;
    let half_margin = config.distance_ratio_strict_loose_half_margin;

    // Raw frame distance
    let ratio = distance_ratio(
        frame_size.y,
        ppi,
        config.frame_height_min_inches,
        config.frame_height_max_inches,
    );
    let (too_close, too_far) = distance_infos(ratio, half_margin);
    readings[SetupIssueType::TooClose.slot()] = too_close;
    readings[SetupIssueType::TooFar.slot()] = too_far;

    // Process frame distance
    let ratio = distance_ratio(
        crop.height,
        ppi,
        config.process_frame_height_min_inches,
        config.process_frame_height_max_inches,
    );
    let (too_close, too_far) = distance_infos(ratio, half_margin);
    readings[SetupIssueType::TooCloseInProcessFrame.slot()] = too_close;
    readings[SetupIssueType::TooFarInProcessFrame.slot()] = too_far;

    // Chest position. An undetected chest leaves these without data.
    let Some(chest) = pose.chest().detected_position() else {
        return readings;
    };

    let safe_x1 = ppi * config.chest_to_left_min_inches;
    let safe_x2 = frame_size.x - ppi * config.chest_to_right_min_inches;
    let safe_y1 = ppi * config.chest_to_top_min_inches;
    let safe_y2 = frame_size.y - ppi * config.chest_to_bottom_min_inches;

    let slot = (player_index as f64 + 0.5) / num_players.max(1) as f64;
    let player_center_x = match config.center_strategy {
        SetupCenterStrategy::DisplayFrame => frame_size.x * slot,
        SetupCenterStrategy::ProcessFrame => crop.x + crop.width * slot,
    };

    let margin = config.chest_strict_loose_half_margin_inches * ppi;
    let safe_max_x_distance = ppi * config.chest_x_to_center_max_inches;
    let to_center_x = (chest.x - player_center_x).abs();

    readings[SetupIssueType::ChestTooHigh.slot()] =
        IssueInfo::measured(chest.y < safe_y1 - margin, chest.y < safe_y1 + margin);
    readings[SetupIssueType::ChestTooLow.slot()] =
        IssueInfo::measured(chest.y > safe_y2 + margin, chest.y > safe_y2 - margin);
    readings[SetupIssueType::ChestTooLeft.slot()] =
        IssueInfo::measured(chest.x < safe_x1 - margin, chest.x < safe_x1 + margin);
    readings[SetupIssueType::ChestTooRight.slot()] =
        IssueInfo::measured(chest.x > safe_x2 + margin, chest.x > safe_x2 - margin);
    readings[SetupIssueType::NotAtCenter.slot()] = IssueInfo::measured(
        to_center_x > safe_max_x_distance + margin,
        to_center_x > safe_max_x_distance - margin,
    );

    readings
}

/// Decides the activation flag of one issue from its recent history.
///
/// Each sample is weighted by the time until the next sample. Only samples
/// with data count. When active, the opposite state is "not even loose";
/// when inactive it is "strict". The flag flips once the opposite state
/// covers more than the cancel (active) or entry (inactive) ratio of the
/// data time. With too little data time the issue is dropped.
pub fn next_activation(
    is_active: bool,
    history: &TimeWindowedHistory<IssueInfo>,
    config: &SetupDetectorConfig,
) -> bool {
    let mut opposite_time = 0.0;
    let mut data_time = 0.0;

    let samples: Vec<_> = history.iter().collect();
    for pair in samples.windows(2) {
        let (sample, next) = (pair[0], pair[1]);
        if !sample.value.has_data {
            continue;
        }
        let interval = (next.timestamp - sample.timestamp).abs();
        let is_opposite = if is_active {
            !sample.value.has_issue_under_loose_condition
        } else {
            sample.value.has_issue_under_strict_condition
        };
        if is_opposite {
            opposite_time += interval;
        }
        data_time += interval;
    }

    if data_time < config.issue_min_required_data_time {
        return false;
    }

    let change_ratio = if is_active {
        config.issue_cancel_state_ratio
    } else {
        config.issue_entry_state_ratio
    };
    if opposite_time > data_time * change_ratio {
        !is_active
    } else {
        is_active
    }
}

struct IssueState {
    active: bool,
    latest: IssueInfo,
    history: TimeWindowedHistory<IssueInfo>,
}

pub struct SetupDetector {
    config: SetupDetectorConfig,
    player_index: usize,
    issues: [IssueState; ISSUE_SLOTS],
    start_detection_time: Option<f64>,
    has_enough_data: bool,
    current_issue: SetupIssueType,
}

impl SetupDetector {
    pub fn new(config: SetupDetectorConfig, player_index: usize) -> Self {
        let window = config.issue_evaluation_time_window;
        Self {
            issues: std::array::from_fn(|_| IssueState {
                active: false,
                latest: IssueInfo::default(),
                history: TimeWindowedHistory::new(window),
            }),
            config,
            player_index,
            start_detection_time: None,
            has_enough_data: false,
            current_issue: SetupIssueType::None,
        }
    }

    pub fn config(&self) -> &SetupDetectorConfig {
        &self.config
    }

    pub fn player_index(&self) -> usize {
        self.player_index
    }

    pub fn chest_x_to_center_max_inches(&self) -> f64 {
        self.config.chest_x_to_center_max_inches
    }

    pub fn set_chest_x_to_center_max_inches(&mut self, inches: f64) {
        self.config.chest_x_to_center_max_inches = inches;
    }

    pub fn is_issue_active(&self, issue: SetupIssueType) -> bool {
        self.issues[issue.slot()].active
    }

    pub fn latest_info(&self, issue: SetupIssueType) -> IssueInfo {
        self.issues[issue.slot()].latest
    }

    pub fn current_issue(&self) -> SetupIssueType {
        self.current_issue
    }

    pub fn has_enough_data(&self) -> bool {
        self.has_enough_data
    }

    pub fn process_frame(&mut self, frame: &PoseFrame) -> SetupDetection {
        self.process(
            frame.player_pose(self.player_index),
            &frame.geometry,
            frame.num_players(),
            frame.timestamp,
        )
    }

    /// Record one frame, update the activation flags and report the
    /// highest-priority active issue.
    pub fn process(
        &mut self,
        pose: Option<&BodyPose>,
        geometry: &FrameGeometry,
        num_players: usize,
        timestamp: f64,
    ) -> SetupDetection {
        let start = *self.start_detection_time.get_or_insert(timestamp);
        self.has_enough_data = timestamp - start > self.config.issue_evaluation_time_window;

        let readings = classify(&self.config, pose, geometry, self.player_index, num_players);
        for &issue in &self.config.issue_priority {
            let state = &mut self.issues[issue.slot()];
            state.latest = readings[issue.slot()];
            state.history.add(state.latest, timestamp);
            state.history.advance_frame(timestamp);
        }

        self.analyze_history(timestamp);

        SetupDetection {
            has_enough_data: self.has_enough_data,
            current_issue: self.current_issue,
        }
    }

    fn analyze_history(&mut self, timestamp: f64) {
        for &issue in &self.config.issue_priority {
            let state = &mut self.issues[issue.slot()];
            let active = next_activation(state.active, &state.history, &self.config);
            if active != state.active {
                debug!(
                    player = self.player_index,
                    issue = issue.name(),
                    active,
                    timestamp,
                    "setup issue toggled"
                );
                state.active = active;
            }
        }

        self.current_issue = self
            .config
            .issue_priority
            .iter()
            .copied()
            .find(|issue| self.issues[issue.slot()].active)
            .unwrap_or(SetupIssueType::None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{JointIndex, Rect};

    const DT: f64 = 0.02;

    // 1280x720 frame at 6 ppi: 120in tall (ratio 0.4), 640x480 crop centred
    // at x=640 is 80in tall (ratio 0.667).
    fn geometry() -> FrameGeometry {
        FrameGeometry::new(1280.0, 720.0, Rect::new(320.0, 120.0, 640.0, 480.0))
    }

    fn pose_with_chest(x: f64, y: f64) -> BodyPose {
        BodyPose::new(6.0).with_joint(JointIndex::Chest, x, y)
    }

    fn history_of(infos: &[IssueInfo]) -> TimeWindowedHistory<IssueInfo> {
        let mut history = TimeWindowedHistory::new(100.0);
        for (i, info) in infos.iter().enumerate() {
            history.add(*info, i as f64 * DT);
        }
        history.advance_frame((infos.len() - 1) as f64 * DT);
        history
    }

    #[test]
    fn test_good_pose_has_no_issue_readings() {
        let config = SetupDetectorConfig::default();
        let pose = pose_with_chest(640.0, 360.0);
        let readings = classify(&config, Some(&pose), &geometry(), 0, 1);

        for issue in SetupIssueType::default_priority() {
            let info = reading(&readings, issue);
            assert!(info.has_data, "{:?}", issue);
            assert!(!info.has_issue_under_loose_condition, "{:?}", issue);
            assert!(!info.has_issue_under_strict_condition, "{:?}", issue);
        }
    }

    #[test]
    fn test_no_pose_only_reports_no_pose() {
        let config = SetupDetectorConfig::default();
        let readings = classify(&config, None, &geometry(), 0, 1);
        let no_pose = reading(&readings, SetupIssueType::NoPose);
        assert!(no_pose.has_data && no_pose.has_issue_under_strict_condition);
        assert!(!reading(&readings, SetupIssueType::TooClose).has_data);
        assert!(!reading(&readings, SetupIssueType::ChestTooHigh).has_data);
    }

    #[test]
    fn test_distance_thresholds() {
        let config = SetupDetectorConfig::default();
        // 720px / 18ppi = 40in -> ratio 0: inside the loose band only
        let pose = pose_with_chest(640.0, 360.0);
        let mut close = pose.clone();
        close.pixels_per_inch = 18.0;
        let readings = classify(&config, Some(&close), &geometry(), 0, 1);
        let too_close = reading(&readings, SetupIssueType::TooClose);
        assert!(too_close.has_issue_under_loose_condition);
        assert!(!too_close.has_issue_under_strict_condition);

        // 720px / 24ppi = 30in -> ratio -0.05: strict
        let mut closer = pose;
        closer.pixels_per_inch = 24.0;
        let readings = classify(&config, Some(&closer), &geometry(), 0, 1);
        assert!(reading(&readings, SetupIssueType::TooClose).has_issue_under_strict_condition);
        assert!(!reading(&readings, SetupIssueType::TooFar).has_issue_under_loose_condition);
    }

    #[test]
    fn test_process_frame_distance_uses_crop() {
        let config = SetupDetectorConfig::default();
        let wide_crop = FrameGeometry::uncropped(1280.0, 720.0);
        // 720 / 6 = 120in in the process frame, above the 100in maximum
        let readings = classify(&config, Some(&pose_with_chest(640.0, 360.0)), &wide_crop, 0, 1);
        let too_far = reading(&readings, SetupIssueType::TooFarInProcessFrame);
        assert!(too_far.has_issue_under_strict_condition);
        assert!(!reading(&readings, SetupIssueType::TooFar).has_issue_under_loose_condition);
    }

    #[test]
    fn test_chest_safe_area_sides() {
        let config = SetupDetectorConfig::default();
        let geometry = geometry();
        // safe area x: 72..1208, y: 72..612, margin 6px
        let cases = [
            (640.0, 60.0, SetupIssueType::ChestTooHigh),
            (640.0, 630.0, SetupIssueType::ChestTooLow),
            (60.0, 360.0, SetupIssueType::ChestTooLeft),
            (1220.0, 360.0, SetupIssueType::ChestTooRight),
        ];
        for (x, y, issue) in cases {
            let readings = classify(&config, Some(&pose_with_chest(x, y)), &geometry, 0, 1);
            assert!(reading(&readings, issue).has_issue_under_strict_condition, "{:?}", issue);
        }
    }

    #[test]
    fn test_center_strategies() {
        let mut config = SetupDetectorConfig::default();
        // player 1 of 2 in the crop: 320 + 640 * 0.75 = 800
        let pose = pose_with_chest(800.0, 360.0);
        let readings = classify(&config, Some(&pose), &geometry(), 1, 2);
        assert!(!reading(&readings, SetupIssueType::NotAtCenter).has_issue_under_loose_condition);

        // display frame: 1280 * 0.75 = 960, 160px = 26.7in away
        config.center_strategy = SetupCenterStrategy::DisplayFrame;
        let readings = classify(&config, Some(&pose), &geometry(), 1, 2);
        assert!(reading(&readings, SetupIssueType::NotAtCenter).has_issue_under_strict_condition);
    }

    #[test]
    fn test_undetected_chest_has_no_position_data() {
        let config = SetupDetectorConfig::default();
        let pose = BodyPose::new(6.0);
        let readings = classify(&config, Some(&pose), &geometry(), 0, 1);
        assert!(reading(&readings, SetupIssueType::TooClose).has_data);
        assert!(!reading(&readings, SetupIssueType::ChestTooLeft).has_data);
        assert!(!reading(&readings, SetupIssueType::NotAtCenter).has_data);
    }

    #[test]
    fn test_boundary_straddling_signal_never_toggles() {
        let config = SetupDetectorConfig::default();
        let mut history = TimeWindowedHistory::new(config.issue_evaluation_time_window);
        let mut inactive = false;
        let mut active = true;
        let mut toggles = 0;

        for i in 0..500 {
            // alternates between "loose only" and "strict" every frame
            let strict = i % 2 == 0;
            let info = IssueInfo::measured(strict, true);
            let t = i as f64 * DT;
            history.add(info, t);
            history.advance_frame(t);

            if t <= config.issue_min_required_data_time + DT {
                continue;
            }
            let next_inactive = next_activation(inactive, &history, &config);
            let next_active = next_activation(active, &history, &config);
            toggles += (next_inactive != inactive) as usize;
            toggles += (next_active != active) as usize;
            inactive = next_inactive;
            active = next_active;
        }

        assert_eq!(toggles, 0);
        assert!(!inactive);
        assert!(active);
    }

    #[test]
    fn test_entry_and_cancel_asymmetry() {
        let config = SetupDetectorConfig::default();
        // half of the weighted time strict, the other half clear
        let mut infos = Vec::new();
        for i in 0..41 {
            let issue = i % 2 == 0;
            infos.push(IssueInfo::measured(issue, issue));
        }
        let history = history_of(&infos);

        // 0.5 < 0.8 entry ratio
        assert!(!next_activation(false, &history, &config));
        // 0.5 > 0.4 cancel ratio
        assert!(!next_activation(true, &history, &config));
    }

    #[test]
    fn test_insufficient_data_time_deactivates() {
        let config = SetupDetectorConfig::default();
        let infos = vec![IssueInfo::measured(true, true); 5]; // 0.08s
        let history = history_of(&infos);
        assert!(!next_activation(true, &history, &config));
        assert!(!next_activation(false, &history, &config));
    }

    #[test]
    fn test_samples_without_data_are_ignored() {
        let config = SetupDetectorConfig::default();
        let mut infos = Vec::new();
        // 40% strict issue, 60% without data
        for i in 0..50 {
            if i % 5 < 2 {
                infos.push(IssueInfo::measured(true, true));
            } else {
                infos.push(IssueInfo::default());
            }
        }
        let history = history_of(&infos);
        // 0.4s of data time, all of it strict
        assert!(next_activation(false, &history, &config));
    }

    #[test]
    fn test_detector_reports_highest_priority_issue() {
        let mut detector = SetupDetector::new(SetupDetectorConfig::default(), 0);
        // too close in the raw frame (ppi 24) and chest too high
        let pose = BodyPose::new(24.0).with_joint(JointIndex::Chest, 640.0, 10.0);
        let mut detection = None;
        for i in 0..60 {
            detection = Some(detector.process(Some(&pose), &geometry(), 1, i as f64 * DT));
        }
        let detection = detection.unwrap();
        assert!(detection.has_enough_data);
        assert_eq!(detection.current_issue, SetupIssueType::TooClose);
        assert!(detector.is_issue_active(SetupIssueType::ChestTooHigh));
        let chest = detector.latest_info(SetupIssueType::ChestTooHigh);
        assert!(chest.has_data && chest.has_issue_under_strict_condition);
        assert!(!detector.latest_info(SetupIssueType::NoPose).has_issue_under_strict_condition);
    }

    #[test]
    fn test_detector_needs_window_before_enough_data() {
        let mut detector = SetupDetector::new(SetupDetectorConfig::default(), 0);
        let pose = pose_with_chest(640.0, 360.0);
        let first = detector.process(Some(&pose), &geometry(), 1, 10.0);
        assert!(!first.has_enough_data);
        let later = detector.process(Some(&pose), &geometry(), 1, 10.3);
        assert!(!later.has_enough_data);
        let enough = detector.process(Some(&pose), &geometry(), 1, 10.6);
        assert!(enough.has_enough_data);
        assert_eq!(enough.current_issue, SetupIssueType::None);
    }

    #[test]
    fn test_no_pose_becomes_current_issue() {
        let mut detector = SetupDetector::new(SetupDetectorConfig::default(), 0);
        let mut detection = None;
        for i in 0..40 {
            detection = Some(detector.process(None, &geometry(), 1, i as f64 * DT));
        }
        assert_eq!(detection.map(|d| d.current_issue), Some(SetupIssueType::NoPose));
    }
}
