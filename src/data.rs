// src/data.rs - Pose replay input and setup session export
use crate::error::DataError;
use crate::pose::{BodyPose, FrameGeometry, JointIndex, PoseFrame, PoseNode, Rect};
use crate::setup_detector::SetupIssueType;
use crate::setup_tracker::{SetupStateType, SetupSummary};
use crate::targets::{PlayerTargets, TargetKind, TargetState};
use chrono::Local;
use csv::{Reader, Writer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One player's pose in one frame. Rows sharing a timestamp form a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PoseRecord {
    timestamp: f64,
    frame_width: f64,
    frame_height: f64,
    crop_x: f64,
    crop_y: f64,
    crop_width: f64,
    crop_height: f64,
    num_players: usize,
    player: usize,
    has_pose: bool,
    pixels_per_inch: Option<f64>,

    nose_x: Option<f64>,
    nose_y: Option<f64>,
    chest_x: Option<f64>,
    chest_y: Option<f64>,
    left_shoulder_x: Option<f64>,
    left_shoulder_y: Option<f64>,
    right_shoulder_x: Option<f64>,
    right_shoulder_y: Option<f64>,
    left_elbow_x: Option<f64>,
    left_elbow_y: Option<f64>,
    right_elbow_x: Option<f64>,
    right_elbow_y: Option<f64>,
    left_wrist_x: Option<f64>,
    left_wrist_y: Option<f64>,
    right_wrist_x: Option<f64>,
    right_wrist_y: Option<f64>,
    left_hip_x: Option<f64>,
    left_hip_y: Option<f64>,
    right_hip_x: Option<f64>,
    right_hip_y: Option<f64>,
}

impl PoseRecord {
    fn joint_fields(&self) -> [(Option<f64>, Option<f64>); 10] {
        [
            (self.nose_x, self.nose_y),
            (self.chest_x, self.chest_y),
            (self.left_shoulder_x, self.left_shoulder_y),
            (self.right_shoulder_x, self.right_shoulder_y),
            (self.left_elbow_x, self.left_elbow_y),
            (self.right_elbow_x, self.right_elbow_y),
            (self.left_wrist_x, self.left_wrist_y),
            (self.right_wrist_x, self.right_wrist_y),
            (self.left_hip_x, self.left_hip_y),
            (self.right_hip_x, self.right_hip_y),
        ]
    }

    fn joint_fields_mut(&mut self) -> [(&mut Option<f64>, &mut Option<f64>); 10] {
        [
            (&mut self.nose_x, &mut self.nose_y),
            (&mut self.chest_x, &mut self.chest_y),
            (&mut self.left_shoulder_x, &mut self.left_shoulder_y),
            (&mut self.right_shoulder_x, &mut self.right_shoulder_y),
            (&mut self.left_elbow_x, &mut self.left_elbow_y),
            (&mut self.right_elbow_x, &mut self.right_elbow_y),
            (&mut self.left_wrist_x, &mut self.left_wrist_y),
            (&mut self.right_wrist_x, &mut self.right_wrist_y),
            (&mut self.left_hip_x, &mut self.left_hip_y),
            (&mut self.right_hip_x, &mut self.right_hip_y),
        ]
    }

    fn from_frame(frame: &PoseFrame, player: usize) -> Self {
        let crop = frame.geometry.process_frame_crop;
        let pose = frame.player_pose(player);
        let mut record = Self {
            timestamp: frame.timestamp,
            frame_width: frame.geometry.frame_size.x,
            frame_height: frame.geometry.frame_size.y,
            crop_x: crop.x,
            crop_y: crop.y,
            crop_width: crop.width,
            crop_height: crop.height,
            num_players: frame.num_players(),
            player,
            has_pose: pose.is_some(),
            pixels_per_inch: pose.map(|pose| pose.pixels_per_inch),
            nose_x: None,
            nose_y: None,
            chest_x: None,
            chest_y: None,
            left_shoulder_x: None,
            left_shoulder_y: None,
            right_shoulder_x: None,
            right_shoulder_y: None,
            left_elbow_x: None,
            left_elbow_y: None,
            right_elbow_x: None,
            right_elbow_y: None,
            left_wrist_x: None,
            left_wrist_y: None,
            right_wrist_x: None,
            right_wrist_y: None,
            left_hip_x: None,
            left_hip_y: None,
            right_hip_x: None,
            right_hip_y: None,
        };

        if let Some(pose) = pose {
            for (joint, (x, y)) in JointIndex::ALL.iter().zip(record.joint_fields_mut()) {
                if let Some(position) = pose.node(*joint).detected_position() {
                    *x = Some(position.x);
                    *y = Some(position.y);
                }
            }
        }
        record
    }

    fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(
            self.frame_width,
            self.frame_height,
            Rect::new(self.crop_x, self.crop_y, self.crop_width, self.crop_height),
        )
    }

    fn pose(&self) -> Option<BodyPose> {
        if !self.has_pose {
            return None;
        }
        let mut pose = BodyPose::new(self.pixels_per_inch?);
        for (joint, fields) in JointIndex::ALL.iter().zip(self.joint_fields()) {
            *pose.node_mut(*joint) = match fields {
                (Some(x), Some(y)) => PoseNode::detected(x, y),
                _ => PoseNode::not_detected(),
            };
        }
        Some(pose)
    }
}

/// Reads a pose replay CSV into frames ordered as in the file.
pub fn load_frames(path: &Path) -> Result<Vec<PoseFrame>, DataError> {
    let mut reader = Reader::from_path(path).map_err(|source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut frames: Vec<PoseFrame> = Vec::new();
    for (row, result) in reader.deserialize::<PoseRecord>().enumerate() {
        let record = result.map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let num_players = record.num_players.max(1);
        if record.player >= num_players {
            return Err(DataError::PlayerOutOfRange {
                path: path.to_path_buf(),
                row: row + 1,
                player: record.player,
                num_players,
            });
        }

        // distance checks divide by it
        if record.has_pose && !record.pixels_per_inch.map_or(false, |ppi| ppi > 0.0) {
            return Err(DataError::MissingPixelsPerInch {
                path: path.to_path_buf(),
                row: row + 1,
            });
        }

        let starts_new_frame = frames
            .last()
            .map_or(true, |frame| frame.timestamp != record.timestamp);
        if starts_new_frame {
            frames.push(PoseFrame::new(
                record.timestamp,
                record.geometry(),
                vec![None; num_players],
            ));
        }

        if let Some(frame) = frames.last_mut() {
            if frame.players.len() < num_players {
                frame.players.resize(num_players, None);
            }
            frame.players[record.player] = record.pose();
        }
    }

    if frames.is_empty() {
        return Err(DataError::Empty {
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), frames = frames.len(), "loaded pose frames");
    Ok(frames)
}

/// Writes frames in the format [`load_frames`] reads, one row per player slot.
pub fn write_frames(path: &Path, frames: &[PoseFrame]) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = Writer::from_path(path).map_err(csv_error)?;
    for frame in frames {
        for player in 0..frame.num_players() {
            writer
                .serialize(PoseRecord::from_frame(frame, player))
                .map_err(csv_error)?;
        }
    }
    writer.flush().map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn create_dir(dir: &Path) -> Result<(), DataError> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| DataError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

#[derive(Debug, Serialize)]
struct SessionRecord {
    frame: usize,
    timestamp: f64,
    player: usize,
    state: &'static str,
    issue: &'static str,
    state_changed: bool,
    status: String,
    good_position_progress: f64,
    raise_hand_progress: f64,
    no_player_duration: f64,

    left_hand_x: Option<f64>,
    left_hand_y: Option<f64>,
    left_hand_visible: bool,
    right_hand_x: Option<f64>,
    right_hand_y: Option<f64>,
    right_hand_visible: bool,
    chest_x: Option<f64>,
    chest_y: Option<f64>,
    chest_visible: bool,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    frame: usize,
    timestamp: f64,
    player: usize,
    summary: SetupSummary,
    targets: [TargetState; 3],
}

/// Aggregates shown in the session report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub total_frames: usize,
    pub duration: f64,
    /// Seconds spent per state, summed over players.
    pub seconds_per_state: BTreeMap<&'static str, f64>,
    pub frames_per_issue: BTreeMap<&'static str, usize>,
    pub state_changes: usize,
    /// Per player, first time `Playing` was entered.
    pub first_playing_time: BTreeMap<usize, f64>,
}

/// Collects per-frame setup results and writes them out as a session.
pub struct SessionExporter {
    output_dir: PathBuf,
    session_name: String,
    entries: Vec<SessionEntry>,
    frame_timestamps: Vec<f64>,
}

impl SessionExporter {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name
            .unwrap_or_else(|| format!("session_{}", Local::now().format("%Y%m%d_%H%M%S")));

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
            entries: Vec::new(),
            frame_timestamps: Vec::new(),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    /// Starts a new frame; following [`add_player`](Self::add_player) calls
    /// belong to it.
    pub fn begin_frame(&mut self, timestamp: f64) {
        self.frame_timestamps.push(timestamp);
    }

    pub fn add_player(&mut self, player: usize, summary: SetupSummary, targets: &PlayerTargets) {
        let frame = self.frame_timestamps.len().saturating_sub(1);
        let timestamp = self.frame_timestamps.last().copied().unwrap_or(0.0);
        self.entries.push(SessionEntry {
            frame,
            timestamp,
            player,
            summary,
            targets: TargetKind::ALL.map(|kind| targets.get(kind)),
        });
    }

    pub fn frame_count(&self) -> usize {
        self.frame_timestamps.len()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            total_frames: self.frame_timestamps.len(),
            ..SessionStats::default()
        };
        if let (Some(first), Some(last)) =
            (self.frame_timestamps.first(), self.frame_timestamps.last())
        {
            stats.duration = last - first;
        }
        for state in SetupStateType::ALL {
            stats.seconds_per_state.insert(state.name(), 0.0);
        }

        // time between a player's consecutive entries goes to the earlier state
        let mut previous: BTreeMap<usize, &SessionEntry> = BTreeMap::new();
        for entry in &self.entries {
            *stats
                .frames_per_issue
                .entry(entry.summary.current_issue.name())
                .or_insert(0) += 1;

            if entry.summary.is_state_changed {
                stats.state_changes += 1;
            }
            if entry.summary.state == SetupStateType::Playing {
                stats
                    .first_playing_time
                    .entry(entry.player)
                    .or_insert(entry.timestamp);
            }
            if let Some(prev) = previous.insert(entry.player, entry) {
                *stats
                    .seconds_per_state
                    .entry(prev.summary.state.name())
                    .or_insert(0.0) += entry.timestamp - prev.timestamp;
            }
        }
        stats
    }

    pub fn export_csv(&self) -> Result<PathBuf, DataError> {
        let csv_path = self.session_dir().join("setup_session.csv");
        create_dir(&self.session_dir())?;

        let csv_error = |source| DataError::Csv {
            path: csv_path.clone(),
            source,
        };
        let mut writer = Writer::from_path(&csv_path).map_err(csv_error)?;
        for entry in &self.entries {
            writer.serialize(Self::create_record(entry)).map_err(csv_error)?;
        }
        writer.flush().map_err(|source| DataError::Io {
            path: csv_path.clone(),
            source,
        })?;

        info!(path = %csv_path.display(), rows = self.entries.len(), "session exported");
        Ok(csv_path)
    }

    fn create_record(entry: &SessionEntry) -> SessionRecord {
        let [left_hand, right_hand, chest] = entry.targets;
        let summary = &entry.summary;
        SessionRecord {
            frame: entry.frame,
            timestamp: entry.timestamp,
            player: entry.player,
            state: summary.state.name(),
            issue: summary.current_issue.name(),
            state_changed: summary.is_state_changed,
            status: summary.status_text(),
            good_position_progress: summary.good_position_progress,
            raise_hand_progress: summary.raise_hand_progress,
            no_player_duration: summary.no_player_duration,
            left_hand_x: left_hand.position.map(|p| p.x),
            left_hand_y: left_hand.position.map(|p| p.y),
            left_hand_visible: left_hand.visible,
            right_hand_x: right_hand.position.map(|p| p.x),
            right_hand_y: right_hand.position.map(|p| p.y),
            right_hand_visible: right_hand.visible,
            chest_x: chest.position.map(|p| p.x),
            chest_y: chest.position.map(|p| p.y),
            chest_visible: chest.visible,
        }
    }

    pub fn generate_report(&self) -> Result<PathBuf, DataError> {
        let report_path = self.session_dir().join("report.html");
        create_dir(&self.session_dir())?;

        fs::write(&report_path, self.create_html_report()).map_err(|source| DataError::Io {
            path: report_path.clone(),
            source,
        })?;
        Ok(report_path)
    }

    fn create_html_report(&self) -> String {
        let stats = self.stats();

        let state_rows: String = stats
            .seconds_per_state
            .iter()
            .map(|(state, seconds)| {
                format!("        <tr><td>{}</td><td>{:.2} s</td></tr>\n", state, seconds)
            })
            .collect();
        let issue_rows: String = SetupIssueType::default_priority()
            .iter()
            .chain(std::iter::once(&SetupIssueType::None))
            .filter_map(|issue| {
                stats
                    .frames_per_issue
                    .get(issue.name())
                    .map(|count| {
                        format!("        <tr><td>{}</td><td>{}</td></tr>\n", issue.name(), count)
                    })
            })
            .collect();
        let ready_rows: String = stats
            .first_playing_time
            .iter()
            .map(|(player, time)| {
                format!("        <tr><td>Player {}</td><td>{:.2} s</td></tr>\n", player, time)
            })
            .collect();

        format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <title>Setup Session Report - {name}</title>
    <style>
        body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 40px; background: #f5f5f5; }}
        h1 {{ color: #333; }}
        .stats {{ background: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); margin-bottom: 20px; }}
        .stat-label {{ font-weight: bold; color: #666; }}
        .stat-value {{ color: #4682EA; font-size: 1.2em; }}
        td {{ padding: 4px 16px 4px 0; }}
    </style>
</head>
<body>
    <h1>Setup Session Report</h1>
    <div class="stats">
        <h2>Session: {name}</h2>
        <div><span class="stat-label">Total Frames:</span> <span class="stat-value">{frames}</span></div>
        <div><span class="stat-label">Duration:</span> <span class="stat-value">{duration:.2} s</span></div>
        <div><span class="stat-label">State Changes:</span> <span class="stat-value">{changes}</span></div>
    </div>
    <div class="stats">
        <h2>Time per State</h2>
        <table>
{state_rows}        </table>
    </div>
    <div class="stats">
        <h2>Frames per Issue</h2>
        <table>
{issue_rows}        </table>
    </div>
    <div class="stats">
        <h2>Ready</h2>
        <table>
{ready_rows}        </table>
    </div>
</body>
</html>
"#,
            name = self.session_name,
            frames = stats.total_frames,
            duration = stats.duration,
            changes = stats.state_changes,
            state_rows = state_rows,
            issue_rows = issue_rows,
            ready_rows = ready_rows,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::TargetConfig;
    use tempfile::tempdir;

    fn sample_frames() -> Vec<PoseFrame> {
        let geometry = FrameGeometry::new(1280.0, 720.0, Rect::new(320.0, 120.0, 640.0, 480.0));
        let pose = BodyPose::new(6.0)
            .with_joint(JointIndex::Chest, 480.0, 360.0)
            .with_joint(JointIndex::LeftWrist, 400.5, 410.25);
        vec![
            PoseFrame::new(0.0, geometry, vec![Some(pose.clone()), None]),
            PoseFrame::new(0.04, geometry, vec![None, Some(pose)]),
        ]
    }

    #[test]
    fn test_frames_survive_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.csv");
        let frames = sample_frames();
        write_frames(&path, &frames).unwrap();
        let loaded = load_frames(&path).unwrap();

        assert_eq!(loaded, frames);
    }

    #[test]
    fn test_pose_without_pixels_per_inch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.csv");
        let mut record = PoseRecord::from_frame(&sample_frames()[0], 0);
        record.pixels_per_inch = Some(0.0);
        let mut writer = Writer::from_path(&path).unwrap();
        writer.serialize(&record).unwrap();
        writer.flush().unwrap();
        drop(writer);

        match load_frames(&path) {
            Err(DataError::MissingPixelsPerInch { row, .. }) => assert_eq!(row, 1),
            other => panic!("unexpected {:?}", other.map(|frames| frames.len())),
        }
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "timestamp,frame_width\n").unwrap();
        let result = load_frames(&path);

        assert!(matches!(result, Err(DataError::Empty { .. })));
    }

    #[test]
    fn test_session_stats() {
        let dir = tempdir().unwrap();
        let mut exporter = SessionExporter::new(dir.path(), Some("stats".to_string()));
        let targets = PlayerTargets::new(TargetConfig::default(), 0);

        let mut waiting = SetupSummary::dummy();
        waiting.state = SetupStateType::WaitingForGoodPosition;
        waiting.current_issue = SetupIssueType::TooFar;
        let mut playing = SetupSummary::dummy();
        playing.state = SetupStateType::Playing;
        playing.is_state_changed = true;

        exporter.begin_frame(1.0);
        exporter.add_player(0, waiting, &targets);
        exporter.begin_frame(1.5);
        exporter.add_player(0, waiting, &targets);
        exporter.begin_frame(2.0);
        exporter.add_player(0, playing, &targets);

        let stats = exporter.stats();
        assert_eq!(stats.total_frames, 3);
        assert!((stats.duration - 1.0).abs() < 1e-12);
        assert!((stats.seconds_per_state["waiting_for_good_position"] - 1.0).abs() < 1e-12);
        assert_eq!(stats.seconds_per_state["playing"], 0.0);
        assert_eq!(stats.frames_per_issue["too_far"], 2);
        assert_eq!(stats.frames_per_issue["none"], 1);
        assert_eq!(stats.state_changes, 1);
        assert_eq!(stats.first_playing_time.get(&0), Some(&2.0));
    }

    #[test]
    fn test_export_writes_csv_and_report() {
        let dir = tempdir().unwrap();
        let mut exporter = SessionExporter::new(dir.path(), Some("run".to_string()));
        let targets = PlayerTargets::new(TargetConfig::default(), 0);
        exporter.begin_frame(0.0);
        exporter.add_player(0, SetupSummary::dummy(), &targets);

        let csv_path = exporter.export_csv().unwrap();
        let report_path = exporter.generate_report().unwrap();
        let csv = fs::read_to_string(&csv_path).unwrap();
        let report = fs::read_to_string(&report_path).unwrap();

        assert!(csv.starts_with("frame,timestamp,player,state,issue"));
        assert!(csv.contains("Preparing..."));
        assert!(report.contains("Setup Session Report - run"));
    }
}
