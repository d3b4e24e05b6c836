// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project settings and timeline files.
//!
//! A project is a directory holding:
//! - `project.clipforge`, the RON settings below
//! - the timeline file it points at (RON, or JSON by extension)
//! - a media root that relative source URLs resolve against

use crate::error::AppError;
use clipforge_playback::EngineConfig;
use clipforge_timeline::{AnimatableProperty, Clip, CompoundValue, Easing, Keyframe, Timeline, Track, TrackKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current project settings format version
pub const PROJECT_FORMAT_VERSION: u32 = 1;

/// Project settings file name
pub const PROJECT_FILE_NAME: &str = "project.clipforge";

/// Engine command issued by the driver at a point in wall time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScriptAction {
    /// Start or resume
    Play,
    /// Freeze
    Pause,
    /// Jump to a timeline time
    Seek(f64),
    /// Change the speed
    SetRate(f64),
    /// Stop and rewind
    Stop,
}

/// A scripted command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    /// Milliseconds after the driver started
    pub at_ms: f64,
    /// What to do
    pub action: ScriptAction,
}

/// How the headless driver runs the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Ticks per second
    pub tick_rate: f64,
    /// Stop after this many seconds (runs to the end of the timeline when unset)
    pub run_seconds: Option<f64>,
    /// Start playing immediately
    pub autoplay: bool,
    /// Restart from the top when the end is reached
    pub loop_playback: bool,
    /// Interval between status log lines
    pub status_interval_ms: u64,
    /// Fractional clock error of simulated media elements
    pub element_skew: f64,
    /// Scripted commands
    pub script: Vec<ScheduledAction>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            run_seconds: None,
            autoplay: true,
            loop_playback: false,
            status_interval_ms: 1000,
            element_skew: 0.0,
            script: Vec::new(),
        }
    }
}

/// Complete project settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Settings format version
    pub version: u32,
    /// Project name
    pub name: String,
    /// Timeline file (relative to the project directory)
    pub timeline: PathBuf,
    /// Media directory (relative to the project directory)
    pub media_root: PathBuf,
    /// Driver settings
    #[serde(default)]
    pub driver: DriverSettings,
    /// Engine tuning
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            version: PROJECT_FORMAT_VERSION,
            name: "Untitled Project".to_string(),
            timeline: PathBuf::from("timeline.ron"),
            media_root: PathBuf::from("media"),
            driver: DriverSettings::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ProjectSettings {
    /// Create new project settings with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Load project settings from a file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: ProjectSettings = ron::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        // Version check
        if settings.version > PROJECT_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Project version {} is newer than supported version {}",
                    settings.version, PROJECT_FORMAT_VERSION
                ),
            ));
        }

        Ok(settings)
    }

    /// Save project settings to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        let content = ron::ser::to_string_pretty(self, config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        std::fs::write(path, content)
    }

    /// Get the project file path for a project directory
    pub fn project_file_path(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_FILE_NAME)
    }

    /// Timeline file resolved against the project directory
    pub fn timeline_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.timeline)
    }

    /// Media root resolved against the project directory
    pub fn media_root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.media_root)
    }
}

/// Load a timeline, picking the format from the extension
pub fn load_timeline(path: &Path) -> Result<Timeline, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    let parse_error = |message: String| AppError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let timeline: Timeline = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        _ => ron::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
    };
    timeline.validate().map_err(clipforge_playback::PlaybackError::from)?;
    Ok(timeline)
}

/// Save a timeline, picking the format from the extension
pub fn save_timeline(path: &Path, timeline: &Timeline) -> Result<(), AppError> {
    let content = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::to_string_pretty(timeline).map_err(|e| AppError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?,
        _ => ron::ser::to_string_pretty(timeline, ron::ser::PrettyConfig::default()).map_err(|e| {
            AppError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?,
    };
    std::fs::write(path, content).map_err(|e| AppError::io(path, e))
}

/// Sample edit used when a new project is created
pub fn demo_timeline() -> Timeline {
    let mut timeline = Timeline::new("Demo", 10_000.0);
    let titles = timeline.add_track(Track::new("Titles", TrackKind::Text).with_z_order(2));
    let video = timeline.add_track(Track::new("V1", TrackKind::Video).with_z_order(1));
    let music = timeline.add_track(Track::new("A1", TrackKind::Audio));

    let clips = [
        (
            titles,
            Clip::new(titles, "title", 0.0, 3000.0)
                .with_keyframes(
                    AnimatableProperty::Position,
                    vec![
                        Keyframe::new(0.0, CompoundValue::new(0.0, -40.0)).with_easing(Easing::EaseOut),
                        Keyframe::new(0.4, CompoundValue::new(0.0, 0.0)),
                    ],
                )
                .with_keyframes(
                    AnimatableProperty::Opacity,
                    vec![Keyframe::new(0.8, 1.0), Keyframe::new(1.0, 0.0)],
                ),
        ),
        (
            video,
            Clip::new(video, "intro.mp4", 0.0, 4000.0).with_keyframes(
                AnimatableProperty::Scale,
                vec![
                    Keyframe::new(0.0, 1.0).with_easing(Easing::EaseInOut),
                    Keyframe::new(1.0, 1.2),
                ],
            ),
        ),
        (
            video,
            Clip::new(video, "main.mp4", 4000.0, 6000.0).with_trim(1000.0, 7000.0, 12_000.0),
        ),
        (
            music,
            Clip::new(music, "music.wav", 0.0, 10_000.0).with_keyframes(
                AnimatableProperty::Volume,
                vec![
                    Keyframe::new(0.0, 0.0),
                    Keyframe::new(0.1, 0.8),
                    Keyframe::new(0.9, 0.8),
                    Keyframe::new(1.0, 0.0),
                ],
            ),
        ),
    ];

    for (track, clip) in clips {
        if let Err(e) = timeline.add_clip(track, clip) {
            tracing::warn!("Skipping demo clip: {}", e);
        }
    }
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("clipforge-{}-{}", std::process::id(), name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_settings() {
        let settings = ProjectSettings::default();
        assert_eq!(settings.version, PROJECT_FORMAT_VERSION);
        assert_eq!(settings.driver.tick_rate, 60.0);
        assert!(settings.engine.validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let mut settings = ProjectSettings::new("Test Project");
        settings.driver.script.push(ScheduledAction {
            at_ms: 500.0,
            action: ScriptAction::Seek(2500.0),
        });
        let ron_str = ron::ser::to_string_pretty(&settings, ron::ser::PrettyConfig::default()).unwrap();
        let loaded: ProjectSettings = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_rejects_newer_version() {
        let dir = scratch_dir("version");
        let path = ProjectSettings::project_file_path(&dir);
        let settings = ProjectSettings {
            version: PROJECT_FORMAT_VERSION + 1,
            ..ProjectSettings::default()
        };
        settings.save(&path).unwrap();

        let err = ProjectSettings::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_timeline_files_round_trip() {
        let dir = scratch_dir("timeline");
        let timeline = demo_timeline();
        assert_eq!(timeline.track_count(), 3);

        for name in ["timeline.ron", "timeline.json"] {
            let path = dir.join(name);
            save_timeline(&path, &timeline).unwrap();
            let loaded = load_timeline(&path).unwrap();
            assert_eq!(loaded, timeline);
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_timeline_file_is_rejected() {
        let dir = scratch_dir("invalid");
        let path = dir.join("broken.ron");
        std::fs::write(&path, "(not a timeline").unwrap();
        assert!(matches!(load_timeline(&path), Err(AppError::Parse { .. })));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_demo_timeline_compiles() {
        let snapshot = demo_timeline().compile().unwrap();
        assert_eq!(snapshot.clips().len(), 4);
    }
}
