//! Engine configuration

use serde::{Deserialize, Serialize};

use reanim_playback::TrackerConfig;

/// Selection behaviour
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Nesting limit for rule evaluation; overrides `tracker.max_depth`
    pub max_depth: u32,
    /// Log priority conflicts as warnings when a pack loads
    pub warn_conflicts_on_load: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        SelectionConfig {
            max_depth: reanim_rules::DEFAULT_MAX_DEPTH,
            warn_conflicts_on_load: true,
        }
    }
}

/// Logging output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Replacer engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tracker: TrackerConfig,
    pub selection: SelectionConfig,
    pub log: LogConfig,
    /// First engine-wide motion id handed to rule packs
    pub motion_base: u32,
    /// Size of the motion id space shared by all packs
    pub motion_capacity: u32,
    /// Size of the synchronized index space shared by all packs
    pub sync_capacity: u32,
    /// Maximum queued deferred edits
    pub max_pending_edits: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tracker: TrackerConfig::default(),
            selection: SelectionConfig::default(),
            log: LogConfig::default(),
            motion_base: 0x1_0000,
            motion_capacity: 0xFFFF,
            sync_capacity: 0xFFFF,
            max_pending_edits: 1024,
        }
    }
}

impl EngineConfig {
    /// Editor session: verbose logs, long event history, short blends
    pub fn editor() -> Self {
        EngineConfig {
            tracker: TrackerConfig {
                blend_duration: 0.1,
                echo_blend_duration: 0.1,
                event_log_capacity: 4096,
                ..TrackerConfig::default()
            },
            log: LogConfig {
                level: "debug".to_string(),
                ..LogConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    /// Parse from a structured value; missing fields keep their defaults
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}
