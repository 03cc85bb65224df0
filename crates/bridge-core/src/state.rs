//! Views derived from the inbound file: the latest state block, the DEFCON level, and the
//! event log.
//!
//! Everything here is a pure function of text. The inbound file is untrusted: nothing in this
//! module fails, it degrades.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

pub const DEFAULT_START_MARKER: &str = "=== GAME STATE START ===";
pub const DEFAULT_END_MARKER: &str = "=== GAME STATE END ===";
pub const DEFAULT_LEVEL_LABEL: &str = "DEFCON level";
pub const BASELINE_LEVEL: u32 = 5;

/// `Event #<id> <type>: <source> [<kind>] -> <target> [<kind>] @ <location>`
static EVENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*Event #(\d+) ([^\s:]+): (.+?) \[([^\]\s]+)\] -> (.+?) \[([^\]\s]+)\] @ (.+?)\s*$",
    )
    .expect("invalid event line pattern")
});

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Text between the last start marker and the last end marker, both inclusive.
    Delimited,
    /// Markers missing or out of order; the whole inbound content stands in.
    Degraded,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Snapshot {
    pub text: String,
    pub kind: SnapshotKind,
}

impl Snapshot {
    pub fn is_degraded(&self) -> bool {
        self.kind == SnapshotKind::Degraded
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Event {
    pub id: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: Actor,
    pub target: Actor,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct StateExtractor {
    start_marker: String,
    end_marker: String,
    level_pattern: Regex,
}

static DEFAULT_LEVEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&level_pattern_source(DEFAULT_LEVEL_LABEL)).expect("invalid level pattern")
});

/// `<label>: <n>` at the start of a line, leading whitespace allowed.
fn level_pattern_source(label: &str) -> String {
    format!(r"(?m)^\s*{}: (\d+)", regex::escape(label))
}

impl Default for StateExtractor {
    fn default() -> Self {
        Self {
            start_marker: DEFAULT_START_MARKER.to_string(),
            end_marker: DEFAULT_END_MARKER.to_string(),
            level_pattern: DEFAULT_LEVEL_PATTERN.clone(),
        }
    }
}

impl StateExtractor {
    pub fn new(
        start_marker: impl Into<String>,
        end_marker: impl Into<String>,
        level_label: &str,
    ) -> BridgeResult<Self> {
        let start_marker = start_marker.into();
        let end_marker = end_marker.into();
        if start_marker.is_empty() || end_marker.is_empty() {
            return Err(BridgeError::Config(
                "state markers must be non-empty".to_string(),
            ));
        }
        let level_pattern = Regex::new(&level_pattern_source(level_label))
            .map_err(|e| BridgeError::Config(format!("level label: {e}")))?;
        Ok(Self {
            start_marker,
            end_marker,
            level_pattern,
        })
    }

    /// Picks the most recent complete state block out of the full inbound content.
    pub fn snapshot(&self, content: &str) -> Snapshot {
        let start = content.rfind(&self.start_marker);
        let end = content.rfind(&self.end_marker);
        match (start, end) {
            (Some(start), Some(end)) if start < end => Snapshot {
                text: content[start..end + self.end_marker.len()].to_string(),
                kind: SnapshotKind::Delimited,
            },
            _ => Snapshot {
                text: content.to_string(),
                kind: SnapshotKind::Degraded,
            },
        }
    }

    /// Level announced in `text`, if any. The last occurrence wins so a degraded snapshot
    /// (the whole file) still reports the newest value.
    pub fn level(&self, text: &str) -> Option<u32> {
        self.level_pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
            .last()
    }
}

/// Parses every event line in `content` whose id is strictly above `watermark`, in order of
/// appearance. Lines that do not match the pattern are ignored.
pub fn extract_events(content: &str, watermark: u64) -> Vec<Event> {
    EVENT_LINE
        .captures_iter(content)
        .filter_map(|caps| {
            let id = caps[1].parse::<u64>().ok()?;
            Some(Event {
                id,
                event_type: caps[2].to_string(),
                source: Actor {
                    name: caps[3].trim().to_string(),
                    kind: caps[4].to_string(),
                },
                target: Actor {
                    name: caps[5].trim().to_string(),
                    kind: caps[6].to_string(),
                },
                location: caps[7].to_string(),
            })
        })
        .filter(|event| event.id > watermark)
        .collect()
}
