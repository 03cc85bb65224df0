use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::correlation::{DEFAULT_CORRELATION_SEED, WaitPolicy};
use crate::state::{BASELINE_LEVEL, DEFAULT_END_MARKER, DEFAULT_LEVEL_LABEL, DEFAULT_START_MARKER};

pub const CONFIG_DIR_ENV: &str = "DEFCON_BRIDGE_CONFIG_DIR";
pub const DEFAULT_CONFIG_FILE: &str = "bridge.toml";

/// Config file lookup.
///
/// Search order:
/// 1) `DEFCON_BRIDGE_CONFIG_DIR/<relative_path>`
/// 2) `./<relative_path>`
/// 3) `<repo_root>/config/<relative_path>` (repo-local convenience)
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn parse_from_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse_from_string(&text)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn parse_from_string<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
        toml::from_str(text).with_context(|| "Failed to parse TOML")
    }

    pub fn resolve_path(relative_path: &str) -> Option<PathBuf> {
        let rel = Path::new(relative_path);

        if let Some(root) = env::var_os(CONFIG_DIR_ENV) {
            let candidate = PathBuf::from(root).join(rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if let Ok(cwd) = env::current_dir() {
            let candidate = cwd.join(rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        // This crate lives at <repo_root>/crates/bridge-core.
        let candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .ancestors()
            .nth(2)?
            .join("config")
            .join(rel);
        candidate.is_file().then_some(candidate)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    /// Commands to the simulation (the game's input file).
    pub outbound_path: PathBuf,
    /// State, events, and acknowledgements from the simulation (the game's output file).
    pub inbound_path: PathBuf,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            outbound_path: PathBuf::from("input.txt"),
            inbound_path: PathBuf::from("output.txt"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    pub state_start_marker: String,
    pub state_end_marker: String,
    pub level_label: String,
    pub baseline_level: u32,
    pub correlation_seed: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            state_start_marker: DEFAULT_START_MARKER.to_string(),
            state_end_marker: DEFAULT_END_MARKER.to_string(),
            level_label: DEFAULT_LEVEL_LABEL.to_string(),
            baseline_level: BASELINE_LEVEL,
            correlation_seed: DEFAULT_CORRELATION_SEED,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TurnConfig {
    pub poll_interval_ms: u64,
    /// Pause after each dispatch before waiting for state again.
    pub cooldown_ms: u64,
    /// JSON prompt book keyed `defcon_<level>`. Built-in contexts are used when unset.
    /// A relative path in a config file is taken relative to that file's directory.
    pub contexts_path: Option<PathBuf>,
    /// Keep only the last N turns of conversation. Unset keeps everything.
    pub history_turns: Option<usize>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            cooldown_ms: 1_000,
            contexts_path: None,
            history_turns: None,
        }
    }
}

impl TurnConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AckConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for AckConfig {
    fn default() -> Self {
        let policy = WaitPolicy::default();
        Self {
            timeout_ms: policy.timeout.as_millis() as u64,
            poll_interval_ms: policy.poll_interval.as_millis() as u64,
        }
    }
}

impl AckConfig {
    pub fn policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Full endpoint URL, e.g. `http://127.0.0.1:11434/api/chat`.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/api/chat".to_string(),
            model: "llama3.1:8b".to_string(),
            temperature: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub channel: ChannelConfig,
    pub protocol: ProtocolConfig,
    pub turn: TurnConfig,
    pub ack: AckConfig,
    pub llm: LlmConfig,
}

impl BridgeConfig {
    /// Loads `relative_path` through [`ConfigLoader`], falling back to defaults when no file
    /// exists, then applies environment overrides.
    pub fn load(relative_path: &str) -> anyhow::Result<Self> {
        let mut cfg = match ConfigLoader::resolve_path(relative_path) {
            Some(path) => Self::load_file(&path)?,
            None => {
                tracing::info!(file = relative_path, "bridge.config.defaults");
                BridgeConfig::default()
            }
        };
        cfg.apply_overrides(|key| env::var(key).ok());
        Ok(cfg)
    }

    /// Parses one config file and anchors its relative paths to the file's directory. No
    /// environment overrides are applied.
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let mut cfg: Self = ConfigLoader::parse_from_file(path)?;
        if let Some(dir) = path.parent() {
            cfg.turn.contexts_path = cfg
                .turn
                .contexts_path
                .take()
                .map(|p| if p.is_relative() { dir.join(p) } else { p });
        }
        tracing::info!(path = %path.display(), "bridge.config.loaded");
        Ok(cfg)
    }

    /// Applies `DEFCON_BRIDGE_*` overrides. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        if let Some(v) = get("DEFCON_BRIDGE_OUTBOUND") {
            self.channel.outbound_path = PathBuf::from(v);
        }
        if let Some(v) = get("DEFCON_BRIDGE_INBOUND") {
            self.channel.inbound_path = PathBuf::from(v);
        }
        if let Some(v) = get("DEFCON_BRIDGE_LLM_ENDPOINT") {
            self.llm.endpoint = v;
        }
        if let Some(v) = get("DEFCON_BRIDGE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(ms) = get("DEFCON_BRIDGE_POLL_MS").and_then(|v| v.trim().parse().ok()) {
            self.turn.poll_interval_ms = ms;
        }
        if let Some(v) = get("DEFCON_BRIDGE_CONTEXTS") {
            self.turn.contexts_path = Some(PathBuf::from(v));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: BridgeConfig = ConfigLoader::parse_from_string("").unwrap();
        assert_eq!(cfg, BridgeConfig::default());
        assert_eq!(cfg.turn.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.protocol.baseline_level, 5);
        assert_eq!(cfg.protocol.correlation_seed, 1000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: BridgeConfig = ConfigLoader::parse_from_string(
            r#"
[channel]
outbound_path = "R:/input.txt"

[ack]
timeout_ms = 900
"#,
        )
        .unwrap();
        assert_eq!(cfg.channel.outbound_path, PathBuf::from("R:/input.txt"));
        assert_eq!(cfg.channel.inbound_path, PathBuf::from("output.txt"));
        assert_eq!(cfg.ack.policy().timeout, Duration::from_millis(900));
        assert_eq!(cfg.ack.policy().poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let err = ConfigLoader::parse_from_string::<BridgeConfig>("[turn\n").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse TOML"));
    }

    #[test]
    fn contexts_path_is_relative_to_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join("etc");
        std::fs::create_dir(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("bridge.toml"),
            "[turn]\ncontexts_path = \"convo.json\"\n",
        )
        .unwrap();

        let cfg = BridgeConfig::load_file(&cfg_dir.join("bridge.toml")).unwrap();
        assert_eq!(cfg.turn.contexts_path, Some(cfg_dir.join("convo.json")));
    }

    #[test]
    fn absolute_contexts_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("book.json");
        std::fs::write(
            dir.path().join("bridge.toml"),
            format!("[turn]\ncontexts_path = {:?}\n", book.display().to_string()),
        )
        .unwrap();

        let cfg = BridgeConfig::load_file(&dir.path().join("bridge.toml")).unwrap();
        assert_eq!(cfg.turn.contexts_path, Some(book));
    }

    #[test]
    fn env_overrides_skip_blank_and_unparsable_values() {
        let vars: HashMap<&str, &str> = [
            ("DEFCON_BRIDGE_INBOUND", "/tmp/out.txt"),
            ("DEFCON_BRIDGE_LLM_MODEL", "   "),
            ("DEFCON_BRIDGE_POLL_MS", "fast"),
            ("DEFCON_BRIDGE_CONTEXTS", "convo.json"),
        ]
        .into_iter()
        .collect();

        let mut cfg = BridgeConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.channel.inbound_path, PathBuf::from("/tmp/out.txt"));
        assert_eq!(cfg.llm.model, LlmConfig::default().model);
        assert_eq!(cfg.turn.poll_interval_ms, 1_000);
        assert_eq!(cfg.turn.contexts_path, Some(PathBuf::from("convo.json")));
    }
}
