use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::memory::ConversationHistory;
use crate::error::{BridgeError, BridgeResult};
use crate::wire::StructureKind;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Messages wrapped around the state for one level: `initial` goes before it, `prompt` after.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DecisionContext {
    #[serde(default)]
    pub initial: Vec<ChatMessage>,
    #[serde(default)]
    pub prompt: Vec<ChatMessage>,
}

const BUILTIN_PERSONA: &str = "You are playing DEFCON. Each turn you receive the current game state. \
Reply with game commands, one per line, and nothing else on those lines. Available commands:\n\
DebugLog(\"text\")\n\
SendChat(\"text\")\n\
PlaceStructure(longitude, latitude, \"RadarStation|Silo|AirBase\")\n\
PlaceFleet(longitude, latitude, \"Sub|BattleShip|Carrier\", ...)\n\
WhiteboardDraw(longitude1, latitude1, longitude2, latitude2)\n\
WhiteboardClear()\n\
LaunchNukeFromSilo(siloId, longitude, latitude)\n\
StopLaunchingNukesFromSiloAndGoDefensive(siloId)\n\
SetMovementTarget(unitId, longitude, latitude)\n\
SetActionTarget(unitId, targetId, longitude, latitude)\n\
SetLandingTarget(unitId, targetId)\n\
SetState(unitId, state)\n\
RequestAlliance(allianceId)\n\
SendVote(voteId, \"Yes|No|Abstain\")";

const BUILTIN_INSTRUCTION: &str =
    "Decide your moves for this turn. Output only command lines.";

/// Closed set of per-level contexts plus the fallback used for levels without an entry.
///
/// File format (JSON), keyed `defcon_<level>`:
/// `{ "defcon_5": { "initial": [{"role":"system","content":"..."}], "prompt": [...] } }`
#[derive(Debug, Clone)]
pub struct DecisionContexts {
    by_level: BTreeMap<u32, DecisionContext>,
    fallback_level: u32,
    fallback: DecisionContext,
}

pub fn context_key(level: u32) -> String {
    format!("defcon_{level}")
}

impl DecisionContexts {
    pub fn builtin(fallback_level: u32) -> Self {
        Self {
            by_level: BTreeMap::new(),
            fallback_level,
            fallback: DecisionContext {
                initial: vec![ChatMessage::system(BUILTIN_PERSONA)],
                prompt: vec![ChatMessage::user(BUILTIN_INSTRUCTION)],
            },
        }
    }

    pub fn from_json(text: &str, fallback_level: u32) -> BridgeResult<Self> {
        let raw: BTreeMap<String, DecisionContext> = serde_json::from_str(text)
            .map_err(|e| BridgeError::Config(format!("decision contexts: {e}")))?;

        let mut by_level = BTreeMap::new();
        for (key, ctx) in raw {
            match key.strip_prefix("defcon_").and_then(|n| n.parse::<u32>().ok()) {
                Some(level) => {
                    by_level.insert(level, ctx);
                }
                None => tracing::warn!(key = %key, "bridge.contexts.unknown_key"),
            }
        }

        let fallback = by_level.get(&fallback_level).cloned().ok_or_else(|| {
            BridgeError::Config(format!(
                "decision contexts: missing fallback entry {}",
                context_key(fallback_level)
            ))
        })?;
        Ok(Self {
            by_level,
            fallback_level,
            fallback,
        })
    }

    pub fn load(path: &Path, fallback_level: u32) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read decision contexts at {}", path.display()))?;
        Self::from_json(&text, fallback_level)
            .with_context(|| format!("Failed to load decision contexts at {}", path.display()))
    }

    /// Context for `level`, and the level whose entry was actually used.
    pub fn select(&self, level: u32) -> (u32, &DecisionContext) {
        match self.by_level.get(&level) {
            Some(ctx) => (level, ctx),
            None => (self.fallback_level, &self.fallback),
        }
    }

    pub fn levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_level.keys().copied()
    }
}

/// `initial ++ history ++ [user: snapshot] ++ prompt`
pub fn build_messages(
    ctx: &DecisionContext,
    history: &ConversationHistory,
    snapshot: &str,
) -> Vec<ChatMessage> {
    let mut messages = ctx.initial.clone();
    messages.extend(history.messages());
    messages.push(ChatMessage::user(snapshot));
    messages.extend(ctx.prompt.iter().cloned());
    messages
}

pub fn render_messages_json(messages: &[ChatMessage]) -> String {
    serde_json::to_string_pretty(messages).unwrap_or_else(|_| "[]".to_string())
}

/// One-shot advisory prompts that are not part of the turn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPrompt {
    AnalyzeGameState,
    SuggestStructurePlacement(StructureKind),
    SuggestNukeTargets,
}

impl AnalysisPrompt {
    pub fn messages(self, state: &str) -> Vec<ChatMessage> {
        match self {
            AnalysisPrompt::AnalyzeGameState => vec![
                ChatMessage::system(
                    "You are a strategic AI assistant for the game DEFCON. Analyze the current game state and suggest optimal moves.",
                ),
                ChatMessage::user(format!(
                    "Please analyze the current game state and suggest strategic moves:\n\n{state}"
                )),
            ],
            AnalysisPrompt::SuggestStructurePlacement(kind) => vec![
                ChatMessage::system(
                    "You are a strategic AI assistant for the game DEFCON. Suggest optimal structure placements.",
                ),
                ChatMessage::user(format!(
                    "Based on the current game state, suggest optimal locations to place {} structures:\n\n{state}",
                    kind.as_str()
                )),
            ],
            AnalysisPrompt::SuggestNukeTargets => vec![
                ChatMessage::system(
                    "You are a strategic AI assistant for the game DEFCON. Suggest optimal nuclear strike targets.",
                ),
                ChatMessage::user(format!(
                    "Based on the current game state, suggest optimal targets for nuclear strikes:\n\n{state}"
                )),
            ],
        }
    }
}
