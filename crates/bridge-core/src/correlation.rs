//! Correlation ids and acknowledgement lookup.
//!
//! Every issued command can carry an id. Some time after consuming it the simulation appends
//! `Command result: <...> [ID:<n>]`, with `SUCCESS` somewhere on the line when it worked.
//! Matching is on the parsed integer inside `[ID:...]`, so id 20 never matches `[ID:200]`.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::channel::Channel;
use crate::wire::{Arg, Command, Verb};

/// Ids at or below this value are left for externally supplied identifiers.
pub const DEFAULT_CORRELATION_SEED: u64 = 1000;

pub const ACK_MARKER: &str = "Command result:";
pub const SUCCESS_MARKER: &str = "SUCCESS";

static ACK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ID:(\d+)\]").expect("invalid ack id pattern"));

/// `SUCCESS` as a whole word, so `UNSUCCESSFUL` is a failure.
static SUCCESS_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b{}\b", regex::escape(SUCCESS_MARKER)))
        .expect("invalid success pattern")
});

/// Monotonic id source. Ids are never reused for the lifetime of the counter.
#[derive(Debug)]
pub struct CorrelationCounter {
    last: AtomicU64,
}

impl Default for CorrelationCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_SEED)
    }
}

impl CorrelationCounter {
    /// The first id handed out is `seed + 1`.
    pub fn new(seed: u64) -> Self {
        Self {
            last: AtomicU64::new(seed),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn last_issued(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

pub fn format_command(verb: Verb, args: &[Arg], correlation_id: u64) -> String {
    Command::new(verb, args.to_vec())
        .with_correlation(correlation_id)
        .to_line()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Acknowledgement {
    pub correlation_id: u64,
    pub success: bool,
    pub raw: String,
}

/// Outcome of looking up a command. `Unresolved` means "check again later"; it is never a
/// success and never a failure.
///
/// Serialized as `{found, success?, raw?}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(from = "ResultView", into = "ResultView")]
pub enum CommandResult {
    Succeeded { raw: String },
    Failed { raw: String },
    Unresolved,
}

impl CommandResult {
    pub fn found(&self) -> bool {
        !matches!(self, CommandResult::Unresolved)
    }

    pub fn success(&self) -> Option<bool> {
        match self {
            CommandResult::Succeeded { .. } => Some(true),
            CommandResult::Failed { .. } => Some(false),
            CommandResult::Unresolved => None,
        }
    }

    pub fn raw(&self) -> Option<&str> {
        match self {
            CommandResult::Succeeded { raw } | CommandResult::Failed { raw } => Some(raw),
            CommandResult::Unresolved => None,
        }
    }
}

#[derive(Deserialize, Serialize)]
struct ResultView {
    found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

impl From<CommandResult> for ResultView {
    fn from(result: CommandResult) -> Self {
        Self {
            found: result.found(),
            success: result.success(),
            raw: match result {
                CommandResult::Succeeded { raw } | CommandResult::Failed { raw } => Some(raw),
                CommandResult::Unresolved => None,
            },
        }
    }
}

impl From<ResultView> for CommandResult {
    fn from(view: ResultView) -> Self {
        let raw = view.raw.unwrap_or_default();
        match (view.found, view.success) {
            (false, _) => CommandResult::Unresolved,
            (true, Some(true)) => CommandResult::Succeeded { raw },
            (true, _) => CommandResult::Failed { raw },
        }
    }
}

impl From<Option<Acknowledgement>> for CommandResult {
    fn from(ack: Option<Acknowledgement>) -> Self {
        match ack {
            Some(ack) if ack.success => CommandResult::Succeeded { raw: ack.raw },
            Some(ack) => CommandResult::Failed { raw: ack.raw },
            None => CommandResult::Unresolved,
        }
    }
}

fn parse_ack_line(line: &str) -> impl Iterator<Item = Acknowledgement> + '_ {
    let is_ack = line.contains(ACK_MARKER);
    ACK_ID
        .captures_iter(line)
        .filter(move |_| is_ack)
        .filter_map(move |caps| {
            let correlation_id = caps[1].parse::<u64>().ok()?;
            Some(Acknowledgement {
                correlation_id,
                success: SUCCESS_TOKEN.is_match(line),
                raw: line.trim_end().to_string(),
            })
        })
}

/// First acknowledgement line for `correlation_id` in `content`.
pub fn find_acknowledgement(content: &str, correlation_id: u64) -> Option<Acknowledgement> {
    content
        .lines()
        .flat_map(parse_ack_line)
        .find(|ack| ack.correlation_id == correlation_id)
}

/// Indexes every acknowledgement in `content` by id; the first line for an id wins.
pub fn index_acknowledgements(content: &str) -> HashMap<u64, Acknowledgement> {
    let mut index = HashMap::new();
    for ack in content.lines().flat_map(parse_ack_line) {
        index.entry(ack.correlation_id).or_insert(ack);
    }
    index
}

/// Resolves a batch of ids against one scan of `content`. Unmatched ids come back as
/// [`CommandResult::Unresolved`]; the batch itself never fails.
pub fn lookup_results(content: &str, ids: &[u64]) -> Vec<(u64, CommandResult)> {
    let mut index = index_acknowledgements(content);
    ids.iter()
        .map(|id| (*id, CommandResult::from(index.remove(id))))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Polls the full inbound file until an acknowledgement for `correlation_id` shows up or the
/// timeout elapses. Always checks at least once; read failures count as "not yet".
pub async fn await_result(
    channel: &Channel,
    correlation_id: u64,
    policy: WaitPolicy,
) -> CommandResult {
    let deadline = Instant::now() + policy.timeout;
    loop {
        match channel.read_all().await {
            Ok(content) => {
                if let Some(ack) = find_acknowledgement(&content, correlation_id) {
                    tracing::debug!(
                        correlation_id,
                        success = ack.success,
                        "bridge.correlation.resolved"
                    );
                    return CommandResult::from(Some(ack));
                }
            }
            Err(err) => {
                tracing::debug!(correlation_id, error = %err, "bridge.correlation.read_failed");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::info!(correlation_id, "bridge.correlation.unresolved");
            return CommandResult::Unresolved;
        }
        tokio::time::sleep(policy.poll_interval.min(deadline - now)).await;
    }
}
