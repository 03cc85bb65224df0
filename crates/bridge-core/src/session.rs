//! The bridge session: one owner for the channel cursor, the correlation counter, the current
//! level and the event watermark. Everything that touches process-wide protocol state goes
//! through a `&BridgeSession`/`&mut BridgeSession`, so independent sessions never interfere.

use serde::Serialize;

use crate::channel::{Channel, ReadOutcome};
use crate::config::BridgeConfig;
use crate::correlation::{self, CommandResult, CorrelationCounter, WaitPolicy};
use crate::error::BridgeResult;
use crate::state::{Event, Snapshot, StateExtractor, extract_events};
use crate::wire::Command;

/// How long [`BridgeSession::issue`] waits for an acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitMode {
    /// Return right after the write; look the id up later.
    FireAndForget,
    /// Use the session's configured policy.
    #[default]
    SessionDefault,
    Custom(WaitPolicy),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueOptions {
    /// Caller-supplied id. A fresh one is drawn from the counter when unset.
    pub correlation_id: Option<u64>,
    pub wait: WaitMode,
}

impl IssueOptions {
    pub fn fire_and_forget() -> Self {
        Self {
            correlation_id: None,
            wait: WaitMode::FireAndForget,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_wait(mut self, policy: WaitPolicy) -> Self {
        self.wait = WaitMode::Custom(policy);
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub correlation_id: u64,
    pub dispatched: bool,
    /// The exact line written (or attempted).
    pub line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct BridgeSession {
    channel: Channel,
    extractor: StateExtractor,
    counter: CorrelationCounter,
    level: u32,
    event_watermark: u64,
    wait: WaitPolicy,
}

impl BridgeSession {
    pub fn new(
        channel: Channel,
        extractor: StateExtractor,
        counter: CorrelationCounter,
        baseline_level: u32,
        wait: WaitPolicy,
    ) -> Self {
        Self {
            channel,
            extractor,
            counter,
            level: baseline_level,
            event_watermark: 0,
            wait,
        }
    }

    pub fn from_config(cfg: &BridgeConfig) -> BridgeResult<Self> {
        let extractor = StateExtractor::new(
            cfg.protocol.state_start_marker.clone(),
            cfg.protocol.state_end_marker.clone(),
            &cfg.protocol.level_label,
        )?;
        Ok(Self::new(
            Channel::new(
                cfg.channel.outbound_path.clone(),
                cfg.channel.inbound_path.clone(),
            ),
            extractor,
            CorrelationCounter::new(cfg.protocol.correlation_seed),
            cfg.protocol.baseline_level,
            cfg.ack.policy(),
        ))
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn level_text(&self) -> String {
        format!("Current DEFCON level: {}", self.level)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    /// Clears stale commands from a previous session. Call once before the first turn.
    pub async fn start(&self) -> BridgeResult<()> {
        self.channel.reset_outbound().await
    }

    pub async fn read_new_bytes(&mut self) -> BridgeResult<ReadOutcome> {
        self.channel.read_new_bytes().await
    }

    /// Extracts the latest snapshot from full inbound `content` and updates the level when
    /// the snapshot announces one. A snapshot without a level leaves the level untouched.
    pub fn observe(&mut self, content: &str) -> Snapshot {
        let snapshot = self.extractor.snapshot(content);
        if snapshot.is_degraded() {
            tracing::warn!(bytes = snapshot.text.len(), "bridge.state.degraded");
        } else {
            tracing::debug!(bytes = snapshot.text.len(), "bridge.state.snapshot");
        }

        if let Some(level) = self.extractor.level(&snapshot.text) {
            if level != self.level {
                tracing::info!(from = self.level, to = level, "bridge.state.level_changed");
            }
            self.level = level;
        }
        snapshot
    }

    /// Reads the whole inbound file and returns its latest snapshot.
    pub async fn game_state(&mut self) -> BridgeResult<Snapshot> {
        let content = self.channel.read_all().await?;
        Ok(self.observe(&content))
    }

    /// Events with an id strictly above `watermark`.
    pub async fn events_after(&self, watermark: u64) -> BridgeResult<Vec<Event>> {
        let content = self.channel.read_all().await?;
        Ok(extract_events(&content, watermark))
    }

    /// Events not yet returned by this method, tracked with the session's own watermark.
    pub async fn poll_new_events(&mut self) -> BridgeResult<Vec<Event>> {
        let events = self.events_after(self.event_watermark).await?;
        if let Some(max) = events.iter().map(|e| e.id).max() {
            self.event_watermark = max;
        }
        Ok(events)
    }

    pub fn event_watermark(&self) -> u64 {
        self.event_watermark
    }

    pub fn next_correlation_id(&self) -> u64 {
        self.counter.next_id()
    }

    /// Appends a line as-is, without a correlation id.
    pub async fn append_raw(&self, line: &str) -> BridgeResult<()> {
        self.channel.append_command(line).await
    }

    /// Tags `command` with a correlation id, writes it, and optionally waits for the result.
    ///
    /// A write failure is reported in the outcome (`dispatched: false`), never raised.
    pub async fn issue(&self, command: Command, opts: IssueOptions) -> DispatchOutcome {
        let correlation_id = opts
            .correlation_id
            .or(command.correlation_id)
            .unwrap_or_else(|| self.counter.next_id());
        let line = command.with_correlation(correlation_id).to_line();

        if let Err(err) = self.channel.append_command(&line).await {
            tracing::warn!(correlation_id, line = %line, error = %err, "bridge.command.dropped");
            return DispatchOutcome {
                correlation_id,
                dispatched: false,
                line,
                result: None,
                error: Some(err.to_string()),
            };
        }
        tracing::info!(correlation_id, line = %line, "bridge.command.sent");

        let policy = match opts.wait {
            WaitMode::FireAndForget => None,
            WaitMode::SessionDefault => Some(self.wait),
            WaitMode::Custom(policy) => Some(policy),
        };
        let result = match policy {
            Some(policy) => Some(self.await_result(correlation_id, policy).await),
            None => None,
        };

        DispatchOutcome {
            correlation_id,
            dispatched: true,
            line,
            result,
            error: None,
        }
    }

    pub async fn await_result(&self, correlation_id: u64, policy: WaitPolicy) -> CommandResult {
        correlation::await_result(&self.channel, correlation_id, policy).await
    }

    /// Bulk lookup over one scan of the inbound file.
    pub async fn lookup_results(&self, ids: &[u64]) -> BridgeResult<Vec<(u64, CommandResult)>> {
        let content = self.channel.read_all().await?;
        Ok(correlation::lookup_results(&content, ids))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::state::{DEFAULT_END_MARKER, DEFAULT_START_MARKER};
    use crate::wire::{Arg, Verb};

    fn session_in(dir: &tempfile::TempDir) -> BridgeSession {
        let mut cfg = BridgeConfig::default();
        cfg.channel.outbound_path = dir.path().join("input.txt");
        cfg.channel.inbound_path = dir.path().join("output.txt");
        cfg.ack.timeout_ms = 30;
        cfg.ack.poll_interval_ms = 5;
        BridgeSession::from_config(&cfg).unwrap()
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn level_is_stable_when_snapshot_has_no_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(&dir);
        assert_eq!(s.level(), 5);

        s.observe(&format!(
            "{DEFAULT_START_MARKER}\nDEFCON level: 3\n{DEFAULT_END_MARKER}\n"
        ));
        assert_eq!(s.level(), 3);

        s.observe(&format!(
            "{DEFAULT_START_MARKER}\nno level line\n{DEFAULT_END_MARKER}\n"
        ));
        assert_eq!(s.level(), 3);
        assert_eq!(s.level_text(), "Current DEFCON level: 3");
    }

    #[tokio::test]
    async fn game_state_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(&dir);
        append(
            s.channel().inbound_path(),
            &format!("{DEFAULT_START_MARKER}\nDEFCON level: 2\n{DEFAULT_END_MARKER}\n"),
        );
        let snap = s.game_state().await.unwrap();
        assert!(!snap.is_degraded());
        assert_eq!(s.level(), 2);
    }

    #[tokio::test]
    async fn issue_fire_and_forget_writes_tagged_line() {
        let dir = tempfile::tempdir().unwrap();
        let s = session_in(&dir);
        s.start().await.unwrap();

        let out = s
            .issue(
                Command::new(Verb::ClearBoard, vec![]),
                IssueOptions::fire_and_forget(),
            )
            .await;
        assert!(out.dispatched);
        assert_eq!(out.correlation_id, 1001);
        assert_eq!(out.result, None);
        assert_eq!(
            std::fs::read_to_string(s.channel().outbound_path()).unwrap(),
            "WhiteboardClear() -- 1001\n"
        );
    }

    #[tokio::test]
    async fn issue_honours_caller_supplied_id_and_waits() {
        let dir = tempfile::tempdir().unwrap();
        let s = session_in(&dir);
        append(
            s.channel().inbound_path(),
            "Command result: SendChat SUCCESS [ID:42]\n",
        );

        let out = s
            .issue(
                Command::new(Verb::SendChat, vec![Arg::str("gg")]),
                IssueOptions::default().with_id(42),
            )
            .await;
        assert_eq!(out.correlation_id, 42);
        assert_eq!(out.result.as_ref().and_then(|r| r.success()), Some(true));
        // The counter was not consumed.
        assert_eq!(s.next_correlation_id(), 1001);
    }

    #[tokio::test]
    async fn issue_without_ack_is_unresolved_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let s = session_in(&dir);
        let out = s
            .issue(
                Command::new(Verb::ClearBoard, vec![]),
                IssueOptions::default().with_wait(WaitPolicy {
                    timeout: Duration::from_millis(20),
                    poll_interval: Duration::from_millis(5),
                }),
            )
            .await;
        assert!(out.dispatched);
        assert_eq!(out.result, Some(CommandResult::Unresolved));

        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["correlationId"], 1001);
        assert_eq!(v["result"]["found"], false);
        assert!(v["result"].get("success").is_none());
    }

    #[tokio::test]
    async fn issue_reports_write_failure_without_raising() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = BridgeConfig::default();
        cfg.channel.outbound_path = dir.path().join("missing").join("input.txt");
        cfg.channel.inbound_path = dir.path().join("output.txt");
        let s = BridgeSession::from_config(&cfg).unwrap();

        let out = s
            .issue(
                Command::new(Verb::ClearBoard, vec![]),
                IssueOptions::fire_and_forget(),
            )
            .await;
        assert!(!out.dispatched);
        assert!(out.error.is_some());
    }

    #[tokio::test]
    async fn poll_new_events_advances_own_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(&dir);
        append(
            s.channel().inbound_path(),
            "Event #1 Hit: A [Silo] -> B [City] @ 1, 2\nEvent #2 Hit: A [Silo] -> C [City] @ 3, 4\n",
        );
        assert_eq!(s.poll_new_events().await.unwrap().len(), 2);
        assert_eq!(s.event_watermark(), 2);
        assert!(s.poll_new_events().await.unwrap().is_empty());

        append(
            s.channel().inbound_path(),
            "Event #3 Miss: A [Silo] -> D [City] @ 5, 6\n",
        );
        let newer = s.poll_new_events().await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, 3);
        assert_eq!(s.events_after(0).await.unwrap().len(), 3);
    }
}
