use std::time::Duration;

use super::harness::{DecisionMaker, TurnOutcome, tick};
use super::memory::ConversationHistory;
use super::prompt::{DecisionContexts, build_messages, render_messages_json};
use crate::channel::ReadOutcome;
use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::session::BridgeSession;

/// Single logical turn-taker: wait for state, decide, dispatch, repeat.
///
/// Turns never overlap; every wait is a real `tokio` sleep, so dropping the future between
/// polls is always safe.
#[derive(Debug)]
pub struct TurnLoop {
    pub session: BridgeSession,
    pub contexts: DecisionContexts,
    pub history: ConversationHistory,
    pub poll_interval: Duration,
    pub cooldown: Duration,
}

impl TurnLoop {
    pub fn new(session: BridgeSession, contexts: DecisionContexts) -> Self {
        Self {
            session,
            contexts,
            history: ConversationHistory::default(),
            poll_interval: Duration::from_secs(1),
            cooldown: Duration::from_secs(1),
        }
    }

    pub fn from_config(cfg: &BridgeConfig, contexts: DecisionContexts) -> BridgeResult<Self> {
        let session = BridgeSession::from_config(cfg)?;
        Ok(Self {
            session,
            contexts,
            history: ConversationHistory::with_limit(cfg.turn.history_turns),
            poll_interval: cfg.turn.poll_interval(),
            cooldown: cfg.turn.cooldown(),
        })
    }

    /// Polls the inbound file until new bytes arrive, then returns its full content.
    ///
    /// Truncation and read failures count as "no new data". If the full re-read fails after
    /// the cursor has moved, the new bytes alone stand in for the content.
    pub async fn wait_for_state(&mut self) -> String {
        let mut failing = false;
        loop {
            match self.session.read_new_bytes().await {
                Ok(ReadOutcome::Data(bytes)) => {
                    tracing::info!(bytes = bytes.len(), "bridge.turn.state_received");
                    let full = self.session.channel().read_all().await;
                    return full_or_delta(full, &bytes);
                }
                Ok(ReadOutcome::Truncated { .. }) => {
                    // The channel already moved its cursor and logged; keep waiting.
                    failing = false;
                }
                Ok(ReadOutcome::NoNewData) => failing = false,
                Err(err) => {
                    if !failing {
                        tracing::warn!(error = %err, "bridge.channel.read_failed");
                    }
                    failing = true;
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One full turn: wait for state, then decide and dispatch.
    pub async fn turn(&mut self, llm: &dyn DecisionMaker) -> TurnOutcome {
        let content = self.wait_for_state().await;
        tick(self, llm, &content).await
    }

    /// Runs turns until the future is dropped.
    pub async fn run(&mut self, llm: &dyn DecisionMaker) {
        loop {
            let outcome = self.turn(llm).await;
            tracing::debug!(?outcome, turns = self.history.len(), "bridge.turn.done");
            tokio::time::sleep(self.cooldown).await;
        }
    }

    /// Message list the decision-maker would get for the current file contents, as pretty
    /// JSON. Does not call the decision-maker or touch the cursor.
    pub async fn preview_prompt(&mut self) -> BridgeResult<String> {
        let snapshot = self.session.game_state().await?;
        let (_, ctx) = self.contexts.select(self.session.level());
        let messages = build_messages(ctx, &self.history, &snapshot.text);
        Ok(render_messages_json(&messages))
    }
}

/// Full inbound content, or `delta` alone when the re-read failed. The cursor is already
/// past `delta`.
fn full_or_delta(full: BridgeResult<String>, delta: &[u8]) -> String {
    match full {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(error = %err, bytes = delta.len(), "bridge.turn.state_read_failed");
            String::from_utf8_lossy(delta).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use super::*;
    use crate::agent::harness::tests::FakeLlm;
    use crate::state::{DEFAULT_END_MARKER, DEFAULT_START_MARKER};

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    fn fast_loop(dir: &tempfile::TempDir) -> TurnLoop {
        let mut cfg = BridgeConfig::default();
        cfg.channel.outbound_path = dir.path().join("input.txt");
        cfg.channel.inbound_path = dir.path().join("output.txt");
        cfg.turn.poll_interval_ms = 10;
        cfg.turn.cooldown_ms = 10;
        TurnLoop::from_config(&cfg, DecisionContexts::builtin(5)).unwrap()
    }

    #[tokio::test]
    async fn wait_for_state_survives_missing_file_and_returns_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = fast_loop(&dir);
        let inbound = dir.path().join("output.txt");

        let writer = {
            let inbound = inbound.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                append(&inbound, "first\n");
            })
        };
        let content = agent.wait_for_state().await;
        writer.await.unwrap();
        assert_eq!(content, "first\n");

        append(&inbound, "second\n");
        let content = agent.wait_for_state().await;
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn failed_full_read_falls_back_to_new_bytes() {
        let delta = b"=== GAME STATE START ===\nDEFCON level: 3\n=== GAME STATE END ===\n";
        let err = crate::error::BridgeError::read(
            "output.txt",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let content = full_or_delta(Err(err), delta);
        assert_eq!(content.as_bytes(), delta);

        assert_eq!(full_or_delta(Ok("whole file".to_string()), delta), "whole file");
    }

    #[tokio::test]
    async fn truncation_is_not_treated_as_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = fast_loop(&dir);
        let inbound = dir.path().join("output.txt");
        append(&inbound, "0123456789\n");
        let _ = agent.wait_for_state().await;

        std::fs::write(&inbound, "abc").unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(100), agent.wait_for_state()).await;
        assert!(waited.is_err(), "truncation must not end the wait");
        assert_eq!(agent.session.channel().cursor(), 3);

        append(&inbound, "d");
        let content = agent.wait_for_state().await;
        assert_eq!(content, "abcd");
    }

    #[tokio::test]
    async fn run_keeps_turning_after_a_failed_decision() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = fast_loop(&dir);
        agent.session.start().await.unwrap();
        let inbound = dir.path().join("output.txt");
        let llm = FakeLlm::default();
        llm.push_error("boom");
        llm.push_response("WhiteboardClear()");

        append(
            &inbound,
            &format!("{DEFAULT_START_MARKER}\nDEFCON level: 5\n{DEFAULT_END_MARKER}\n"),
        );
        let feeder = {
            let inbound = inbound.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                append(
                    &inbound,
                    &format!("{DEFAULT_START_MARKER}\nDEFCON level: 4\n{DEFAULT_END_MARKER}\n"),
                );
            })
        };

        let _ = tokio::time::timeout(Duration::from_millis(400), agent.run(&llm)).await;
        feeder.await.unwrap();

        assert_eq!(llm.prompt_count(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("input.txt")).unwrap(),
            "WhiteboardClear()\n"
        );
        assert_eq!(agent.history.len(), 1);
        assert_eq!(agent.session.level(), 4);
    }

    #[tokio::test]
    async fn preview_prompt_renders_without_calling_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = fast_loop(&dir);
        append(
            &dir.path().join("output.txt"),
            &format!("{DEFAULT_START_MARKER}\nDEFCON level: 2\nunits...\n{DEFAULT_END_MARKER}\n"),
        );

        let json = agent.preview_prompt().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        let msgs = v.as_array().unwrap();
        assert_eq!(msgs[0]["role"], "system");
        assert!(msgs[1]["content"].as_str().unwrap().contains("units..."));
        assert_eq!(agent.session.level(), 2);
        assert_eq!(agent.session.channel().cursor(), 0);
    }
}
