use std::future::Future;
use std::pin::Pin;

use super::prompt::{ChatMessage, build_messages};
use super::r#loop::TurnLoop;
use crate::error::BridgeError;
use crate::session::BridgeSession;
use crate::wire::Verb;

/// Written when a response contains no recognized command, so the simulation can tell "the
/// agent had nothing to do" from "nothing was ever sent".
pub const PLACEHOLDER_LINE: &str = "";

/// The external decision-maker: role-tagged messages in, free text out.
pub trait DecisionMaker: Send + Sync {
    fn decide<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// At least one recognized command line. `dropped` counts recognized lines whose write
    /// failed.
    Dispatched {
        written: Vec<String>,
        rejected: Vec<String>,
        dropped: usize,
    },
    /// Nothing recognized; the placeholder line was appended instead.
    Placeholder { rejected: Vec<String> },
    /// The decision-maker failed or returned nothing; no command was written.
    Skipped { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedResponse {
    pub recognized: Vec<(Verb, String)>,
    pub rejected: Vec<String>,
}

/// Splits model output into lines and sorts them by the verb prefix table. Blank lines are
/// neither recognized nor rejected.
pub fn classify_response(raw: &str) -> ClassifiedResponse {
    let mut out = ClassifiedResponse::default();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Verb::classify(line) {
            Some(verb) => out.recognized.push((verb, line.to_string())),
            None => out.rejected.push(line.to_string()),
        }
    }
    out
}

/// Writes recognized lines verbatim, or the placeholder if there were none.
pub async fn dispatch(session: &BridgeSession, raw: &str) -> TurnOutcome {
    let ClassifiedResponse {
        recognized,
        rejected,
    } = classify_response(raw);

    for line in &rejected {
        tracing::warn!(line = %line, "bridge.turn.rejected_line");
    }

    if recognized.is_empty() {
        tracing::info!("bridge.turn.no_commands");
        if let Err(err) = session.append_raw(PLACEHOLDER_LINE).await {
            tracing::warn!(error = %err, "bridge.turn.placeholder_dropped");
        }
        return TurnOutcome::Placeholder { rejected };
    }

    let mut written = Vec::with_capacity(recognized.len());
    let mut dropped = 0;
    for (verb, line) in recognized {
        match session.append_raw(&line).await {
            Ok(()) => {
                tracing::info!(verb = verb.op_name(), line = %line, "bridge.turn.dispatched");
                written.push(line);
            }
            Err(err) => {
                tracing::warn!(verb = verb.op_name(), line = %line, error = %err, "bridge.command.dropped");
                dropped += 1;
            }
        }
    }

    TurnOutcome::Dispatched {
        written,
        rejected,
        dropped,
    }
}

/// One decide-and-dispatch pass over the full inbound `content`.
///
/// Does not wait or sleep; [`TurnLoop`] owns the cadence. A decision failure is recorded in
/// history and returned as [`TurnOutcome::Skipped`], never raised.
pub async fn tick(agent: &mut TurnLoop, llm: &dyn DecisionMaker, content: &str) -> TurnOutcome {
    let snapshot = agent.session.observe(content);
    let level = agent.session.level();
    let (context_level, ctx) = agent.contexts.select(level);
    tracing::info!(level, context_level, "bridge.turn.start");

    let messages = build_messages(ctx, &agent.history, &snapshot.text);

    let raw = match llm.decide(messages).await {
        Ok(raw) if raw.trim().is_empty() => {
            Err(BridgeError::DecisionFailure("empty response".to_string()))
        }
        Ok(raw) => Ok(raw),
        Err(err) => Err(BridgeError::DecisionFailure(format!("{err:#}"))),
    };
    let raw = match raw {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "bridge.turn.skipped");
            let reason = err.to_string();
            agent.history.record_failure(reason.clone());
            return TurnOutcome::Skipped { reason };
        }
    };

    let outcome = dispatch(&agent.session, &raw).await;
    agent.history.last_rejected = match &outcome {
        TurnOutcome::Dispatched { rejected, .. } | TurnOutcome::Placeholder { rejected } => {
            rejected.clone()
        }
        TurnOutcome::Skipped { .. } => Vec::new(),
    };
    agent.history.record(level, snapshot.text, raw);
    outcome
}
