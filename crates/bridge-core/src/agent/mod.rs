//! Turn loop: wait for simulation state, ask the decision-maker, dispatch recognized commands.
//!
//! `harness` holds the single decide-and-dispatch pass and the [`DecisionMaker`] seam; `loop`
//! owns the cadence; `prompt` and `memory` build what the decision-maker sees.

pub mod harness;
pub mod r#loop;
pub mod memory;
pub mod prompt;

pub use harness::{DecisionMaker, TurnOutcome, classify_response, dispatch, tick};
pub use memory::ConversationHistory;
pub use prompt::{AnalysisPrompt, ChatMessage, DecisionContext, DecisionContexts, Role};
pub use r#loop::TurnLoop;
