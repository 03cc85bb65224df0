//! File-based bridge between a DEFCON simulation and an external decision-maker.
//!
//! The simulation appends state blocks, event lines and command acknowledgements to an inbound
//! file; the bridge appends one command per line to an outbound file. [`BridgeSession`] owns
//! the cursor, the correlation counter and the current level; [`agent::TurnLoop`] drives the
//! wait/decide/dispatch cycle on top of it.

pub mod agent;
pub mod channel;
pub mod config;
pub mod correlation;
pub mod error;
pub mod llm;
pub mod ops;
pub mod session;
pub mod state;
pub mod wire;

pub use config::BridgeConfig;
pub use correlation::CommandResult;
pub use error::{BridgeError, BridgeResult};
pub use session::{BridgeSession, DispatchOutcome, IssueOptions, WaitMode};
pub use wire::{Arg, Command, Verb};
