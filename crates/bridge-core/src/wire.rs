//! Outbound command contract.
//!
//! A command is rendered as a single function-call-shaped line, optionally followed by
//! ` -- <correlation id>`:
//!
//! ```text
//! LaunchNukeFromSilo(S1, 10, 20) -- 2001
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between the call and its correlation id on an outbound line.
pub const CORRELATION_SEPARATOR: &str = " -- ";

/// Closed set of action kinds the simulation understands.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    LogMessage,
    SendChat,
    PlaceStructure,
    PlaceFleet,
    DrawLine,
    ClearBoard,
    LaunchStrike,
    SetDefensive,
    MoveUnit,
    SetTarget,
    SetLanding,
    SetUnitState,
    DiplomaticRequest,
    Vote,
}

impl Verb {
    pub const ALL: [Verb; 14] = [
        Verb::LogMessage,
        Verb::SendChat,
        Verb::PlaceStructure,
        Verb::PlaceFleet,
        Verb::DrawLine,
        Verb::ClearBoard,
        Verb::LaunchStrike,
        Verb::SetDefensive,
        Verb::MoveUnit,
        Verb::SetTarget,
        Verb::SetLanding,
        Verb::SetUnitState,
        Verb::DiplomaticRequest,
        Verb::Vote,
    ];

    /// Function name the simulation's script host dispatches on.
    pub fn wire_name(self) -> &'static str {
        match self {
            Verb::LogMessage => "DebugLog",
            Verb::SendChat => "SendChat",
            Verb::PlaceStructure => "PlaceStructure",
            Verb::PlaceFleet => "PlaceFleet",
            Verb::DrawLine => "WhiteboardDraw",
            Verb::ClearBoard => "WhiteboardClear",
            Verb::LaunchStrike => "LaunchNukeFromSilo",
            Verb::SetDefensive => "StopLaunchingNukesFromSiloAndGoDefensive",
            Verb::MoveUnit => "SetMovementTarget",
            Verb::SetTarget => "SetActionTarget",
            Verb::SetLanding => "SetLandingTarget",
            Verb::SetUnitState => "SetState",
            Verb::DiplomaticRequest => "RequestAlliance",
            Verb::Vote => "SendVote",
        }
    }

    /// Operation name exposed to callers (`launch-strike`, `clear-board`, ...).
    pub fn op_name(self) -> &'static str {
        match self {
            Verb::LogMessage => "log-message",
            Verb::SendChat => "send-chat",
            Verb::PlaceStructure => "place-structure",
            Verb::PlaceFleet => "place-fleet",
            Verb::DrawLine => "draw-line",
            Verb::ClearBoard => "clear-board",
            Verb::LaunchStrike => "launch-strike",
            Verb::SetDefensive => "set-defensive",
            Verb::MoveUnit => "move-unit",
            Verb::SetTarget => "set-target",
            Verb::SetLanding => "set-landing",
            Verb::SetUnitState => "set-unit-state",
            Verb::DiplomaticRequest => "diplomatic-request",
            Verb::Vote => "vote",
        }
    }

    /// Classifies a line of model output by its leading function name.
    pub fn classify(line: &str) -> Option<Verb> {
        Verb::ALL
            .into_iter()
            .find(|verb| line.starts_with(verb.wire_name()))
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One positional argument.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Arg {
    Bool(bool),
    Int(i64),
    Num(f64),
    /// Bare token such as a unit or silo id; rendered unquoted.
    Ident(Ident),
    Str(String),
}

/// Newtype so untagged deserialization keeps plain strings as [`Arg::Str`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Ident {
    pub ident: String,
}

impl Arg {
    pub fn ident(value: impl Into<String>) -> Self {
        Arg::Ident(Ident {
            ident: value.into(),
        })
    }

    pub fn str(value: impl Into<String>) -> Self {
        Arg::Str(value.into())
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Num(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Bool(b) => write!(f, "{b}"),
            Arg::Int(i) => write!(f, "{i}"),
            Arg::Num(n) if n.is_finite() => write!(f, "{n}"),
            // NaN/inf have no literal in the simulation's grammar.
            Arg::Num(_) => f.write_str("0"),
            Arg::Ident(id) => f.write_str(&single_line(&id.ident)),
            Arg::Str(s) => write!(f, "\"{}\"", escape_str(s)),
        }
    }
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\r' | '\n' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Command {
    pub verb: Verb,
    #[serde(default)]
    pub args: Vec<Arg>,
    #[serde(default)]
    pub correlation_id: Option<u64>,
}

impl Command {
    pub fn new(verb: Verb, args: Vec<Arg>) -> Self {
        Self {
            verb,
            args,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, id: u64) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Renders the call without the correlation suffix.
    pub fn call_text(&self) -> String {
        let args = self
            .args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({args})", self.verb.wire_name())
    }

    /// Full outbound line.
    pub fn to_line(&self) -> String {
        match self.correlation_id {
            Some(id) => format!("{}{CORRELATION_SEPARATOR}{id}", self.call_text()),
            None => self.call_text(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum StructureKind {
    RadarStation,
    Silo,
    AirBase,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum ShipKind {
    Sub,
    BattleShip,
    Carrier,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

macro_rules! wire_str_enum {
    ($ty:ty { $($variant:ident),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

wire_str_enum!(StructureKind { RadarStation, Silo, AirBase });
wire_str_enum!(ShipKind { Sub, BattleShip, Carrier });
wire_str_enum!(VoteChoice { Yes, No, Abstain });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_mixed_args_with_correlation_suffix() {
        let cmd = Command::new(
            Verb::LaunchStrike,
            vec![Arg::ident("S1"), Arg::from(10.0), Arg::from(20.0)],
        )
        .with_correlation(2001);
        assert_eq!(cmd.to_line(), "LaunchNukeFromSilo(S1, 10, 20) -- 2001");
    }

    #[test]
    fn renders_decimals_strings_and_bools() {
        let cmd = Command::new(
            Verb::PlaceStructure,
            vec![
                Arg::from(-122.25),
                Arg::from(47.5),
                Arg::str("Silo"),
                Arg::from(true),
                Arg::from(-3_i64),
            ],
        );
        assert_eq!(
            cmd.to_line(),
            "PlaceStructure(-122.25, 47.5, \"Silo\", true, -3)"
        );
    }

    #[test]
    fn strings_stay_on_one_line_and_are_escaped() {
        let cmd = Command::new(Verb::LogMessage, vec![Arg::str("say \"hi\"\nnow \\ ok")]);
        let line = cmd.to_line();
        assert!(!line.contains('\n'));
        assert_eq!(line, "DebugLog(\"say \\\"hi\\\" now \\\\ ok\")");
    }

    #[test]
    fn no_args_renders_empty_parens() {
        assert_eq!(
            Command::new(Verb::ClearBoard, vec![]).to_line(),
            "WhiteboardClear()"
        );
    }

    #[test]
    fn classify_by_prefix() {
        assert_eq!(
            Verb::classify("LaunchNukeFromSilo(S1, 10, 20)"),
            Some(Verb::LaunchStrike)
        );
        assert_eq!(
            Verb::classify("StopLaunchingNukesFromSiloAndGoDefensive(S2)"),
            Some(Verb::SetDefensive)
        );
        assert_eq!(Verb::classify("SetState(7, 1)"), Some(Verb::SetUnitState));
        assert_eq!(Verb::classify("I think we should attack"), None);
        assert_eq!(Verb::classify(" DebugLog(\"x\")"), None);
    }

    #[test]
    fn wire_names_are_unique_and_not_prefixes_of_each_other() {
        for a in Verb::ALL {
            for b in Verb::ALL {
                if a != b {
                    assert!(!b.wire_name().starts_with(a.wire_name()), "{a:?} vs {b:?}");
                }
            }
        }
    }

    #[test]
    fn enum_args_render_as_bare_names() {
        assert_eq!(StructureKind::AirBase.as_str(), "AirBase");
        assert_eq!(ShipKind::BattleShip.as_str(), "BattleShip");
        assert_eq!(VoteChoice::Abstain.as_str(), "Abstain");
    }
}
