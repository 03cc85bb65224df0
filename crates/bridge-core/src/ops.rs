//! Named, typed operations: one per recognized verb.
//!
//! Each operation builds a [`Command`], hands it to [`BridgeSession::issue`] and returns the
//! structured [`DispatchOutcome`]. Arguments are typed here but not checked against the
//! simulation's grammar; a bad command is reported back through the result channel.

use crate::session::{BridgeSession, DispatchOutcome, IssueOptions};
use crate::wire::{Arg, Command, ShipKind, StructureKind, Verb, VoteChoice};

/// Token the simulation's script host reads as "no value".
const NIL: &str = "nil";

impl Command {
    pub fn log_message(message: &str) -> Self {
        Self::new(Verb::LogMessage, vec![Arg::str(message)])
    }

    pub fn send_chat(message: &str) -> Self {
        Self::new(Verb::SendChat, vec![Arg::str(message)])
    }

    pub fn place_structure(longitude: f64, latitude: f64, kind: StructureKind) -> Self {
        Self::new(
            Verb::PlaceStructure,
            vec![longitude.into(), latitude.into(), Arg::str(kind.as_str())],
        )
    }

    /// The simulation accepts between one and six ships per fleet.
    pub fn place_fleet(longitude: f64, latitude: f64, ships: &[ShipKind]) -> Self {
        let mut args: Vec<Arg> = vec![longitude.into(), latitude.into()];
        args.extend(ships.iter().map(|s| Arg::str(s.as_str())));
        Self::new(Verb::PlaceFleet, args)
    }

    pub fn draw_line(from: (f64, f64), to: (f64, f64)) -> Self {
        Self::new(
            Verb::DrawLine,
            vec![from.0.into(), from.1.into(), to.0.into(), to.1.into()],
        )
    }

    pub fn clear_board() -> Self {
        Self::new(Verb::ClearBoard, vec![])
    }

    pub fn launch_strike(silo_id: &str, longitude: f64, latitude: f64) -> Self {
        Self::new(
            Verb::LaunchStrike,
            vec![Arg::ident(silo_id), longitude.into(), latitude.into()],
        )
    }

    pub fn set_defensive(silo_id: &str) -> Self {
        Self::new(Verb::SetDefensive, vec![Arg::ident(silo_id)])
    }

    pub fn move_unit(unit_id: &str, longitude: f64, latitude: f64) -> Self {
        Self::new(
            Verb::MoveUnit,
            vec![Arg::ident(unit_id), longitude.into(), latitude.into()],
        )
    }

    pub fn set_target(unit_id: &str, target_id: Option<&str>, longitude: f64, latitude: f64) -> Self {
        Self::new(
            Verb::SetTarget,
            vec![
                Arg::ident(unit_id),
                Arg::ident(target_id.unwrap_or(NIL)),
                longitude.into(),
                latitude.into(),
            ],
        )
    }

    pub fn set_landing(unit_id: &str, target_id: &str) -> Self {
        Self::new(
            Verb::SetLanding,
            vec![Arg::ident(unit_id), Arg::ident(target_id)],
        )
    }

    pub fn set_unit_state(unit_id: &str, state: i64) -> Self {
        Self::new(Verb::SetUnitState, vec![Arg::ident(unit_id), state.into()])
    }

    pub fn diplomatic_request(alliance_id: i64) -> Self {
        Self::new(Verb::DiplomaticRequest, vec![alliance_id.into()])
    }

    pub fn vote(vote_id: i64, choice: VoteChoice) -> Self {
        Self::new(Verb::Vote, vec![vote_id.into(), Arg::str(choice.as_str())])
    }
}

impl BridgeSession {
    pub async fn log_message(&self, message: &str, opts: IssueOptions) -> DispatchOutcome {
        self.issue(Command::log_message(message), opts).await
    }

    pub async fn send_chat(&self, message: &str, opts: IssueOptions) -> DispatchOutcome {
        self.issue(Command::send_chat(message), opts).await
    }

    pub async fn place_structure(
        &self,
        longitude: f64,
        latitude: f64,
        kind: StructureKind,
        opts: IssueOptions,
    ) -> DispatchOutcome {
        self.issue(Command::place_structure(longitude, latitude, kind), opts)
            .await
    }

    pub async fn place_fleet(
        &self,
        longitude: f64,
        latitude: f64,
        ships: &[ShipKind],
        opts: IssueOptions,
    ) -> DispatchOutcome {
        self.issue(Command::place_fleet(longitude, latitude, ships), opts)
            .await
    }

    pub async fn draw_line(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        opts: IssueOptions,
    ) -> DispatchOutcome {
        self.issue(Command::draw_line(from, to), opts).await
    }

    pub async fn clear_board(&self, opts: IssueOptions) -> DispatchOutcome {
        self.issue(Command::clear_board(), opts).await
    }

    pub async fn launch_strike(
        &self,
        silo_id: &str,
        longitude: f64,
        latitude: f64,
        opts: IssueOptions,
    ) -> DispatchOutcome {
        self.issue(Command::launch_strike(silo_id, longitude, latitude), opts)
            .await
    }

    pub async fn set_defensive(&self, silo_id: &str, opts: IssueOptions) -> DispatchOutcome {
        self.issue(Command::set_defensive(silo_id), opts).await
    }

    pub async fn move_unit(
        &self,
        unit_id: &str,
        longitude: f64,
        latitude: f64,
        opts: IssueOptions,
    ) -> DispatchOutcome {
        self.issue(Command::move_unit(unit_id, longitude, latitude), opts)
            .await
    }

    pub async fn set_target(
        &self,
        unit_id: &str,
        target_id: Option<&str>,
        longitude: f64,
        latitude: f64,
        opts: IssueOptions,
    ) -> DispatchOutcome {
        self.issue(
            Command::set_target(unit_id, target_id, longitude, latitude),
            opts,
        )
        .await
    }

    pub async fn set_landing(
        &self,
        unit_id: &str,
        target_id: &str,
        opts: IssueOptions,
    ) -> DispatchOutcome {
        self.issue(Command::set_landing(unit_id, target_id), opts).await
    }

    pub async fn set_unit_state(
        &self,
        unit_id: &str,
        state: i64,
        opts: IssueOptions,
    ) -> DispatchOutcome {
        self.issue(Command::set_unit_state(unit_id, state), opts).await
    }

    pub async fn diplomatic_request(&self, alliance_id: i64, opts: IssueOptions) -> DispatchOutcome {
        self.issue(Command::diplomatic_request(alliance_id), opts).await
    }

    pub async fn vote(&self, vote_id: i64, choice: VoteChoice, opts: IssueOptions) -> DispatchOutcome {
        self.issue(Command::vote(vote_id, choice), opts).await
    }
}
