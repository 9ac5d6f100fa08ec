use super::team::{TeamColor, TeamRoster};
use super::timer::Timer;
use crate::arena::Arena;
use crate::config::{COUNTDOWN_FROM, ROUND_END_DELAY, SETTLE_DELAY};
use crate::kit::{Kit, Loadout};
use crate::server::{BlockKind, BlockPos, Lobby, ServerBridge};
use crate::types::{BracketMatchId, GameId, InstanceId, ParticipantId, Tick, SECONDS};
use std::collections::{HashMap, HashSet};
use strum::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Setup,
    Countdown,
    Running,
    End,
}

/// Emitted by [`Game::tick`] when a series is decided, so the orchestrator
/// can report the result and tear the instance down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesResult {
    pub winner: TeamColor,
    pub loser: TeamColor,
    pub winner_score: u32,
    pub loser_score: u32,
    /// True when the series ended on a finished round rather than on a
    /// disconnect or walkout.
    pub finished_round: bool,
}

#[derive(Debug, Clone, Copy)]
enum Deferred {
    CountdownStep,
    BeginRound,
    FinishRound { winner: TeamColor },
    FinishSeries { winner: TeamColor },
    HideSpectator(ParticipantId),
}

/// A single live contest inside its own arena instance. All transitions are
/// driven by [`Game::tick`] with the current time, so the whole round flow
/// can be stepped deterministically.
pub struct Game {
    id: GameId,
    instance: InstanceId,
    arena: Arena,
    kit: Kit,
    needed_wins: u32,
    bracket_match: Option<BracketMatchId>,

    state: GameState,
    roster: TeamRoster,
    spectators: HashSet<ParticipantId>,
    round: u32,
    countdown: u8,
    timer: Timer,
    // Original kind of every block mutated during play, first write wins.
    blocks: HashMap<BlockPos, BlockKind>,
    deferred: Vec<(Tick, Deferred)>,
    results: Vec<SeriesResult>,
}

impl Game {
    pub fn new(
        id: GameId,
        instance: InstanceId,
        arena: Arena,
        kit: Kit,
        needed_wins: u32,
        bracket_match: Option<BracketMatchId>,
    ) -> Self {
        Self {
            id,
            instance,
            arena,
            kit,
            needed_wins,
            bracket_match,
            state: GameState::Setup,
            roster: TeamRoster::default(),
            spectators: HashSet::new(),
            round: 0,
            countdown: 0,
            timer: Timer::default(),
            blocks: HashMap::new(),
            deferred: vec![],
            results: vec![],
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn kit(&self) -> &Kit {
        &self.kit
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn bracket_match(&self) -> Option<BracketMatchId> {
        self.bracket_match
    }

    pub fn roster(&self) -> &TeamRoster {
        &self.roster
    }

    pub fn members(&self) -> Vec<ParticipantId> {
        self.roster.members()
    }

    pub fn spectators(&self) -> &HashSet<ParticipantId> {
        &self.spectators
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.roster.team_of(id).is_some() || self.spectators.contains(&id)
    }

    pub fn add_team(&mut self, name: String, members: Vec<ParticipantId>) -> Option<TeamColor> {
        self.roster.create_team(name, members)
    }

    fn broadcast(&self, server: &dyn ServerBridge, message: &str) {
        for id in self.members() {
            server.send_message(id, message);
        }
        for id in self.spectators.iter() {
            server.send_message(*id, message);
        }
    }

    fn schedule(&mut self, at: Tick, action: Deferred) {
        self.deferred.push((at, action));
    }

    /// Advance every deferred transition that is due, in order. Returns the
    /// series results decided since the last call.
    pub fn tick(&mut self, server: &dyn ServerBridge, now: Tick) -> Vec<SeriesResult> {
        loop {
            let due = self
                .deferred
                .iter()
                .enumerate()
                .filter(|(_, (at, _))| *at <= now)
                .min_by_key(|(_, (at, _))| *at)
                .map(|(index, _)| index);
            let Some(index) = due else {
                break;
            };
            let (at, action) = self.deferred.remove(index);
            match action {
                Deferred::CountdownStep => self.countdown_step(server, at),
                Deferred::BeginRound => self.begin_round(server, at),
                Deferred::FinishRound { winner } => self.finish_round(server, at, winner),
                Deferred::FinishSeries { winner } => self.finish(server, winner, false),
                Deferred::HideSpectator(id) => self.hide_spectator(server, id),
            }
        }
        self.results.drain(..).collect()
    }

    // -----------------------------------------------------------------------

    pub fn start(&mut self, server: &dyn ServerBridge, now: Tick) {
        for id in self.members() {
            let opponents = self
                .roster
                .teams()
                .iter()
                .filter(|t| !t.contains(id))
                .flat_map(|t| t.members.iter().copied())
                .collect::<Vec<_>>();

            server.send_message(id, &format!("{} Duel", self.kit.display_name()));
            let label = if opponents.len() == 1 {
                "Opponent:"
            } else {
                "Opponents:"
            };
            server.send_message(id, label);
            for opponent in opponents {
                server.send_message(id, &server.name(opponent));
            }
        }

        self.start_round(server, now);
    }

    fn start_round(&mut self, server: &dyn ServerBridge, now: Tick) {
        self.round += 1;
        self.roster.revive_all();
        server.remove_transient_entities(self.instance);

        let members = self.members();
        for id in members.iter() {
            self.spectators.remove(id);
        }

        // Everyone hidden during the previous round becomes visible again.
        for target in members.iter() {
            for viewer in members.iter().filter(|v| *v != target) {
                server.show(*viewer, *target);
            }
            for spectator in self.spectators.iter() {
                server.show(*spectator, *target);
            }
        }

        self.spawn_teams(server, true);
        self.round_countdown(now);
    }

    fn spawn_teams(&self, server: &dyn ServerBridge, apply_kit: bool) {
        let spawns = &self.arena.spawns;
        for (index, team) in self.roster.teams().iter().enumerate() {
            let spawn = spawns[index % spawns.len()];
            for id in team.members.iter() {
                server.teleport(*id, self.instance, spawn);
                server.prepare_for_round(*id);
                if apply_kit {
                    self.kit.apply(server, *id, self.instance);
                }
            }
        }
    }

    fn round_countdown(&mut self, now: Tick) {
        if self.state == GameState::Countdown {
            return;
        }
        self.state = GameState::Countdown;
        self.countdown = COUNTDOWN_FROM;
        self.schedule(now, Deferred::CountdownStep);
    }

    fn countdown_step(&mut self, server: &dyn ServerBridge, now: Tick) {
        if self.state == GameState::End {
            return;
        }
        self.countdown -= 1;
        if self.countdown != 0 {
            self.broadcast(server, &format!("Starting in {}...", self.countdown));
            self.schedule(now + SECONDS, Deferred::CountdownStep);
        } else {
            self.schedule(now + SETTLE_DELAY, Deferred::BeginRound);
        }
    }

    fn begin_round(&mut self, server: &dyn ServerBridge, now: Tick) {
        if self.state != GameState::Countdown {
            return;
        }
        self.state = GameState::Running;
        self.timer = Timer::default();
        self.timer.start(now);
        self.spawn_teams(server, false);
    }

    // -----------------------------------------------------------------------

    fn broadcast_summary(&self, server: &dyn ServerBridge, now: Tick, winner: TeamColor) {
        self.broadcast(
            server,
            &format!(
                "{} Duel - {}",
                self.kit.display_name(),
                self.timer.format(now)
            ),
        );
        let Some(team) = self.roster.team(winner) else {
            return;
        };
        let label = if team.members.len() > 1 {
            "Winners:"
        } else {
            "Winner:"
        };
        self.broadcast(server, label);
        for id in team.members.iter() {
            let health = if team.alive.contains(id) {
                format!("{}%", server.health_percent(*id))
            } else {
                "0%".to_string()
            };
            self.broadcast(server, &format!("{} ({health})", server.name(*id)));
        }
    }

    fn loser_of(&self, winner: TeamColor) -> TeamColor {
        self.roster
            .teams()
            .iter()
            .map(|t| t.color)
            .filter(|c| *c != winner)
            .next_back()
            .unwrap_or(winner)
    }

    /// A round has been won. Awards the point, announces the summary and
    /// schedules either the next round or the end of the series.
    fn conclude_round(&mut self, server: &dyn ServerBridge, now: Tick, winner: TeamColor) {
        if self.state == GameState::End {
            return;
        }
        if let Some(team) = self.roster.team_mut(winner) {
            team.score += 1;
        }
        self.state = GameState::End;
        self.timer.stop(now);

        self.broadcast_summary(server, now, winner);
        let loser = self.loser_of(winner);
        let (winner_score, loser_score) = (self.score(winner), self.score(loser));
        self.broadcast(server, &format!("Score: {winner_score} - {loser_score}"));

        self.schedule(now + ROUND_END_DELAY, Deferred::FinishRound { winner });
    }

    /// The series is over regardless of score, after a disconnect or a
    /// walkout mid-round.
    fn end_series(&mut self, server: &dyn ServerBridge, now: Tick, winner: TeamColor) {
        if self.state == GameState::End {
            return;
        }
        if self.state != GameState::Countdown {
            self.timer.stop(now);
        }
        if let Some(team) = self.roster.team_mut(winner) {
            team.score += 1;
        }
        self.state = GameState::End;

        self.broadcast_summary(server, now, winner);
        self.schedule(now + ROUND_END_DELAY, Deferred::FinishSeries { winner });
    }

    fn finish_round(&mut self, server: &dyn ServerBridge, now: Tick, winner: TeamColor) {
        if self.score(winner) < self.needed_wins {
            self.reset_arena(server);
            self.start_round(server, now);
        } else {
            self.finish(server, winner, true);
        }
    }

    fn finish(&mut self, server: &dyn ServerBridge, winner: TeamColor, finished_round: bool) {
        let members = self.members();
        for target in members.iter().chain(self.spectators.iter()) {
            for viewer in members.iter().chain(self.spectators.iter()) {
                if viewer != target {
                    server.show(*viewer, *target);
                }
            }
        }

        let loser = self.loser_of(winner);
        self.results.push(SeriesResult {
            winner,
            loser,
            winner_score: self.score(winner),
            loser_score: self.score(loser),
            finished_round,
        });

        let lobby = if finished_round {
            Lobby::Tournament
        } else {
            Lobby::Ordinary
        };
        for id in members.iter().chain(self.spectators.iter()) {
            server.send_to_lobby(*id, lobby);
        }
        self.spectators.clear();
    }

    pub fn score(&self, color: TeamColor) -> u32 {
        self.roster.team(color).map(|t| t.score).unwrap_or(0)
    }

    /// Number of members still standing across all teams, for scoreboards.
    pub fn fighting_count(&self) -> usize {
        self.roster.teams().iter().map(|t| t.alive.len()).sum()
    }

    // -----------------------------------------------------------------------

    pub fn on_kill(&mut self, server: &dyn ServerBridge, now: Tick, id: ParticipantId) {
        let message = format!("{} has died!", server.name(id));
        self.handle_death(server, now, id, &message);
    }

    pub fn on_kill_by(
        &mut self,
        server: &dyn ServerBridge,
        now: Tick,
        id: ParticipantId,
        killer: ParticipantId,
    ) {
        let message = format!(
            "{} was killed by {} ({}%)!",
            server.name(id),
            server.name(killer),
            server.health_percent(killer)
        );
        self.handle_death(server, now, id, &message);
    }

    fn handle_death(
        &mut self,
        server: &dyn ServerBridge,
        now: Tick,
        id: ParticipantId,
        message: &str,
    ) {
        if self.spectators.contains(&id) {
            return;
        }
        if self.roster.team_of(id).is_none() {
            return;
        }

        self.add_spectator(server, now, id);
        self.roster.mark_dead(id);
        self.broadcast(server, message);

        if self.state == GameState::End {
            return;
        }
        self.elimination_scan(server, now, false);
    }

    pub fn on_disconnect(&mut self, server: &dyn ServerBridge, now: Tick, id: ParticipantId) {
        if self.spectators.contains(&id) {
            self.remove_spectator(server, id);
            return;
        }
        if self.roster.team_of(id).is_none() {
            return;
        }

        self.broadcast(server, &format!("{} disconnected.", server.name(id)));
        self.roster.mark_dead(id);
        self.elimination_scan(server, now, true);
    }

    pub fn on_leave(&mut self, server: &dyn ServerBridge, now: Tick, id: ParticipantId) {
        self.kit.on_leave(server, id);

        if self.spectators.contains(&id) {
            self.remove_spectator(server, id);
            return;
        }
        let Some(team) = self.roster.team_of_mut(id) else {
            return;
        };
        team.members.retain(|m| *m != id);
        team.alive.remove(&id);
        self.elimination_scan(server, now, true);
    }

    /// Checks for wiped teams and decides the round or the series when
    /// exactly one team still stands.
    fn elimination_scan(&mut self, server: &dyn ServerBridge, now: Tick, whole_series: bool) {
        let alive = self.roster.alive_teams();
        if alive.len() == 1 {
            let winner = alive[0];
            if whole_series {
                self.end_series(server, now, winner);
            } else {
                self.conclude_round(server, now, winner);
            }
        }
    }

    // -----------------------------------------------------------------------

    pub fn add_spectator(&mut self, server: &dyn ServerBridge, now: Tick, id: ParticipantId) {
        self.spectators.insert(id);
        let was_member = self.roster.team_of(id).is_some();

        if !was_member {
            server.teleport(id, self.instance, self.arena.tournament_spawn);
        }
        server.clear_loadout(id);
        server.set_spectator_state(id);

        // Visibility updates race with the teleport, so hiding is delayed.
        self.schedule(now + SETTLE_DELAY, Deferred::HideSpectator(id));

        if !was_member {
            server.apply_loadout(id, &Loadout::spectator());
        }
    }

    fn hide_spectator(&mut self, server: &dyn ServerBridge, id: ParticipantId) {
        if !self.spectators.contains(&id) {
            return;
        }
        let members = self.members();
        for viewer in members.iter().chain(self.spectators.iter()) {
            if *viewer == id {
                continue;
            }
            server.hide(*viewer, id);
            if self.spectators.contains(viewer) {
                server.hide(id, *viewer);
            }
        }
    }

    pub fn remove_spectator(&mut self, server: &dyn ServerBridge, id: ParticipantId) {
        self.spectators.remove(&id);
        for viewer in self.members().iter().chain(self.spectators.iter()) {
            server.show(*viewer, id);
            server.show(id, *viewer);
        }
        server.send_to_lobby(id, Lobby::Tournament);
    }

    // -----------------------------------------------------------------------

    /// Record the original kind of a mutated block. Only the first write for
    /// a position is kept so round reset restores the pre-round layout.
    pub fn record_block(&mut self, pos: BlockPos, original: BlockKind) {
        self.blocks.entry(pos).or_insert(original);
    }

    pub fn mutated_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn reset_arena(&mut self, server: &dyn ServerBridge) {
        for (pos, kind) in self.blocks.drain() {
            server.set_block(self.instance, pos, &kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaManager;
    use crate::kit::{KitId, KitRegistry};
    use crate::server::LocalServer;
    use crate::types::MILLISECONDS;

    fn test_game(server: &LocalServer, needed_wins: u32) -> (Game, ParticipantId, ParticipantId) {
        let arenas = ArenaManager::builtin();
        let arena = arenas.eligible(KitId::Archer)[0].clone();
        let kits = KitRegistry::default();
        let kit = kits.get(KitId::Archer).unwrap().clone();

        let p1 = server.connect("Ada");
        let p2 = server.connect("Borja");
        let mut game = Game::new(
            GameId::new_v4(),
            InstanceId::new_v4(),
            arena,
            kit,
            needed_wins,
            Some(77),
        );
        game.add_team("Ada".into(), vec![p1]).unwrap();
        game.add_team("Borja".into(), vec![p2]).unwrap();
        (game, p1, p2)
    }

    fn run_countdown(game: &mut Game, server: &LocalServer, from: Tick) -> Tick {
        let mut now = from;
        while game.state() != GameState::Running {
            now += 500 * MILLISECONDS;
            game.tick(server, now);
        }
        now
    }

    #[test]
    fn test_countdown_then_running() {
        let server = LocalServer::new();
        let (mut game, p1, _) = test_game(&server, 2);

        game.start(&server, 0);
        assert_eq!(game.state(), GameState::Countdown);
        assert_eq!(game.round(), 1);

        let now = run_countdown(&mut game, &server, 0);
        assert_eq!(game.state(), GameState::Running);
        assert!(now >= 3 * SECONDS);
        assert!(server
            .messages(p1)
            .iter()
            .any(|m| m == "Starting in 1..."));
    }

    #[test]
    fn test_round_win_starts_next_round() {
        let server = LocalServer::new();
        let (mut game, _, p2) = test_game(&server, 2);
        game.start(&server, 0);
        let now = run_countdown(&mut game, &server, 0);

        game.on_kill(&server, now, p2);
        assert_eq!(game.state(), GameState::End);
        assert_eq!(game.fighting_count(), 1);
        assert!(server.is_spectating(p2));

        // After the round-end delay the next round counts down again.
        game.tick(&server, now + ROUND_END_DELAY);
        assert_eq!(game.state(), GameState::Countdown);
        assert_eq!(game.round(), 2);
        assert_eq!(game.fighting_count(), 2);
        assert!(!server.is_spectating(p2));
    }

    #[test]
    fn test_series_win_reports_result() {
        let server = LocalServer::new();
        let (mut game, p1, p2) = test_game(&server, 1);
        game.start(&server, 0);
        let now = run_countdown(&mut game, &server, 0);

        game.on_kill(&server, now, p2);
        let results = game.tick(&server, now + ROUND_END_DELAY);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].winner, TeamColor::Red);
        assert_eq!(results[0].winner_score, 1);
        assert_eq!(results[0].loser_score, 0);
        assert!(results[0].finished_round);

        assert_eq!(server.lobby(p1), Some(Lobby::Tournament));
        assert_eq!(server.lobby(p2), Some(Lobby::Tournament));
    }

    #[test]
    fn test_disconnect_ends_series_immediately() {
        let server = LocalServer::new();
        let (mut game, p1, p2) = test_game(&server, 2);
        game.start(&server, 0);
        let now = run_countdown(&mut game, &server, 0);

        game.on_disconnect(&server, now, p2);
        assert_eq!(game.state(), GameState::End);

        let results = game.tick(&server, now + ROUND_END_DELAY);
        assert_eq!(results.len(), 1);
        assert!(!results[0].finished_round);
        assert_eq!(results[0].winner, TeamColor::Red);
        // A walkout sends everyone to the ordinary lobby.
        assert_eq!(server.lobby(p1), Some(Lobby::Ordinary));
    }

    #[test]
    fn test_kill_with_killer_broadcasts_name_and_health() {
        let server = LocalServer::new();
        let (mut game, p1, p2) = test_game(&server, 2);
        game.start(&server, 0);
        let now = run_countdown(&mut game, &server, 0);

        server.set_health_percent(p1, 40);
        game.on_kill_by(&server, now, p2, p1);
        assert_eq!(game.state(), GameState::End);
        assert_eq!(game.score(TeamColor::Red), 1);
        assert!(server
            .messages(p1)
            .iter()
            .any(|m| m == "Borja was killed by Ada (40%)!"));
    }

    #[test]
    fn test_kill_is_idempotent_after_end() {
        let server = LocalServer::new();
        let (mut game, p1, p2) = test_game(&server, 1);
        game.start(&server, 0);
        let now = run_countdown(&mut game, &server, 0);

        game.on_kill(&server, now, p2);
        let score = game.score(TeamColor::Red);
        game.on_kill(&server, now, p1);
        assert_eq!(game.score(TeamColor::Red), score);
        assert_eq!(game.score(TeamColor::Green), 0);
    }

    #[test]
    fn test_double_wipe_same_tick_ends_once() {
        let server = LocalServer::new();
        let arenas = ArenaManager::builtin();
        let arena = arenas.eligible(KitId::Archer)[0].clone();
        let kits = KitRegistry::default();
        let kit = kits.get(KitId::Archer).unwrap().clone();

        let p1 = server.connect("Ada");
        let p2 = server.connect("Borja");
        let p3 = server.connect("Cleo");
        let mut game = Game::new(
            GameId::new_v4(),
            InstanceId::new_v4(),
            arena,
            kit,
            2,
            None,
        );
        game.add_team("Ada".into(), vec![p1]).unwrap();
        game.add_team("Borja".into(), vec![p2]).unwrap();
        game.add_team("Cleo".into(), vec![p3]).unwrap();

        game.start(&server, 0);
        let now = run_countdown(&mut game, &server, 0);

        // Two teams fall in the same tick, only one winner determination.
        game.on_disconnect(&server, now, p2);
        game.on_disconnect(&server, now, p3);

        let results = game.tick(&server, now + ROUND_END_DELAY);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].winner, TeamColor::Red);
        assert_eq!(results[0].winner_score, 1);
    }

    #[test]
    fn test_block_restore_between_rounds() {
        let server = LocalServer::new();
        let (mut game, _, p2) = test_game(&server, 2);
        game.start(&server, 0);
        let now = run_countdown(&mut game, &server, 0);

        let pos = BlockPos { x: 1, y: 60, z: 4 };
        let instance = game.instance();
        server.mutate_block(instance, pos, &"fire".to_string());
        game.record_block(pos, "grass".to_string());

        game.on_kill(&server, now, p2);
        game.tick(&server, now + ROUND_END_DELAY);
        assert_eq!(server.block(instance, pos), Some("grass".to_string()));
        assert_eq!(game.mutated_blocks(), 0);
    }

    #[test]
    fn test_spectator_hidden_after_delay() {
        let server = LocalServer::new();
        let (mut game, _, _) = test_game(&server, 2);
        game.start(&server, 0);
        let now = run_countdown(&mut game, &server, 0);

        let watcher = server.connect("Cleo");
        game.add_spectator(&server, now, watcher);
        assert!(server.is_spectating(watcher));

        game.tick(&server, now + SETTLE_DELAY);
        game.remove_spectator(&server, watcher);
        assert_eq!(server.lobby(watcher), Some(Lobby::Tournament));
    }
}
