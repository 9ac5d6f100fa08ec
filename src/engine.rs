use crate::arena::ArenaManager;
use crate::bracket::types::{BracketMatch, BracketParticipant};
use crate::bracket::BracketClient;
use crate::config::{BRACKET_POLL_INTERVAL, MAX_STARTS_PER_CYCLE};
use crate::event::{DuelEvent, EventManager, EventStatus, EventTeamManager};
use crate::game::{GameManager, MatchScheduler, PendingTeam, TeamColor};
use crate::kit::KitRegistry;
use crate::server::{InstanceProvider, Lobby, ServerBridge};
use crate::types::{
    AppResult, BracketMatchId, BracketParticipantId, GameId, ParticipantId, Tick,
};
use anyhow::anyhow;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Results of background bracket operations, funneled back to the host's
/// main loop over a channel and applied there.
#[derive(Debug)]
pub enum EngineEvent {
    BracketReady {
        epoch: u64,
        event: DuelEvent,
        participants: Vec<BracketParticipant>,
    },
    BracketCreateFailed {
        epoch: u64,
        error: String,
    },
    MatchesFetched {
        matches: Vec<BracketMatch>,
    },
    MatchUnderway {
        bracket_match: BracketMatchId,
        player1: BracketParticipantId,
        player2: BracketParticipantId,
    },
    StandingsReady {
        standings: Vec<BracketParticipant>,
    },
}

/// Ties a live game back to its bracket match: which color holds which
/// bracket slot, in slot order.
struct GameBinding {
    slots: Vec<(TeamColor, BracketParticipantId)>,
}

impl GameBinding {
    fn slot_of(&self, color: TeamColor) -> Option<BracketParticipantId> {
        self.slots
            .iter()
            .find(|(c, _)| *c == color)
            .map(|(_, id)| *id)
    }

    fn player1(&self) -> Option<BracketParticipantId> {
        self.slots.first().map(|(_, id)| *id)
    }
}

/// Top level coordinator. All mutation happens on the thread that calls
/// [`Engine::apply`] and [`Engine::handle_tick`]; background tasks only talk
/// to the bracket service and report back as [`EngineEvent`]s.
pub struct Engine {
    server: Arc<dyn ServerBridge>,
    provider: Arc<dyn InstanceProvider>,
    bracket: Arc<BracketClient>,
    arenas: ArenaManager,
    kits: KitRegistry,
    events: EventManager,
    active_event: Option<DuelEvent>,
    games: GameManager,
    scheduler: MatchScheduler,
    bindings: HashMap<GameId, GameBinding>,
    // Matches already forfeited or marked underway locally. Entries stay for
    // the lifetime of the event so a stale poll snapshot cannot act twice.
    in_flight: HashSet<BracketMatchId>,
    // Bumped on every hosted event; creation results carry the epoch they
    // were spawned under so a cancelled event's bracket is discarded.
    epoch: u64,
    poll_cancel: CancellationToken,
    tx: mpsc::UnboundedSender<EngineEvent>,
    rng: ChaCha8Rng,
}

impl Engine {
    pub fn new(
        server: Arc<dyn ServerBridge>,
        provider: Arc<dyn InstanceProvider>,
        bracket: Arc<BracketClient>,
        arenas: ArenaManager,
        kits: KitRegistry,
        tx: mpsc::UnboundedSender<EngineEvent>,
        seed: u64,
    ) -> Self {
        Self {
            server,
            provider,
            bracket,
            arenas,
            kits,
            events: EventManager::new(),
            active_event: None,
            games: GameManager::default(),
            scheduler: MatchScheduler::default(),
            bindings: HashMap::new(),
            in_flight: HashSet::new(),
            epoch: 0,
            poll_cancel: CancellationToken::new(),
            tx,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventManager {
        &mut self.events
    }

    pub fn games(&self) -> &GameManager {
        &self.games
    }

    pub fn active_event(&self) -> Option<&DuelEvent> {
        self.active_event.as_ref()
    }

    pub fn bracket_url(&self) -> Option<String> {
        self.active_event.as_ref().map(|e| e.bracket_url())
    }

    fn host_guard(&self, caller: ParticipantId) -> AppResult<()> {
        if self.events.host() != Some(caller) {
            return Err(anyhow!("Only the host can manage the event"));
        }
        Ok(())
    }

    /// Claims hosting of a new event. Refused while another event exists.
    pub fn host_event(&mut self, caller: ParticipantId) -> AppResult<()> {
        if self.events.status() != EventStatus::None {
            return Err(anyhow!("An event is already in progress"));
        }
        self.epoch += 1;
        self.events.set_host(caller);
        self.events.set_status(EventStatus::Waiting);
        Ok(())
    }

    /// Cancels an event that has not started yet.
    pub fn cancel_event(&mut self, caller: ParticipantId) -> AppResult<()> {
        self.host_guard(caller)?;
        if self.events.status() != EventStatus::Waiting {
            return Err(anyhow!("Only a waiting event can be cancelled"));
        }
        self.events.reset();
        log::info!("Event cancelled by its host");
        Ok(())
    }

    /// Kicks off the tournament: partitions the online players into teams
    /// and hands creation and registration to a background task. Creation
    /// failures are fatal for the event; everything later retries.
    pub fn start_tournament(&mut self, caller: ParticipantId) -> AppResult<()> {
        self.host_guard(caller)?;
        if self.events.status() != EventStatus::Waiting {
            return Err(anyhow!("There is no waiting event to start"));
        }
        let kit = self
            .events
            .kit()
            .ok_or_else(|| anyhow!("No kit selected"))?;
        let tournament_type = self
            .events
            .elimination()
            .tournament_type()
            .ok_or_else(|| anyhow!("No elimination type selected"))?;

        let team_size = self.events.team_size();
        let eligible = {
            let online = self.server.online_participants().len();
            let host_slot = usize::from(!self.events.host_playing());
            online.saturating_sub(host_slot)
        };
        if eligible < team_size.minimum_players() {
            return Err(anyhow!(
                "Not enough players online, need at least {}",
                team_size.minimum_players()
            ));
        }

        let teams = EventTeamManager::partition(
            self.server.as_ref(),
            caller,
            self.events.host_playing(),
            team_size,
            &mut self.rng,
        );
        let names = teams
            .teams()
            .iter()
            .map(|t| t.name().to_string())
            .collect::<Vec<_>>();
        let title = format!(
            "{}'s {} Tournament",
            self.server.name(caller),
            kit.display_name()
        );
        let description = format!("{} tournament", kit.display_name());

        let bracket = self.bracket.clone();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let created = async {
                let tournament = bracket
                    .create_tournament(&title, &description, tournament_type)
                    .await?;
                let participants = bracket.bulk_add_participants(&tournament, &names).await?;
                bracket.start_tournament(&tournament).await?;
                Ok::<_, anyhow::Error>((tournament, participants))
            }
            .await;

            let message = match created {
                Ok((tournament, participants)) => EngineEvent::BracketReady {
                    epoch,
                    event: DuelEvent::new(tournament, teams),
                    participants,
                },
                Err(e) => EngineEvent::BracketCreateFailed {
                    epoch,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(message);
        });
        Ok(())
    }

    /// Applies a background-task result on the main loop.
    pub fn apply(&mut self, event: EngineEvent, now: Tick) {
        match event {
            EngineEvent::BracketReady {
                epoch,
                event: mut duel_event,
                participants,
            } => self.on_bracket_ready(epoch, &mut duel_event, participants),
            EngineEvent::BracketCreateFailed { epoch, error } => {
                if epoch != self.epoch {
                    return;
                }
                log::error!("Tournament creation failed: {error}");
                if let Some(host) = self.events.host() {
                    self.server.send_message(
                        host,
                        "Something went wrong while creating the tournament!",
                    );
                }
                self.events.reset();
            }
            EngineEvent::MatchesFetched { matches } => self.on_matches_fetched(matches),
            EngineEvent::MatchUnderway {
                bracket_match,
                player1,
                player2,
            } => self.on_match_underway(bracket_match, player1, player2, now),
            EngineEvent::StandingsReady { standings } => self.on_standings_ready(&standings),
        }
    }

    fn on_bracket_ready(
        &mut self,
        epoch: u64,
        duel_event: &mut DuelEvent,
        participants: Vec<BracketParticipant>,
    ) {
        // The event may have been cancelled, or replaced by a newly hosted
        // one, while the creation task was in flight; a stale bracket must
        // not resurrect or hijack anything.
        if epoch != self.epoch || self.events.status() != EventStatus::Waiting {
            log::info!(
                "Discarding bracket {} created for a cancelled event",
                duel_event.bracket_url()
            );
            return;
        }
        duel_event.assign_bracket_ids(&participants);
        self.events.set_status(EventStatus::Running);

        let host_name = self
            .events
            .host()
            .map(|h| self.server.name(h))
            .unwrap_or_else(|| "Unknown".to_string());
        let kit_name = self
            .events
            .kit()
            .map(|k| k.display_name())
            .unwrap_or_default();
        let format_line = format!(
            "{} ({})",
            self.events.team_size().display_name(),
            self.events.best_of()
        );
        duel_event.announce_start(self.server.as_ref(), &host_name, kit_name, &format_line);
        log::info!(
            "Tournament live at {} with {} teams",
            duel_event.bracket_url(),
            duel_event.teams.teams().len()
        );

        let tournament = duel_event.tournament().clone();
        self.active_event = Some(duel_event.clone());
        self.poll_cancel = self.bracket.cancellation().child_token();

        let bracket = self.bracket.clone();
        let tx = self.tx.clone();
        let token = self.poll_cancel.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(BRACKET_POLL_INTERVAL));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                match bracket.matches(&tournament).await {
                    Ok(matches) => {
                        if tx.send(EngineEvent::MatchesFetched { matches }).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    fn on_matches_fetched(&mut self, matches: Vec<BracketMatch>) {
        let Some(event) = self.active_event.as_ref() else {
            return;
        };
        let open = matches
            .into_iter()
            .filter(|m| !m.is_complete())
            .collect::<Vec<_>>();

        // No remaining matches means the bracket has run its course.
        if open.is_empty() {
            self.finish_event();
            return;
        }

        let needed_wins = self.events.best_of().needed_wins();
        let mut started_this_cycle = 0;
        for m in open {
            if m.is_underway() || !m.has_both_slots() || self.in_flight.contains(&m.id) {
                continue;
            }
            let (Some(player1), Some(player2)) = (m.player1_id, m.player2_id) else {
                continue;
            };
            let Some(team1) = event.teams.team_by_bracket_id(player1) else {
                continue;
            };
            let Some(team2) = event.teams.team_by_bracket_id(player2) else {
                continue;
            };

            // A team with nobody connected forfeits on the spot.
            let team1_online = !team1.connected_members(self.server.as_ref()).is_empty();
            let team2_online = !team2.connected_members(self.server.as_ref()).is_empty();
            if !team1_online || !team2_online {
                let (winner, scores) = if team1_online {
                    (player1, format!("{needed_wins}-0"))
                } else {
                    (player2, format!("0-{needed_wins}"))
                };
                log::info!("Bracket match {} forfeited, winner {winner}", m.id);
                self.in_flight.insert(m.id);
                self.spawn_match_update(m.id, winner, scores);
                continue;
            }

            if started_this_cycle >= MAX_STARTS_PER_CYCLE {
                continue;
            }
            started_this_cycle += 1;
            self.in_flight.insert(m.id);

            let bracket = self.bracket.clone();
            let tournament = event.tournament().clone();
            let tx = self.tx.clone();
            let bracket_match = m.id;
            tokio::spawn(async move {
                if bracket
                    .mark_underway(&tournament, bracket_match)
                    .await
                    .is_ok()
                {
                    let _ = tx.send(EngineEvent::MatchUnderway {
                        bracket_match,
                        player1,
                        player2,
                    });
                }
            });
        }
    }

    fn on_match_underway(
        &mut self,
        bracket_match: BracketMatchId,
        player1: BracketParticipantId,
        player2: BracketParticipantId,
        now: Tick,
    ) {
        let Some(event) = self.active_event.as_ref() else {
            return;
        };
        let Some(kit_id) = self.events.kit() else {
            return;
        };

        let mut pending_teams = vec![];
        for slot in [player1, player2] {
            let Some(team) = event.teams.team_by_bracket_id(slot) else {
                log::warn!("No local team for bracket participant {slot}");
                return;
            };
            pending_teams.push(PendingTeam {
                name: team.name().to_string(),
                members: team.members().to_vec(),
                bracket_participant: slot,
            });
        }

        // Players about to fight leave whatever game they were spectating.
        for member in pending_teams.iter().flat_map(|t| t.members.iter().copied()) {
            if let Some(game) = self.games.game_of(member) {
                if game.spectators().contains(&member) {
                    game.on_leave(self.server.as_ref(), now, member);
                }
            }
        }

        let Some(arena) = self.arenas.choose(kit_id, &mut self.rng).cloned() else {
            log::error!("No arena supports kit {kit_id}");
            return;
        };
        self.scheduler.enqueue(
            self.provider.as_ref(),
            bracket_match,
            arena,
            pending_teams,
            now,
        );
    }

    fn spawn_match_update(
        &self,
        bracket_match: BracketMatchId,
        winner: BracketParticipantId,
        scores: String,
    ) {
        let Some(event) = self.active_event.as_ref() else {
            return;
        };
        let bracket = self.bracket.clone();
        let tournament = event.tournament().clone();
        tokio::spawn(async move {
            let _ = bracket
                .update_match(&tournament, bracket_match, winner, &scores)
                .await;
        });
    }

    fn finish_event(&mut self) {
        let Some(event) = self.active_event.as_ref() else {
            return;
        };
        log::info!("All bracket matches complete, finalizing tournament");
        self.poll_cancel.cancel();

        let bracket = self.bracket.clone();
        let tournament = event.tournament().clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if bracket.finalize_tournament(&tournament).await.is_ok() {
                if let Ok(standings) = bracket.participants(&tournament).await {
                    let _ = tx.send(EngineEvent::StandingsReady { standings });
                }
            }
        });
    }

    fn on_standings_ready(&mut self, standings: &[BracketParticipant]) {
        if let Some(event) = self.active_event.as_ref() {
            let kit_name = self
                .events
                .kit()
                .map(|k| k.display_name())
                .unwrap_or_default();
            event.announce_standings(self.server.as_ref(), kit_name, standings);
            for id in event.teams.participants() {
                self.server.send_to_lobby(id, Lobby::Ordinary);
            }
        }

        self.scheduler.clear(self.provider.as_ref());
        self.bindings.clear();
        self.in_flight.clear();
        self.active_event = None;
        self.events.reset();
    }

    /// One pass of the main loop: step live games, report decided series,
    /// and promote scheduled matches whose instances are ready.
    pub fn handle_tick(&mut self, now: Tick) {
        for (game_id, result) in self.games.tick_all(self.server.as_ref(), now) {
            self.report_series(game_id, result);
            self.games.delete_game(game_id, self.provider.as_ref());
            self.bindings.remove(&game_id);
        }

        let Some(kit_id) = self.events.kit() else {
            return;
        };
        let Some(kit) = self.kits.get(kit_id).cloned() else {
            return;
        };
        let needed_wins = self.events.best_of().needed_wins();

        for started in self
            .scheduler
            .tick(self.provider.as_ref(), &kit, needed_wins, now)
        {
            let mut game = started.game;
            self.bindings.insert(
                game.id(),
                GameBinding {
                    slots: started.slots,
                },
            );
            game.start(self.server.as_ref(), now);
            self.games.add_game(game);
        }
    }

    fn report_series(&mut self, game_id: GameId, result: crate::game::SeriesResult) {
        let Some(game) = self.games.game(game_id) else {
            return;
        };
        let Some(bracket_match) = game.bracket_match() else {
            return;
        };
        let Some(binding) = self.bindings.get(&game_id) else {
            return;
        };
        let (Some(winner), Some(loser)) = (
            binding.slot_of(result.winner),
            binding.slot_of(result.loser),
        ) else {
            return;
        };

        // Scores are reported in bracket slot order, not winner first.
        let scores = if binding.player1() == Some(winner) {
            format!("{}-{}", result.winner_score, result.loser_score)
        } else {
            format!("{}-{}", result.loser_score, result.winner_score)
        };
        self.spawn_match_update(bracket_match, winner, scores);

        if let Some(event) = self.active_event.as_ref() {
            let winner_name = event
                .teams
                .team_by_bracket_id(winner)
                .map(|t| t.name().to_string())
                .unwrap_or_default();
            let loser_name = event
                .teams
                .team_by_bracket_id(loser)
                .map(|t| t.name().to_string())
                .unwrap_or_default();
            event.broadcast(
                self.server.as_ref(),
                &format!(
                    "Tournament: {winner_name} has defeated {loser_name} ({} - {}).",
                    result.winner_score, result.loser_score
                ),
            );
        }
    }

    // -----------------------------------------------------------------------
    // Player-driven entry points, forwarded from the host server's listeners.

    pub fn on_kill(&mut self, id: ParticipantId, now: Tick) {
        if let Some(game) = self.games.game_of(id) {
            game.on_kill(self.server.as_ref(), now, id);
        }
    }

    pub fn on_kill_by(&mut self, id: ParticipantId, killer: ParticipantId, now: Tick) {
        if let Some(game) = self.games.game_of(id) {
            game.on_kill_by(self.server.as_ref(), now, id, killer);
        }
    }

    pub fn on_disconnect(&mut self, id: ParticipantId, now: Tick) {
        if let Some(game) = self.games.game_of(id) {
            game.on_disconnect(self.server.as_ref(), now, id);
        }
    }

    pub fn on_leave(&mut self, id: ParticipantId, now: Tick) {
        if let Some(game) = self.games.game_of(id) {
            game.on_leave(self.server.as_ref(), now, id);
        }
    }

    pub fn spectate(&mut self, id: ParticipantId, game_id: GameId, now: Tick) {
        if let Some(game) = self.games.game_mut(game_id) {
            game.add_spectator(self.server.as_ref(), now, id);
        }
    }
}
