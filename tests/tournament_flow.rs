use duelgrounds::arena::ArenaManager;
use duelgrounds::bracket::local::LocalBracket;
use duelgrounds::bracket::{Bracket, BracketClient};
use duelgrounds::config::BRACKET_RETRY_BACKOFF;
use duelgrounds::engine::{Engine, EngineEvent};
use duelgrounds::event::{BestOf, EliminationType, EventStatus, TeamSize};
use duelgrounds::game::GameState;
use duelgrounds::kit::{KitId, KitRegistry};
use duelgrounds::server::{InstanceProvider, Lobby, LocalProvider, LocalServer, ServerBridge};
use duelgrounds::types::{ParticipantId, Tick};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Harness {
    server: Arc<LocalServer>,
    bracket: Arc<LocalBracket>,
    engine: Engine,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
    host: ParticipantId,
    players: Vec<ParticipantId>,
    now: Tick,
}

impl Harness {
    fn new(player_names: &[&str], host_playing: bool) -> Self {
        let server = Arc::new(LocalServer::new());
        let provider = Arc::new(LocalProvider::new(1));
        let bracket = Arc::new(LocalBracket::new());
        let client = Arc::new(BracketClient::new(
            Bracket::Local(bracket.clone()),
            Duration::from_millis(BRACKET_RETRY_BACKOFF),
            CancellationToken::new(),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = Engine::new(
            Arc::clone(&server) as Arc<dyn ServerBridge>,
            provider as Arc<dyn InstanceProvider>,
            client,
            ArenaManager::builtin(),
            KitRegistry::default(),
            tx,
            42,
        );

        let host = server.connect("Host");
        let players = player_names
            .iter()
            .map(|name| server.connect(name))
            .collect();

        engine.host_event(host).unwrap();
        engine.events_mut().set_kit(KitId::Archer);
        engine
            .events_mut()
            .set_elimination(EliminationType::SingleElimination);
        engine.events_mut().set_best_of(BestOf::Three);
        engine.events_mut().set_team_size(TeamSize::OneVOne);
        engine.events_mut().set_host_playing(host_playing);

        Self {
            server,
            bracket,
            engine,
            rx,
            host,
            players,
            now: 0,
        }
    }

    /// One 100 ms step of the host main loop: let background tasks run,
    /// apply their results, tick the engine.
    async fn step(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(event) = self.rx.try_recv() {
            self.engine.apply(event, self.now);
        }
        self.now += 100;
        self.engine.handle_tick(self.now);
    }

    /// In every running game, the team whose name sorts first always wins:
    /// one member of the lexicographically-last team dies per step.
    fn fight_step(&mut self) {
        let victims = self
            .engine
            .games()
            .games()
            .filter(|g| g.state() == GameState::Running)
            .filter_map(|g| {
                g.roster()
                    .teams()
                    .iter()
                    .filter(|t| !t.alive.is_empty())
                    .max_by(|a, b| a.name.cmp(&b.name))
                    .and_then(|t| t.alive.iter().min().copied())
            })
            .collect::<Vec<_>>();
        for victim in victims {
            self.engine.on_kill(victim, self.now);
        }
    }

    async fn run_to_completion(&mut self, max_steps: usize) {
        let mut running_seen = false;
        for _ in 0..max_steps {
            self.step().await;
            self.fight_step();
            match self.engine.events().status() {
                EventStatus::Running => running_seen = true,
                EventStatus::None if running_seen => return,
                _ => {}
            }
        }
        panic!("Tournament did not complete within {max_steps} steps");
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_local_tournament() {
    let mut harness = Harness::new(&["Ada", "Borja", "Cleo", "Dinah"], false);
    harness.engine.start_tournament(harness.host).unwrap();
    harness.run_to_completion(5000).await;

    // Every bracket match was decided with slot-ordered best-of-3 scores.
    let matches = harness.bracket.matches().unwrap();
    assert_eq!(matches.len(), 3);
    for m in &matches {
        assert!(m.is_complete());
        let scores = m.scores_csv.as_deref().unwrap();
        assert!(scores == "2-0" || scores == "0-2", "unexpected scores {scores}");
        let winner = m.winner_id.unwrap();
        if scores == "2-0" {
            assert_eq!(m.player1_id, Some(winner));
        } else {
            assert_eq!(m.player2_id, Some(winner));
        }
    }

    // The first-sorting name wins every series, so Ada takes the bracket.
    let participants = harness.bracket.participants().unwrap();
    let champion = participants
        .iter()
        .find(|p| p.final_rank == Some(1))
        .unwrap();
    assert_eq!(champion.name, "Ada");

    // Standings were broadcast to the event participants.
    let ada = harness.players[0];
    let messages = harness.server.messages(ada);
    assert!(messages.iter().any(|m| m == "1st: Ada"));
    assert!(messages.iter().any(|m| m.starts_with("2nd: ")));

    // Everything was torn down and everyone went back to the ordinary lobby.
    assert!(harness.engine.games().is_empty());
    assert!(harness.engine.active_event().is_none());
    assert_eq!(harness.engine.events().status(), EventStatus::None);
    for player in &harness.players {
        assert_eq!(harness.server.lobby(*player), Some(Lobby::Ordinary));
    }
}

#[tokio::test(start_paused = true)]
async fn test_offline_team_forfeits_without_a_game() {
    let mut harness = Harness::new(&["Ada", "Borja"], false);
    harness.engine.start_tournament(harness.host).unwrap();

    // Borja disconnects before the first poll can start the match.
    harness.server.disconnect(harness.players[1]);
    harness.run_to_completion(5000).await;

    let matches = harness.bracket.matches().unwrap();
    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert!(m.is_complete());
    // Never marked underway: the forfeit happened instead of a start.
    assert!(!m.is_underway());

    let participants = harness.bracket.participants().unwrap();
    let ada = participants.iter().find(|p| p.name == "Ada").unwrap();
    assert_eq!(m.winner_id, Some(ada.id));
    let scores = m.scores_csv.as_deref().unwrap();
    if m.player1_id == Some(ada.id) {
        assert_eq!(scores, "2-0");
    } else {
        assert_eq!(scores, "0-2");
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_burst_is_capped() {
    let names = (0..32).map(|i| format!("P{i:02}")).collect::<Vec<_>>();
    let refs = names.iter().map(|n| n.as_str()).collect::<Vec<_>>();
    let mut harness = Harness::new(&refs, false);
    harness.engine.start_tournament(harness.host).unwrap();

    // Run until the first poll cycle has been applied.
    for _ in 0..200 {
        harness.step().await;
        let underway = harness
            .bracket
            .matches()
            .unwrap()
            .iter()
            .filter(|m| m.is_underway())
            .count();
        if underway > 0 {
            break;
        }
    }

    let underway = harness
        .bracket
        .matches()
        .unwrap()
        .iter()
        .filter(|m| m.is_underway())
        .count();
    assert!(underway > 0, "no match was marked underway");
    assert!(underway <= 14, "burst cap exceeded: {underway}");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_only_while_waiting() {
    let mut harness = Harness::new(&["Ada", "Borja"], false);

    // Someone who is not the host cannot cancel.
    let stranger = harness.players[0];
    assert!(harness.engine.cancel_event(stranger).is_err());

    harness.engine.start_tournament(harness.host).unwrap();
    for _ in 0..100 {
        harness.step().await;
        if harness.engine.events().status() == EventStatus::Running {
            break;
        }
    }
    assert_eq!(harness.engine.events().status(), EventStatus::Running);
    assert!(harness.engine.cancel_event(harness.host).is_err());
    assert!(harness.engine.bracket_url().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_creation_is_not_resurrected() {
    let mut harness = Harness::new(&["Ada", "Borja"], false);
    harness.engine.start_tournament(harness.host).unwrap();

    // Cancelled before the creation task reports back; the late bracket
    // must be discarded instead of reviving the event.
    harness.engine.cancel_event(harness.host).unwrap();
    for _ in 0..50 {
        harness.step().await;
    }
    assert_eq!(harness.engine.events().status(), EventStatus::None);
    assert!(harness.engine.active_event().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_bracket_cannot_hijack_new_event() {
    let mut harness = Harness::new(&["Ada", "Borja"], false);
    harness.engine.start_tournament(harness.host).unwrap();
    harness.engine.cancel_event(harness.host).unwrap();

    // A new event is hosted while the first creation is still in flight.
    harness.engine.host_event(harness.host).unwrap();
    for _ in 0..50 {
        harness.step().await;
    }
    assert_eq!(harness.engine.events().status(), EventStatus::Waiting);
    assert!(harness.engine.active_event().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_resets() {
    let mut harness = Harness::new(&["Ada", "Borja"], false);
    assert_eq!(harness.engine.events().status(), EventStatus::Waiting);
    harness.engine.cancel_event(harness.host).unwrap();
    assert_eq!(harness.engine.events().status(), EventStatus::None);

    // A new event can be hosted afterwards.
    harness.engine.host_event(harness.players[0]).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_enough_players() {
    let harness_players: &[&str] = &["Ada"];
    let mut harness = Harness::new(harness_players, false);
    // Host not playing, one eligible player: below the 1v1 minimum of two.
    assert!(harness.engine.start_tournament(harness.host).is_err());

    harness.engine.events_mut().set_host_playing(true);
    harness.engine.start_tournament(harness.host).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_series_reports_walkout() {
    let mut harness = Harness::new(&["Ada", "Borja"], false);
    harness.engine.start_tournament(harness.host).unwrap();

    // Wait for the game to reach its first running round.
    for _ in 0..600 {
        harness.step().await;
        let any_running = harness
            .engine
            .games()
            .games()
            .any(|g| g.state() == GameState::Running);
        if any_running {
            break;
        }
    }
    let borja = harness.players[1];
    harness.server.disconnect(borja);
    harness.engine.on_disconnect(borja, harness.now);

    let mut completed = false;
    for _ in 0..2000 {
        harness.step().await;
        if harness.engine.events().status() == EventStatus::None {
            completed = true;
            break;
        }
    }
    assert!(completed, "event did not wind down after the walkout");

    // The walkout decided the only match with a 1-0 series score.
    let matches = harness.bracket.matches().unwrap();
    let m = &matches[0];
    assert!(m.is_complete());
    let participants = harness.bracket.participants().unwrap();
    let ada = participants.iter().find(|p| p.name == "Ada").unwrap();
    assert_eq!(m.winner_id, Some(ada.id));
    let scores = m.scores_csv.as_deref().unwrap();
    assert!(scores == "1-0" || scores == "0-1", "unexpected scores {scores}");
}
