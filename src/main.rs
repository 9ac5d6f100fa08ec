use clap::{ArgAction, Parser};
use duelgrounds::arena::ArenaManager;
use duelgrounds::bracket::challonge::ChallongeClient;
use duelgrounds::bracket::local::LocalBracket;
use duelgrounds::bracket::{Bracket, BracketClient};
use duelgrounds::config::{Settings, BRACKET_RETRY_BACKOFF};
use duelgrounds::engine::Engine;
use duelgrounds::event::{BestOf, EliminationType, EventStatus, TeamSize};
use duelgrounds::game::GameState;
use duelgrounds::kit::{KitId, KitRegistry};
use duelgrounds::server::{InstanceProvider, LocalProvider, LocalServer, ServerBridge};
use duelgrounds::types::{AppResult, SystemTimeTick, Tick};
use log::LevelFilter;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(name="Duelgrounds", about = "Bracketed PvP tournament orchestration", author, version, long_about = None)]
struct Args {
    #[clap(long, action=ArgAction::Set, help = "Set random seed for team partitioning")]
    seed: Option<u64>,
    #[clap(long, short = 'n', action=ArgAction::Set, default_value_t = 8, help = "Number of simulated players")]
    players: usize,
    #[clap(long, short = 'k', action=ArgAction::Set, default_value = "archer", help = "Kit: archer or horse")]
    kit: String,
    #[clap(long, short = 'b', action=ArgAction::Set, default_value_t = 3, help = "Best of: 1, 3, 5 or 7")]
    best_of: u32,
    #[clap(long, short = 't', action=ArgAction::Set, default_value_t = 1, help = "Team size: 1, 2 or 3")]
    team_size: usize,
    #[clap(long, action=ArgAction::Set, help = "Settings file with bracket service credentials")]
    settings: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AppResult<()> {
    let logfile = FileAppender::builder()
        .append(false)
        .encoder(Box::new(PatternEncoder::new("{l} - {m}\n")))
        .build("duelgrounds.log")?;

    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(Root::builder().appender("logfile").build(LevelFilter::Info))?;

    log4rs::init_config(config)?;
    let args = Args::parse();

    let kit = match args.kit.as_str() {
        "archer" => KitId::Archer,
        "horse" => KitId::Horse,
        other => {
            eprintln!("error: unknown kit '{other}', expected archer or horse");
            return Ok(());
        }
    };
    let best_of = match args.best_of {
        1 => BestOf::One,
        3 => BestOf::Three,
        5 => BestOf::Five,
        7 => BestOf::Seven,
        other => {
            eprintln!("error: invalid value '{other}' for '--best-of', expected 1, 3, 5 or 7");
            return Ok(());
        }
    };
    let team_size = match args.team_size {
        1 => TeamSize::OneVOne,
        2 => TeamSize::TwoVTwo,
        3 => TeamSize::ThreeVThree,
        other => {
            eprintln!("error: invalid value '{other}' for '--team-size', expected 1, 2 or 3");
            return Ok(());
        }
    };

    // With credentials the engine talks to the real bracket service,
    // otherwise everything runs against the in-memory backend.
    let backend = match &args.settings {
        Some(path) => {
            let settings = Settings::load(Path::new(path))?;
            Bracket::Challonge(ChallongeClient::new(settings.credentials()?.clone()))
        }
        None => Bracket::Local(Arc::new(LocalBracket::new())),
    };

    let seed = args.seed.unwrap_or(rand::random());
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));

    let server = Arc::new(LocalServer::new());
    let provider = Arc::new(LocalProvider::new(1));
    let cancellation = CancellationToken::new();
    let bracket = Arc::new(BracketClient::new(
        backend,
        Duration::from_millis(BRACKET_RETRY_BACKOFF),
        cancellation.clone(),
    ));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut engine = Engine::new(
        Arc::clone(&server) as Arc<dyn ServerBridge>,
        Arc::clone(&provider) as Arc<dyn InstanceProvider>,
        bracket,
        ArenaManager::builtin(),
        KitRegistry::default(),
        tx,
        seed,
    );

    let host = server.connect("Host");
    for i in 1..args.players.max(2) {
        server.connect(&format!("Bot{i:02}"));
    }

    engine.host_event(host)?;
    engine.events_mut().set_kit(kit);
    engine
        .events_mut()
        .set_elimination(EliminationType::SingleElimination);
    engine.events_mut().set_best_of(best_of);
    engine.events_mut().set_team_size(team_size);
    engine.start_tournament(host)?;
    println!("Tournament starting with {} players (seed {seed})", args.players.max(2));

    let mut interval = tokio::time::interval(Duration::from_millis(100));
    let mut running_seen = false;
    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                engine.apply(event, Tick::now());
            }
            _ = interval.tick() => {
                let now = Tick::now();
                engine.handle_tick(now);

                // Simulated combat: one random fighter per running game may fall.
                let victims = engine
                    .games()
                    .games()
                    .filter(|g| g.state() == GameState::Running)
                    .filter_map(|g| {
                        let alive = g
                            .roster()
                            .teams()
                            .iter()
                            .flat_map(|t| t.alive.iter().copied())
                            .collect::<Vec<_>>();
                        alive.choose(&mut rng).copied()
                    })
                    .collect::<Vec<_>>();
                for victim in victims {
                    if rng.random_bool(0.35) {
                        engine.on_kill(victim, now);
                    }
                }

                match engine.events().status() {
                    EventStatus::Running => running_seen = true,
                    EventStatus::None if running_seen => break,
                    _ => {}
                }
            }
        }
    }
    cancellation.cancel();

    println!("Tournament finished. Final announcements:");
    let messages = server.messages(host);
    for message in messages.iter().rev().take(6).rev() {
        println!("  {message}");
    }
    Ok(())
}
