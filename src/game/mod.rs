pub mod game;
pub mod manager;
pub mod scheduler;
pub mod team;
pub mod timer;

pub use game::{Game, GameState, SeriesResult};
pub use manager::GameManager;
pub use scheduler::{MatchScheduler, PendingTeam, StartedMatch};
pub use team::{Team, TeamColor, TeamRoster};
pub use timer::Timer;
