pub mod event;
pub mod manager;
pub mod team;

pub use event::DuelEvent;
pub use manager::{BestOf, EliminationType, EventManager, EventStatus, TeamSize};
pub use team::{EventTeam, EventTeamManager};
