use std::time::{SystemTime, UNIX_EPOCH};

// A Tick represents a unit of time on the host server.
// It corresponds to a millisecond in the real world.
pub type Tick = u64;

pub const MILLISECONDS: Tick = 1;
pub const SECONDS: Tick = 1000 * MILLISECONDS;
pub const MINUTES: Tick = 60 * SECONDS;

pub type ParticipantId = uuid::Uuid;
pub type GameId = uuid::Uuid;
pub type InstanceId = uuid::Uuid;

// Identifiers assigned by the remote bracket service.
pub type BracketMatchId = u64;
pub type BracketParticipantId = u64;

pub type AppResult<T> = Result<T, anyhow::Error>;

pub trait SystemTimeTick {
    fn now() -> Self;
    fn from_system_time(time: SystemTime) -> Self;
    fn as_secs(&self) -> Tick;
    fn as_minutes(&self) -> Tick;
}

impl SystemTimeTick for Tick {
    fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    fn from_system_time(time: SystemTime) -> Tick {
        time.duration_since(UNIX_EPOCH)
            .expect("Invalid system time")
            .as_millis() as Tick
    }

    fn as_secs(&self) -> Tick {
        self / SECONDS
    }

    fn as_minutes(&self) -> Tick {
        self / MINUTES
    }
}
