use crate::bracket::types::TournamentType;
use crate::kit::KitId;
use crate::types::ParticipantId;
use strum::Display;
use strum_macros::EnumIter;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventStatus {
    #[default]
    None,
    Waiting,
    Running,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, EnumIter)]
pub enum EliminationType {
    #[default]
    None,
    SingleElimination,
    DoubleElimination,
}

impl EliminationType {
    pub fn tournament_type(&self) -> Option<TournamentType> {
        match self {
            Self::None => None,
            Self::SingleElimination => Some(TournamentType::SingleElimination),
            Self::DoubleElimination => Some(TournamentType::DoubleElimination),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter)]
pub enum TeamSize {
    #[default]
    OneVOne,
    TwoVTwo,
    ThreeVThree,
}

impl TeamSize {
    pub fn size(&self) -> usize {
        match self {
            Self::OneVOne => 1,
            Self::TwoVTwo => 2,
            Self::ThreeVThree => 3,
        }
    }

    /// An event needs at least two full teams to produce a bracket.
    pub fn minimum_players(&self) -> usize {
        2 * self.size()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OneVOne => "1v1",
            Self::TwoVTwo => "2v2",
            Self::ThreeVThree => "3v3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter)]
pub enum BestOf {
    #[default]
    One,
    Three,
    Five,
    Seven,
}

impl BestOf {
    pub fn games(&self) -> u32 {
        match self {
            Self::One => 1,
            Self::Three => 3,
            Self::Five => 5,
            Self::Seven => 7,
        }
    }

    pub fn needed_wins(&self) -> u32 {
        self.games().div_ceil(2)
    }
}

impl std::fmt::Display for BestOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Best of {}", self.games())
    }
}

/// The host's pre-start configuration and the event lifecycle status.
/// Kit, elimination type and host are cleared on reset; format settings
/// persist between events.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    status: EventStatus,
    host: Option<ParticipantId>,
    host_playing: bool,
    kit: Option<KitId>,
    elimination: EliminationType,
    best_of: BestOf,
    team_size: TeamSize,
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            host_playing: true,
            ..Default::default()
        }
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn set_status(&mut self, status: EventStatus) {
        self.status = status;
    }

    pub fn host(&self) -> Option<ParticipantId> {
        self.host
    }

    pub fn set_host(&mut self, host: ParticipantId) {
        self.host = Some(host);
    }

    pub fn host_playing(&self) -> bool {
        self.host_playing
    }

    pub fn set_host_playing(&mut self, playing: bool) {
        self.host_playing = playing;
    }

    pub fn kit(&self) -> Option<KitId> {
        self.kit
    }

    pub fn set_kit(&mut self, kit: KitId) {
        self.kit = Some(kit);
    }

    pub fn elimination(&self) -> EliminationType {
        self.elimination
    }

    pub fn set_elimination(&mut self, elimination: EliminationType) {
        self.elimination = elimination;
    }

    pub fn best_of(&self) -> BestOf {
        self.best_of
    }

    pub fn set_best_of(&mut self, best_of: BestOf) {
        self.best_of = best_of;
    }

    pub fn team_size(&self) -> TeamSize {
        self.team_size
    }

    pub fn set_team_size(&mut self, team_size: TeamSize) {
        self.team_size = team_size;
    }

    /// Clears per-event state after a cancellation or a finished event.
    pub fn reset(&mut self) {
        self.status = EventStatus::None;
        self.host = None;
        self.kit = None;
        self.elimination = EliminationType::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needed_wins() {
        assert_eq!(BestOf::One.needed_wins(), 1);
        assert_eq!(BestOf::Three.needed_wins(), 2);
        assert_eq!(BestOf::Five.needed_wins(), 3);
        assert_eq!(BestOf::Seven.needed_wins(), 4);
    }

    #[test]
    fn test_minimum_players() {
        assert_eq!(TeamSize::OneVOne.minimum_players(), 2);
        assert_eq!(TeamSize::ThreeVThree.minimum_players(), 6);
    }

    #[test]
    fn test_reset_keeps_format_settings() {
        let mut manager = EventManager::new();
        manager.set_host(ParticipantId::new_v4());
        manager.set_kit(KitId::Archer);
        manager.set_best_of(BestOf::Five);
        manager.set_status(EventStatus::Waiting);

        manager.reset();
        assert_eq!(manager.status(), EventStatus::None);
        assert!(manager.host().is_none());
        assert!(manager.kit().is_none());
        assert_eq!(manager.best_of(), BestOf::Five);
    }
}
