use super::manager::TeamSize;
use crate::server::ServerBridge;
use crate::types::{BracketParticipantId, ParticipantId};
use rand::seq::SliceRandom;
use rand::Rng;

/// A tournament entrant: one or more players registered under a single
/// bracket participant. The display name grows as members are added, so a
/// duo reads "Ada, Borja".
#[derive(Debug, Clone, Default)]
pub struct EventTeam {
    name: String,
    members: Vec<ParticipantId>,
    bracket_id: Option<BracketParticipantId>,
}

impl EventTeam {
    pub fn add_member(&mut self, id: ParticipantId, name: &str) {
        if self.name.is_empty() {
            self.name = name.to_string();
        } else {
            self.name = format!("{}, {}", self.name, name);
        }
        self.members.push(id);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[ParticipantId] {
        &self.members
    }

    pub fn bracket_id(&self) -> Option<BracketParticipantId> {
        self.bracket_id
    }

    /// The bracket id is assigned exactly once, right after registration.
    pub fn set_bracket_id(&mut self, id: BracketParticipantId) {
        if self.bracket_id.is_none() {
            self.bracket_id = Some(id);
        }
    }

    pub fn connected_members(&self, server: &dyn ServerBridge) -> Vec<ParticipantId> {
        self.members
            .iter()
            .copied()
            .filter(|id| server.is_online(*id))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventTeamManager {
    teams: Vec<EventTeam>,
}

impl EventTeamManager {
    /// Splits the eligible players into teams of the requested size. Players
    /// are shuffled first; when the pool does not divide evenly the last
    /// team is smaller. The host is skipped unless they chose to play.
    pub fn partition(
        server: &dyn ServerBridge,
        host: ParticipantId,
        host_playing: bool,
        team_size: TeamSize,
        rng: &mut impl Rng,
    ) -> Self {
        let mut pool = server.online_participants();
        if !host_playing {
            pool.retain(|id| *id != host);
        }
        pool.shuffle(rng);

        let mut manager = Self::default();
        for chunk in pool.chunks(team_size.size()) {
            let mut team = EventTeam::default();
            for id in chunk {
                team.add_member(*id, &server.name(*id));
            }
            manager.teams.push(team);
        }
        manager
    }

    pub fn teams(&self) -> &[EventTeam] {
        &self.teams
    }

    pub fn team_by_bracket_id(&self, id: BracketParticipantId) -> Option<&EventTeam> {
        self.teams.iter().find(|t| t.bracket_id() == Some(id))
    }

    pub fn team_by_name_mut(&mut self, name: &str) -> Option<&mut EventTeam> {
        self.teams.iter_mut().find(|t| t.name() == name)
    }

    pub fn team_of(&self, id: ParticipantId) -> Option<&EventTeam> {
        self.teams.iter().find(|t| t.members().contains(&id))
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.teams
            .iter()
            .flat_map(|t| t.members().iter().copied())
            .collect()
    }
}
