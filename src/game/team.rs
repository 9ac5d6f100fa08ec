use crate::types::ParticipantId;
use std::collections::HashSet;
use strum::Display;
use strum_macros::EnumIter;

/// Colors in allocation order. A game hands these out as teams are created
/// and returns them to the pool when a team is deleted.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum TeamColor {
    Red,
    Green,
    Blue,
    Yellow,
    Purple,
    Orange,
    Aqua,
    Pink,
    DarkGreen,
    Black,
    White,
}

impl TeamColor {
    pub const PALETTE: [TeamColor; 11] = [
        TeamColor::Red,
        TeamColor::Green,
        TeamColor::Blue,
        TeamColor::Yellow,
        TeamColor::Purple,
        TeamColor::Orange,
        TeamColor::Aqua,
        TeamColor::Pink,
        TeamColor::DarkGreen,
        TeamColor::Black,
        TeamColor::White,
    ];
}

/// One side of a game. Members never change after creation; the alive set
/// shrinks as fighters fall and is refilled at the start of every round.
#[derive(Debug, Clone)]
pub struct Team {
    pub color: TeamColor,
    pub name: String,
    pub members: Vec<ParticipantId>,
    pub alive: HashSet<ParticipantId>,
    pub score: u32,
}

impl Team {
    pub fn is_wiped(&self) -> bool {
        self.alive.is_empty()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.members.contains(&id)
    }

    fn revive_all(&mut self) {
        self.alive = self.members.iter().copied().collect();
    }
}

#[derive(Debug, Default)]
pub struct TeamRoster {
    teams: Vec<Team>,
}

impl TeamRoster {
    pub fn create_team(&mut self, name: String, members: Vec<ParticipantId>) -> Option<TeamColor> {
        let used = self.teams.iter().map(|t| t.color).collect::<HashSet<_>>();
        let color = TeamColor::PALETTE
            .iter()
            .find(|c| !used.contains(c))
            .copied()?;
        let alive = members.iter().copied().collect();
        self.teams.push(Team {
            color,
            name,
            members,
            alive,
            score: 0,
        });
        Some(color)
    }

    pub fn delete_team(&mut self, color: TeamColor) {
        self.teams.retain(|t| t.color != color);
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, color: TeamColor) -> Option<&Team> {
        self.teams.iter().find(|t| t.color == color)
    }

    pub fn team_mut(&mut self, color: TeamColor) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.color == color)
    }

    pub fn team_of(&self, id: ParticipantId) -> Option<&Team> {
        self.teams.iter().find(|t| t.contains(id))
    }

    pub fn team_of_mut(&mut self, id: ParticipantId) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.contains(id))
    }

    pub fn alive_teams(&self) -> Vec<TeamColor> {
        self.teams
            .iter()
            .filter(|t| !t.is_wiped())
            .map(|t| t.color)
            .collect()
    }

    pub fn kill_team(&mut self, color: TeamColor) {
        if let Some(team) = self.team_mut(color) {
            team.alive.clear();
        }
    }

    pub fn mark_dead(&mut self, id: ParticipantId) {
        if let Some(team) = self.team_of_mut(id) {
            team.alive.remove(&id);
        }
    }

    pub fn revive_all(&mut self) {
        for team in self.teams.iter_mut() {
            team.revive_all();
        }
    }

    pub fn members(&self) -> Vec<ParticipantId> {
        self.teams
            .iter()
            .flat_map(|t| t.members.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_color_allocation_order() {
        let mut roster = TeamRoster::default();
        let a = roster.create_team("A".into(), vec![Uuid::new_v4()]).unwrap();
        let b = roster.create_team("B".into(), vec![Uuid::new_v4()]).unwrap();
        assert_eq!(a, TeamColor::Red);
        assert_eq!(b, TeamColor::Green);

        // Deleting frees the color for the next team.
        roster.delete_team(TeamColor::Red);
        let c = roster.create_team("C".into(), vec![Uuid::new_v4()]).unwrap();
        assert_eq!(c, TeamColor::Red);
    }

    #[test]
    fn test_elimination_tracking() {
        let mut roster = TeamRoster::default();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let p3 = Uuid::new_v4();
        roster.create_team("A".into(), vec![p1, p2]).unwrap();
        roster.create_team("B".into(), vec![p3]).unwrap();

        roster.mark_dead(p1);
        assert_eq!(roster.alive_teams().len(), 2);
        roster.mark_dead(p2);
        assert_eq!(roster.alive_teams(), vec![TeamColor::Green]);

        roster.revive_all();
        assert_eq!(roster.alive_teams().len(), 2);
    }
}
