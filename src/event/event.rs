use super::team::EventTeamManager;
use crate::bracket::types::{BracketParticipant, TournamentInfo};
use crate::server::ServerBridge;
use itertools::Itertools;

/// A live tournament: the remote bracket it is mirrored on and the local
/// team roster. Created once the bracket service has acknowledged the
/// tournament and its participants.
#[derive(Debug, Clone)]
pub struct DuelEvent {
    tournament: TournamentInfo,
    pub teams: EventTeamManager,
}

impl DuelEvent {
    pub fn new(tournament: TournamentInfo, teams: EventTeamManager) -> Self {
        Self { tournament, teams }
    }

    pub fn tournament(&self) -> &TournamentInfo {
        &self.tournament
    }

    pub fn bracket_url(&self) -> String {
        self.tournament.full_url()
    }

    /// Stores the bracket id of every registered team, matched by the name
    /// the registration echoed back.
    pub fn assign_bracket_ids(&mut self, participants: &[BracketParticipant]) {
        for participant in participants {
            if let Some(team) = self.teams.team_by_name_mut(&participant.name) {
                team.set_bracket_id(participant.id);
            }
        }
    }

    pub fn broadcast(&self, server: &dyn ServerBridge, message: &str) {
        for id in self.teams.participants() {
            server.send_message(id, message);
        }
    }

    pub fn announce_start(
        &self,
        server: &dyn ServerBridge,
        host_name: &str,
        kit_name: &str,
        format_line: &str,
    ) {
        for id in server.online_participants() {
            server.send_message(id, &format!("{host_name}'s Tournament"));
            server.send_message(id, &format!("Kit: {kit_name}"));
            server.send_message(id, &format!("Teams: {format_line}"));
            server.send_message(id, &format!("Bracket: {}", self.bracket_url()));
        }
    }

    /// Announces the podium once the bracket is finalized. Placements come
    /// from the remote final ranks; a missing third place reads "None".
    pub fn announce_standings(
        &self,
        server: &dyn ServerBridge,
        kit_name: &str,
        standings: &[BracketParticipant],
    ) {
        let ranked = standings
            .iter()
            .filter(|p| p.final_rank.is_some())
            .sorted_by_key(|p| p.final_rank)
            .collect::<Vec<_>>();

        let place = |index: usize| {
            ranked
                .get(index)
                .map(|p| p.name.as_str())
                .unwrap_or("None")
                .to_string()
        };

        self.broadcast(server, "Tournament");
        self.broadcast(server, &format!("Kit: {kit_name}"));
        self.broadcast(server, &format!("1st: {}", place(0)));
        self.broadcast(server, &format!("2nd: {}", place(1)));
        self.broadcast(server, &format!("3rd: {}", place(2)));
        self.broadcast(server, &format!("Bracket: {}", self.bracket_url()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::manager::TeamSize;
    use crate::event::team::EventTeamManager;
    use crate::server::LocalServer;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn sample_event(server: &LocalServer) -> DuelEvent {
        let host = server.connect("Host");
        server.connect("Ada");
        server.connect("Borja");
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let teams = EventTeamManager::partition(server, host, true, TeamSize::OneVOne, &mut rng);
        DuelEvent::new(
            TournamentInfo {
                id: 3,
                url: "weekly_cup".to_string(),
            },
            teams,
        )
    }

    #[test]
    fn test_assign_bracket_ids_by_name() {
        let server = LocalServer::new();
        let mut event = sample_event(&server);
        let names = event
            .teams
            .teams()
            .iter()
            .map(|t| t.name().to_string())
            .collect::<Vec<_>>();

        let participants = names
            .iter()
            .enumerate()
            .map(|(i, name)| BracketParticipant {
                id: (i + 1) as u64,
                name: name.clone(),
                final_rank: None,
            })
            .collect::<Vec<_>>();
        event.assign_bracket_ids(&participants);

        for (i, name) in names.iter().enumerate() {
            let team = event.teams.team_by_bracket_id((i + 1) as u64);
            assert_eq!(team.map(|t| t.name()), Some(name.as_str()));
        }
    }

    #[test]
    fn test_standings_third_place_missing() {
        let server = LocalServer::new();
        let event = sample_event(&server);
        let watcher = event.teams.participants()[0];

        let standings = vec![
            BracketParticipant {
                id: 1,
                name: "Ada".into(),
                final_rank: Some(2),
            },
            BracketParticipant {
                id: 2,
                name: "Borja".into(),
                final_rank: Some(1),
            },
        ];
        event.announce_standings(&server, "Archer", &standings);

        let messages = server.messages(watcher);
        assert!(messages.iter().any(|m| m == "1st: Borja"));
        assert!(messages.iter().any(|m| m == "2nd: Ada"));
        assert!(messages.iter().any(|m| m == "3rd: None"));
        assert!(messages
            .iter()
            .any(|m| m == "Bracket: https://challonge.com/weekly_cup"));
    }

    #[test]
    fn test_broadcast_reaches_every_member() {
        let server = LocalServer::new();
        let event = sample_event(&server);
        event.broadcast(&server, "hello");

        for id in event.teams.participants() {
            assert!(server.messages(id).contains(&"hello".to_string()));
        }
        assert!(server.messages(Uuid::new_v4()).is_empty());
    }
}
