use super::game::Game;
use super::team::TeamColor;
use crate::arena::Arena;
use crate::config::SETTLE_DELAY;
use crate::kit::Kit;
use crate::server::InstanceProvider;
use crate::types::{BracketMatchId, BracketParticipantId, GameId, InstanceId, ParticipantId, Tick};

#[derive(Debug, Clone)]
pub struct PendingTeam {
    pub name: String,
    pub members: Vec<ParticipantId>,
    pub bracket_participant: BracketParticipantId,
}

#[derive(Debug)]
struct PendingMatch {
    bracket_match: BracketMatchId,
    arena: Arena,
    instance: InstanceId,
    teams: Vec<PendingTeam>,
    duplicated: bool,
    start_after: Tick,
}

/// A match handed over by the scheduler, ready to be registered and started.
pub struct StartedMatch {
    pub game: Game,
    pub slots: Vec<(TeamColor, BracketParticipantId)>,
}

/// Holds matches between their bracket mark-underway and their physical
/// start: each one waits out a short settle delay and the duplication of its
/// arena instance. A failed duplication stays queued and is attempted again
/// on the next tick.
#[derive(Default)]
pub struct MatchScheduler {
    pending: Vec<PendingMatch>,
}

impl MatchScheduler {
    pub fn enqueue(
        &mut self,
        provider: &dyn InstanceProvider,
        bracket_match: BracketMatchId,
        arena: Arena,
        teams: Vec<PendingTeam>,
        now: Tick,
    ) {
        let instance = InstanceId::new_v4();
        let duplicated = match provider.duplicate(&arena, instance) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to duplicate arena {} for bracket match {bracket_match}: {e}", arena.id);
                false
            }
        };

        self.pending.push(PendingMatch {
            bracket_match,
            arena,
            instance,
            teams,
            duplicated,
            start_after: now + SETTLE_DELAY,
        });
    }

    pub fn contains(&self, bracket_match: BracketMatchId) -> bool {
        self.pending.iter().any(|p| p.bracket_match == bracket_match)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Clears the queue, releasing any instance that was already duplicated.
    pub fn clear(&mut self, provider: &dyn InstanceProvider) {
        for pending in self.pending.drain(..) {
            if pending.duplicated {
                provider.teardown(pending.instance);
            }
        }
    }

    pub fn tick(
        &mut self,
        provider: &dyn InstanceProvider,
        kit: &Kit,
        needed_wins: u32,
        now: Tick,
    ) -> Vec<StartedMatch> {
        let mut started = vec![];
        let mut still_pending = vec![];

        for mut pending in self.pending.drain(..) {
            if !pending.duplicated {
                match provider.duplicate(&pending.arena, pending.instance) {
                    Ok(()) => pending.duplicated = true,
                    Err(e) => {
                        log::warn!(
                            "Retrying duplication of arena {} for bracket match {}: {e}",
                            pending.arena.id,
                            pending.bracket_match
                        );
                        still_pending.push(pending);
                        continue;
                    }
                }
            }

            if now < pending.start_after || !provider.is_ready(pending.instance) {
                still_pending.push(pending);
                continue;
            }

            let mut game = Game::new(
                GameId::new_v4(),
                pending.instance,
                pending.arena,
                kit.clone(),
                needed_wins,
                Some(pending.bracket_match),
            );
            let mut slots = vec![];
            for team in pending.teams {
                if let Some(color) = game.add_team(team.name, team.members) {
                    slots.push((color, team.bracket_participant));
                }
            }
            log::info!(
                "Bracket match {} starting in instance {}",
                pending.bracket_match,
                game.instance()
            );
            started.push(StartedMatch { game, slots });
        }

        self.pending = still_pending;
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaManager;
    use crate::kit::{KitId, KitRegistry};
    use crate::server::LocalProvider;
    use uuid::Uuid;

    fn teams() -> Vec<PendingTeam> {
        vec![
            PendingTeam {
                name: "Ada".into(),
                members: vec![Uuid::new_v4()],
                bracket_participant: 11,
            },
            PendingTeam {
                name: "Borja".into(),
                members: vec![Uuid::new_v4()],
                bracket_participant: 22,
            },
        ]
    }

    fn archer_arena() -> Arena {
        ArenaManager::builtin().eligible(KitId::Archer)[0].clone()
    }

    #[test]
    fn test_waits_for_readiness_and_settle_delay() {
        let provider = LocalProvider::new(1);
        let kits = KitRegistry::default();
        let kit = kits.get(KitId::Archer).unwrap();
        let mut scheduler = MatchScheduler::default();
        scheduler.enqueue(&provider, 5, archer_arena(), teams(), 0);
        assert!(scheduler.contains(5));

        // Settle delay not yet over.
        assert!(scheduler.tick(&provider, kit, 2, 0).is_empty());
        // Instance not ready on the first poll.
        assert!(scheduler.tick(&provider, kit, 2, SETTLE_DELAY).is_empty());

        let started = scheduler.tick(&provider, kit, 2, SETTLE_DELAY * 2);
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].slots[0], (TeamColor::Red, 11));
        assert_eq!(started[0].slots[1], (TeamColor::Green, 22));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_failed_duplication_is_retried() {
        let provider = LocalProvider::new(1);
        let kits = KitRegistry::default();
        let kit = kits.get(KitId::Archer).unwrap();
        let mut scheduler = MatchScheduler::default();

        provider.fail_next_duplicate();
        scheduler.enqueue(&provider, 6, archer_arena(), teams(), 0);
        assert!(scheduler.contains(6));

        // The retry duplicates, the next tick sees the instance ready.
        assert!(scheduler.tick(&provider, kit, 2, SETTLE_DELAY).is_empty());
        let started = scheduler.tick(&provider, kit, 2, SETTLE_DELAY * 2);
        assert_eq!(started.len(), 1);
    }
}
