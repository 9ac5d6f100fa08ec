use super::game::{Game, SeriesResult};
use crate::server::{InstanceProvider, ServerBridge};
use crate::types::{BracketMatchId, GameId, InstanceId, ParticipantId, Tick};
use std::collections::HashMap;

/// Registry of live games, indexed for the lookups the rest of the engine
/// needs: by participant, by arena instance and by bracket match.
#[derive(Default)]
pub struct GameManager {
    games: HashMap<GameId, Game>,
}

impl GameManager {
    pub fn add_game(&mut self, game: Game) {
        self.games.insert(game.id(), game);
    }

    pub fn game(&self, id: GameId) -> Option<&Game> {
        self.games.get(&id)
    }

    pub fn game_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.games.get_mut(&id)
    }

    pub fn games(&self) -> impl Iterator<Item = &Game> {
        self.games.values()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn game_of(&mut self, participant: ParticipantId) -> Option<&mut Game> {
        self.games.values_mut().find(|g| g.contains(participant))
    }

    pub fn game_in_instance(&mut self, instance: InstanceId) -> Option<&mut Game> {
        self.games.values_mut().find(|g| g.instance() == instance)
    }

    pub fn game_for_bracket_match(&self, id: BracketMatchId) -> Option<&Game> {
        self.games.values().find(|g| g.bracket_match() == Some(id))
    }

    /// Steps every live game and collects decided series, tagged with the
    /// game that produced them.
    pub fn tick_all(&mut self, server: &dyn ServerBridge, now: Tick) -> Vec<(GameId, SeriesResult)> {
        let mut decided = vec![];
        for game in self.games.values_mut() {
            for result in game.tick(server, now) {
                decided.push((game.id(), result));
            }
        }
        decided
    }

    /// Drops the game and releases its arena instance.
    pub fn delete_game(&mut self, id: GameId, provider: &dyn InstanceProvider) {
        if let Some(game) = self.games.remove(&id) {
            log::info!("Releasing instance {} of game {id}", game.instance());
            provider.teardown(game.instance());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaManager;
    use crate::kit::{KitId, KitRegistry};
    use crate::server::LocalProvider;
    use uuid::Uuid;

    fn sample_game(bracket_match: BracketMatchId) -> (Game, ParticipantId) {
        let arenas = ArenaManager::builtin();
        let kits = KitRegistry::default();
        let mut game = Game::new(
            GameId::new_v4(),
            InstanceId::new_v4(),
            arenas.eligible(KitId::Archer)[0].clone(),
            kits.get(KitId::Archer).unwrap().clone(),
            2,
            Some(bracket_match),
        );
        let member = Uuid::new_v4();
        game.add_team("Solo".into(), vec![member]).unwrap();
        (game, member)
    }

    #[test]
    fn test_lookups() {
        let mut manager = GameManager::default();
        let (game, member) = sample_game(9);
        let id = game.id();
        let instance = game.instance();
        manager.add_game(game);

        assert_eq!(manager.game_of(member).map(|g| g.id()), Some(id));
        assert_eq!(manager.game_in_instance(instance).map(|g| g.id()), Some(id));
        assert!(manager.game_for_bracket_match(9).is_some());
        assert!(manager.game_for_bracket_match(10).is_none());
    }

    #[test]
    fn test_delete_releases_instance() {
        let mut manager = GameManager::default();
        let provider = LocalProvider::new(0);
        let (game, _) = sample_game(1);
        let id = game.id();
        let instance = game.instance();
        manager.add_game(game);

        manager.delete_game(id, &provider);
        assert!(manager.is_empty());
        assert!(provider.is_torn_down(instance));
    }
}
