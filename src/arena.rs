use crate::kit::KitId;
use crate::types::AppResult;
use anyhow::anyhow;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl SpawnPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

/// An area in which a match is played. Arenas are templates: every match
/// runs in a freshly duplicated instance of the arena's persisted layout.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Arena {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub builders: String,
    #[serde(default)]
    pub void_level: i32,
    pub spawns: Vec<SpawnPoint>,
    pub spectator_spawn: SpawnPoint,
    pub tournament_spawn: SpawnPoint,
    pub kits: Vec<KitId>,
}

impl Arena {
    pub fn supports(&self, kit: KitId) -> bool {
        self.kits.contains(&kit)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ArenaManager {
    arenas: Vec<Arena>,
}

impl ArenaManager {
    pub fn new(arenas: Vec<Arena>) -> Self {
        Self { arenas }
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let arenas: Vec<Arena> = serde_json::from_str(&data)?;
        if arenas.is_empty() {
            return Err(anyhow!("No arenas defined in {}", path.display()));
        }
        Ok(Self { arenas })
    }

    /// A small built-in set used by the demo binary and tests.
    pub fn builtin() -> Self {
        let arenas = vec![
            Arena {
                id: "quarry".to_string(),
                name: "The Quarry".to_string(),
                builders: "duelgrounds".to_string(),
                void_level: -12,
                spawns: vec![
                    SpawnPoint::new(-24.0, 65.0, 0.0),
                    SpawnPoint::new(24.0, 65.0, 0.0),
                ],
                spectator_spawn: SpawnPoint::new(0.0, 80.0, 0.0),
                tournament_spawn: SpawnPoint::new(0.0, 72.0, -32.0),
                kits: vec![KitId::Archer, KitId::Horse],
            },
            Arena {
                id: "meadow".to_string(),
                name: "Open Meadow".to_string(),
                builders: "duelgrounds".to_string(),
                void_level: 0,
                spawns: vec![
                    SpawnPoint::new(-40.0, 64.0, -40.0),
                    SpawnPoint::new(40.0, 64.0, 40.0),
                    SpawnPoint::new(-40.0, 64.0, 40.0),
                ],
                spectator_spawn: SpawnPoint::new(0.0, 90.0, 0.0),
                tournament_spawn: SpawnPoint::new(0.0, 64.0, -60.0),
                kits: vec![KitId::Horse],
            },
            Arena {
                id: "rooftops".to_string(),
                name: "Rooftops".to_string(),
                builders: "duelgrounds".to_string(),
                void_level: 40,
                spawns: vec![
                    SpawnPoint::new(-16.0, 92.0, 8.0),
                    SpawnPoint::new(16.0, 92.0, -8.0),
                ],
                spectator_spawn: SpawnPoint::new(0.0, 104.0, 0.0),
                tournament_spawn: SpawnPoint::new(0.0, 92.0, 24.0),
                kits: vec![KitId::Archer],
            },
        ];
        Self { arenas }
    }

    pub fn arenas(&self) -> &[Arena] {
        &self.arenas
    }

    pub fn eligible(&self, kit: KitId) -> Vec<&Arena> {
        self.arenas.iter().filter(|a| a.supports(kit)).collect()
    }

    /// Uniform random choice among the arenas supporting the kit.
    pub fn choose(&self, kit: KitId, rng: &mut impl Rng) -> Option<&Arena> {
        self.eligible(kit).choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_eligibility() {
        let manager = ArenaManager::builtin();
        let archer_arenas = manager.eligible(KitId::Archer);
        assert_eq!(archer_arenas.len(), 2);
        assert!(archer_arenas.iter().all(|a| a.supports(KitId::Archer)));
    }

    #[test]
    fn test_choose_respects_kit() {
        let manager = ArenaManager::builtin();
        let rng = &mut ChaCha8Rng::seed_from_u64(7);
        for _ in 0..32 {
            let arena = manager.choose(KitId::Horse, rng).unwrap();
            assert!(arena.supports(KitId::Horse));
        }
    }

    #[test]
    fn test_choose_empty() {
        let manager = ArenaManager::new(vec![]);
        let rng = &mut ChaCha8Rng::seed_from_u64(7);
        assert!(manager.choose(KitId::Archer, rng).is_none());
    }
}
