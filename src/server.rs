use crate::arena::{Arena, SpawnPoint};
use crate::kit::Loadout;
use crate::types::{AppResult, InstanceId, ParticipantId};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use strum::Display;

/// Position of a single block within an arena instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

pub type BlockKind = String;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Lobby {
    Ordinary,
    Tournament,
}

/// Narrow interface to the host game server. The engine never talks to
/// gameplay state except through this trait, so the whole orchestration
/// core can run against [`LocalServer`] in tests and in the demo binary.
pub trait ServerBridge: Send + Sync {
    fn online_participants(&self) -> Vec<ParticipantId>;
    fn is_online(&self, id: ParticipantId) -> bool;
    fn name(&self, id: ParticipantId) -> String;
    fn health_percent(&self, id: ParticipantId) -> u8;
    fn send_message(&self, id: ParticipantId, message: &str);
    fn teleport(&self, id: ParticipantId, instance: InstanceId, spawn: SpawnPoint);
    fn apply_loadout(&self, id: ParticipantId, loadout: &Loadout);
    fn clear_loadout(&self, id: ParticipantId);
    /// Reset transient combat state (close inventory, clear fire, restore collision).
    fn prepare_for_round(&self, id: ParticipantId);
    /// Adventure mode, full health and food, flight enabled, hidden collision.
    fn set_spectator_state(&self, id: ParticipantId);
    fn hide(&self, viewer: ParticipantId, target: ParticipantId);
    fn show(&self, viewer: ParticipantId, target: ParticipantId);
    fn spawn_mount(&self, id: ParticipantId, instance: InstanceId);
    fn release_mount(&self, id: ParticipantId);
    fn remove_transient_entities(&self, instance: InstanceId);
    fn set_block(&self, instance: InstanceId, pos: BlockPos, kind: &BlockKind);
    fn send_to_lobby(&self, id: ParticipantId, lobby: Lobby);
}

/// Interface to the world-provisioning layer: duplicating an arena's
/// persisted layout under a fresh instance id and tearing it down later.
/// Readiness is polled rather than awaited so the engine tick never blocks.
pub trait InstanceProvider: Send + Sync {
    fn duplicate(&self, arena: &Arena, instance: InstanceId) -> AppResult<()>;
    fn is_ready(&self, instance: InstanceId) -> bool;
    fn teardown(&self, instance: InstanceId);
}

#[derive(Debug, Default, Clone)]
struct PlayerState {
    name: String,
    online: bool,
    health_percent: u8,
    location: Option<(InstanceId, SpawnPoint)>,
    loadout_slots: usize,
    spectating: bool,
    mounted: bool,
    hidden_from: HashSet<ParticipantId>,
    lobby: Option<Lobby>,
    messages: Vec<String>,
}

#[derive(Debug, Default)]
struct InstanceState {
    blocks: HashMap<BlockPos, BlockKind>,
    transient_entities: usize,
}

/// In-memory [`ServerBridge`] backing the demo binary and the test suite.
#[derive(Debug, Default)]
pub struct LocalServer {
    inner: Mutex<LocalServerInner>,
}

#[derive(Debug, Default)]
struct LocalServerInner {
    players: HashMap<ParticipantId, PlayerState>,
    instances: HashMap<InstanceId, InstanceState>,
}

impl LocalServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, name: &str) -> ParticipantId {
        let id = ParticipantId::new_v4();
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner.players.insert(
            id,
            PlayerState {
                name: name.to_string(),
                online: true,
                health_percent: 100,
                ..Default::default()
            },
        );
        id
    }

    pub fn disconnect(&self, id: ParticipantId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.online = false;
        }
    }

    pub fn reconnect(&self, id: ParticipantId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.online = true;
        }
    }

    pub fn set_health_percent(&self, id: ParticipantId, health: u8) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.health_percent = health;
        }
    }

    pub fn messages(&self, id: ParticipantId) -> Vec<String> {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner
            .players
            .get(&id)
            .map(|p| p.messages.clone())
            .unwrap_or_default()
    }

    pub fn location(&self, id: ParticipantId) -> Option<(InstanceId, SpawnPoint)> {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner.players.get(&id).and_then(|p| p.location)
    }

    pub fn lobby(&self, id: ParticipantId) -> Option<Lobby> {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner.players.get(&id).and_then(|p| p.lobby)
    }

    pub fn is_spectating(&self, id: ParticipantId) -> bool {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner.players.get(&id).map(|p| p.spectating).unwrap_or(false)
    }

    pub fn block(&self, instance: InstanceId, pos: BlockPos) -> Option<BlockKind> {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner
            .instances
            .get(&instance)
            .and_then(|i| i.blocks.get(&pos).cloned())
    }

    /// Simulate a block mutation during live play; returns the previous kind.
    pub fn mutate_block(
        &self,
        instance: InstanceId,
        pos: BlockPos,
        kind: &BlockKind,
    ) -> Option<BlockKind> {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        let state = inner.instances.entry(instance).or_default();
        state.blocks.insert(pos, kind.clone())
    }
}

impl ServerBridge for LocalServer {
    fn online_participants(&self) -> Vec<ParticipantId> {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        let mut ids = inner
            .players
            .iter()
            .filter(|(_, p)| p.online)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        // Stable order so partitioning is reproducible under a seeded rng.
        ids.sort();
        ids
    }

    fn is_online(&self, id: ParticipantId) -> bool {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner.players.get(&id).map(|p| p.online).unwrap_or(false)
    }

    fn name(&self, id: ParticipantId) -> String {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner
            .players
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn health_percent(&self, id: ParticipantId) -> u8 {
        let inner = self.inner.lock().expect("Server lock should not be poisoned");
        inner
            .players
            .get(&id)
            .map(|p| p.health_percent)
            .unwrap_or(0)
    }

    fn send_message(&self, id: ParticipantId, message: &str) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.messages.push(message.to_string());
        }
    }

    fn teleport(&self, id: ParticipantId, instance: InstanceId, spawn: SpawnPoint) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.location = Some((instance, spawn));
            player.lobby = None;
        }
    }

    fn apply_loadout(&self, id: ParticipantId, loadout: &Loadout) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.loadout_slots = loadout.items.len();
        }
    }

    fn clear_loadout(&self, id: ParticipantId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.loadout_slots = 0;
        }
    }

    fn prepare_for_round(&self, id: ParticipantId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.spectating = false;
            player.health_percent = 100;
        }
    }

    fn set_spectator_state(&self, id: ParticipantId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.spectating = true;
            player.health_percent = 100;
        }
    }

    fn hide(&self, viewer: ParticipantId, target: ParticipantId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&target) {
            player.hidden_from.insert(viewer);
        }
    }

    fn show(&self, viewer: ParticipantId, target: ParticipantId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&target) {
            player.hidden_from.remove(&viewer);
        }
    }

    fn spawn_mount(&self, id: ParticipantId, instance: InstanceId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.mounted = true;
        }
        inner.instances.entry(instance).or_default().transient_entities += 1;
    }

    fn release_mount(&self, id: ParticipantId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.mounted = false;
        }
    }

    fn remove_transient_entities(&self, instance: InstanceId) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(state) = inner.instances.get_mut(&instance) {
            state.transient_entities = 0;
        }
        for player in inner.players.values_mut() {
            player.mounted = false;
        }
    }

    fn set_block(&self, instance: InstanceId, pos: BlockPos, kind: &BlockKind) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        let state = inner.instances.entry(instance).or_default();
        state.blocks.insert(pos, kind.clone());
    }

    fn send_to_lobby(&self, id: ParticipantId, lobby: Lobby) {
        let mut inner = self.inner.lock().expect("Server lock should not be poisoned");
        if let Some(player) = inner.players.get_mut(&id) {
            player.location = None;
            player.spectating = false;
            player.lobby = Some(lobby);
        }
    }
}

/// In-memory [`InstanceProvider`]. Instances become ready after a fixed
/// number of readiness polls, which is enough to exercise the scheduler's
/// pending queue.
#[derive(Debug)]
pub struct LocalProvider {
    ready_after_polls: u32,
    inner: Mutex<LocalProviderInner>,
}

#[derive(Debug, Default)]
struct LocalProviderInner {
    pending: HashMap<InstanceId, u32>,
    ready: HashSet<InstanceId>,
    fail_next: bool,
}

impl LocalProvider {
    pub fn new(ready_after_polls: u32) -> Self {
        Self {
            ready_after_polls,
            inner: Mutex::new(LocalProviderInner::default()),
        }
    }

    /// Make the next duplication attempt fail, to exercise retry paths.
    pub fn fail_next_duplicate(&self) {
        let mut inner = self.inner.lock().expect("Provider lock should not be poisoned");
        inner.fail_next = true;
    }

    pub fn is_torn_down(&self, instance: InstanceId) -> bool {
        let inner = self.inner.lock().expect("Provider lock should not be poisoned");
        !inner.ready.contains(&instance) && !inner.pending.contains_key(&instance)
    }
}

impl InstanceProvider for LocalProvider {
    fn duplicate(&self, arena: &Arena, instance: InstanceId) -> AppResult<()> {
        let mut inner = self.inner.lock().expect("Provider lock should not be poisoned");
        if inner.fail_next {
            inner.fail_next = false;
            return Err(anyhow!("Failed to copy layout of arena {}", arena.id));
        }
        inner.pending.insert(instance, self.ready_after_polls);
        Ok(())
    }

    fn is_ready(&self, instance: InstanceId) -> bool {
        let mut inner = self.inner.lock().expect("Provider lock should not be poisoned");
        if inner.ready.contains(&instance) {
            return true;
        }
        match inner.pending.get_mut(&instance) {
            Some(0) => {
                inner.pending.remove(&instance);
                inner.ready.insert(instance);
                true
            }
            Some(polls_left) => {
                *polls_left -= 1;
                false
            }
            None => false,
        }
    }

    fn teardown(&self, instance: InstanceId) {
        let mut inner = self.inner.lock().expect("Provider lock should not be poisoned");
        inner.pending.remove(&instance);
        inner.ready.remove(&instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn test_local_server_visibility() {
        let server = LocalServer::new();
        let viewer = server.connect("Watcher");
        let target = server.connect("Fighter");

        server.hide(viewer, target);
        server.show(viewer, target);
        assert!(server.is_online(viewer));
        assert_eq!(server.name(target), "Fighter");

        server.disconnect(target);
        assert!(!server.is_online(target));
        assert_eq!(server.online_participants(), vec![viewer]);
    }

    #[test]
    fn test_local_provider_readiness() {
        let provider = LocalProvider::new(2);
        let arena = Arena::default();
        let instance = InstanceId::new_v4();
        provider.duplicate(&arena, instance).unwrap();

        assert!(!provider.is_ready(instance));
        assert!(!provider.is_ready(instance));
        assert!(provider.is_ready(instance));
        assert!(provider.is_ready(instance));

        provider.teardown(instance);
        assert!(provider.is_torn_down(instance));
    }

    #[test]
    fn test_local_provider_failure() {
        let provider = LocalProvider::new(0);
        let arena = Arena::default();
        provider.fail_next_duplicate();
        assert!(provider.duplicate(&arena, InstanceId::new_v4()).is_err());
        assert!(provider.duplicate(&arena, InstanceId::new_v4()).is_ok());
    }
}
