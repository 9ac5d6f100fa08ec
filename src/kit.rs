use crate::server::ServerBridge;
use crate::types::{InstanceId, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumIter};

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum KitId {
    Archer,
    Horse,
}

impl KitId {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Archer => "Archer",
            Self::Horse => "Horse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub kind: String,
    pub count: u8,
    pub display_name: Option<String>,
}

impl Item {
    pub fn new(kind: &str, count: u8) -> Self {
        Self {
            kind: kind.to_string(),
            count,
            display_name: None,
        }
    }

    pub fn named(kind: &str, count: u8, display_name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            count,
            display_name: Some(display_name.to_string()),
        }
    }
}

/// Fixed slot-to-item assignment applied at round start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub items: Vec<(u8, Item)>,
}

impl Loadout {
    pub fn with_item(mut self, slot: u8, item: Item) -> Self {
        self.items.push((slot, item));
        self
    }

    /// The two-slot tool set handed to spectators who were never match members.
    pub fn spectator() -> Self {
        Self::default()
            .with_item(3, Item::named("ender_eye", 1, "Spectate"))
            .with_item(7, Item::named("red_bed", 1, "Leave Match"))
    }
}

/// How a kit interacts with the world beyond its loadout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KitKind {
    Standard,
    /// Spawns a mount bound to the player at loadout time.
    Mounted,
}

/// A named ruleset bundle: loadout plus the fixed hook set consumed by the
/// host server's listeners.
#[derive(Debug, Clone)]
pub struct Kit {
    pub id: KitId,
    pub kind: KitKind,
    pub loadout: Loadout,
    pub natural_regeneration: bool,
    pub void_kill: bool,
    pub water_kill: bool,
}

impl Kit {
    fn archer() -> Self {
        let loadout = Loadout::default()
            .with_item(0, Item::new("bow", 1))
            .with_item(35, Item::new("arrow", 1))
            .with_item(36, Item::new("leather_boots", 1))
            .with_item(37, Item::new("leather_leggings", 1))
            .with_item(38, Item::new("leather_chestplate", 1))
            .with_item(39, Item::new("leather_helmet", 1));

        Self {
            id: KitId::Archer,
            kind: KitKind::Standard,
            loadout,
            natural_regeneration: false,
            void_kill: true,
            water_kill: false,
        }
    }

    fn horse() -> Self {
        let loadout = Loadout::default()
            .with_item(0, Item::new("iron_sword", 1))
            .with_item(3, Item::new("bow", 1))
            .with_item(5, Item::new("golden_apple", 2))
            .with_item(6, Item::new("cooked_beef", 64))
            .with_item(34, Item::new("arrow", 64))
            .with_item(35, Item::new("arrow", 64))
            .with_item(36, Item::new("iron_boots", 1))
            .with_item(37, Item::new("iron_leggings", 1))
            .with_item(38, Item::new("iron_chestplate", 1))
            .with_item(39, Item::new("iron_helmet", 1));

        Self {
            id: KitId::Horse,
            kind: KitKind::Mounted,
            loadout,
            natural_regeneration: true,
            void_kill: true,
            water_kill: false,
        }
    }

    pub fn display_name(&self) -> &'static str {
        self.id.display_name()
    }

    /// Apply the kit to a participant at round start.
    pub fn apply(&self, server: &dyn ServerBridge, id: ParticipantId, instance: InstanceId) {
        server.apply_loadout(id, &self.loadout);
        if self.kind == KitKind::Mounted {
            server.spawn_mount(id, instance);
        }
    }

    /// Ruleset-specific hook that runs before a participant leaves a match.
    pub fn on_leave(&self, server: &dyn ServerBridge, id: ParticipantId) {
        if self.kind == KitKind::Mounted {
            server.release_mount(id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct KitRegistry {
    kits: HashMap<KitId, Kit>,
}

impl Default for KitRegistry {
    fn default() -> Self {
        let mut kits = HashMap::new();
        for kit in [Kit::archer(), Kit::horse()] {
            kits.insert(kit.id, kit);
        }
        Self { kits }
    }
}

impl KitRegistry {
    pub fn get(&self, id: KitId) -> Option<&Kit> {
        self.kits.get(&id)
    }
}
