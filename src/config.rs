use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowBehavior {
    #[serde(alias = "double-chest")]
    AllowTwinLayout,
    #[serde(alias = "single-chest")]
    SingleOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidLocationBehavior {
    /// search outward for the closest usable cell
    ClosestValid,
    /// only ever try the death location itself
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignPlacement {
    /// a wall sign on the first free horizontal face
    Front,
    /// a standing sign on top of the chest
    Above,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub enabled: bool,
    pub create_chest: bool,
    pub max_search_radius: i32,
    pub invalid_location_behavior: InvalidLocationBehavior,
    /// minutes, 0 disables expiry
    pub chest_lifetime: u32,
    /// minutes before expiry, 0 disables warnings
    pub expiry_warning_time: u32,
    /// ticks between expiry sweeps
    pub sweep_interval: u32,
    pub overflow_behavior: OverflowBehavior,
    pub excluded_items: Vec<String>,
    pub replaceable_blocks: Vec<String>,
    pub persistent_storage: bool,
    pub respect_protection_plugins: bool,
    pub protect_chest: bool,
    pub named_container: bool,
    pub store_experience: bool,
    pub enable_sign: bool,
    pub sign_placement: SignPlacement,
    /// wood type, `oak`, `spruce`, `birch` or `dark_oak`
    pub sign_material: String,
    pub sign_lines: Vec<String>,
    pub enable_hologram: bool,
    pub hologram_text: String,
    /// refresh hologram text with the minutes left, every `hologram-interval` ticks
    pub show_time_remaining: bool,
    pub hologram_interval: u32,
    pub debug: bool,
    pub messages: Messages,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            create_chest: true,
            max_search_radius: 10,
            invalid_location_behavior: InvalidLocationBehavior::ClosestValid,
            chest_lifetime: 15,
            expiry_warning_time: 5,
            sweep_interval: TICKS_PER_SECOND * 60,
            overflow_behavior: OverflowBehavior::AllowTwinLayout,
            excluded_items: vec![],
            replaceable_blocks: [
                "air", "cave_air", "void_air", "water", "short_grass", "tall_grass",
                "seagrass", "fern", "snow", "vine", "dead_bush",
            ].iter().map(|s| s.to_string()).collect(),
            persistent_storage: true,
            respect_protection_plugins: true,
            protect_chest: true,
            named_container: true,
            store_experience: true,
            enable_sign: true,
            sign_placement: SignPlacement::Front,
            sign_material: "oak".into(),
            sign_lines: vec!["Death Chest".into(), "{player}".into(), "Rest in peace".into(), "".into()],
            enable_hologram: true,
            hologram_text: "&c{player}'s Death Chest".into(),
            show_time_remaining: true,
            hologram_interval: TICKS_PER_SECOND * 10,
            debug: false,
            messages: Messages::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Messages {
    pub chest_created: String,
    pub no_valid_location: String,
    pub collected: String,
    pub expiry_warning: String,
    pub expired: String,
    pub no_permission: String,
    pub sign_protected: String,
    pub experience_recovered: String,
}
impl Default for Messages {
    fn default() -> Self {
        Self {
            chest_created: "&c[DeathChest] &fYour items have been stored in a chest at &e{location}".into(),
            no_valid_location: "&c[DeathChest] Could not create a chest. Items dropped normally.".into(),
            collected: "&aYou have collected all items from your death chest!".into(),
            expiry_warning: "&eYour death chest at &f{location} &ewill disappear in &f{time} minutes&e!".into(),
            expired: "&c[DeathChest] Your death chest at &f{x}, {y}, {z} &chas expired!".into(),
            no_permission: "&c[DeathChest] This is not your death chest!".into(),
            sign_protected: "&c[DeathChest] You cannot break this sign while the chest has items in it!".into(),
            experience_recovered: "&a[DeathChest] You recovered {amount} experience points!".into(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&text)
    }
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn lifetime_millis(&self) -> Millis {
        self.chest_lifetime as Millis * MILLIS_PER_MINUTE
    }
    pub fn warning_window_millis(&self) -> Millis {
        self.expiry_warning_time as Millis * MILLIS_PER_MINUTE
    }
    /// `0` means the chest never expires.
    pub fn expiry_for(&self, created_at: Millis) -> Millis {
        if self.chest_lifetime == 0 {
            0
        } else {
            created_at + self.lifetime_millis()
        }
    }

    /// Resolves `replaceable-blocks`, dropping names that aren't known blocks.
    pub fn replaceable_set(&self) -> HashSet<Block> {
        self.replaceable_blocks.iter().filter_map(|name| {
            let block = Block::from_name(name);
            if block.is_none() {
                log::warn!("ignoring unknown block {name:?} in replaceable-blocks");
            }
            block
        }).collect()
    }
    /// The wall and standing sign for `sign-material`, oak when the wood isn't known.
    pub fn sign_blocks(&self) -> (Block, Block) {
        let wood = self.sign_material.trim();
        match (Block::from_name(&format!("{wood}_wall_sign")), Block::from_name(&format!("{wood}_sign"))) {
            (Some(wall), Some(standing)) if wall.is_wall_sign() => (wall, standing),
            _ => {
                log::warn!("unknown sign-material {:?}, using oak", self.sign_material);
                (Block::OAK_WALL_SIGN, Block::OAK_SIGN)
            }
        }
    }
    pub fn is_excluded(&self, stack: &ItemStack) -> bool {
        let key = namespaced(&stack.item);
        self.excluded_items.iter().any(|excluded| namespaced(excluded) == key)
    }
}

fn namespaced(key: &str) -> String {
    let key = key.trim().to_ascii_lowercase();
    if key.contains(':') {
        key
    } else {
        format!("minecraft:{key}")
    }
}
