use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::access::{AccessPolicy, ProtectionChecker};
use crate::allocator::{allocate, distribute, storable_count, Allocation, Distribution};
use crate::config::{Config, InvalidLocationBehavior};
use crate::error::{ConfigError, StorageError};
use crate::host::{send, Players, PERMISSION_CHEST};
use crate::markers::{attached_signs, clear_cell, marker_text, place_sign, sign_holder};
use crate::prelude::*;
use crate::registry::{ChestRegistry, ContainerRecord, Half, Link};
use crate::scheduler::{sweep, Job, SweepReport, TimerHandle, Timers};
use crate::search::{find_placement, SiteRules};
use crate::storage::{LoadReport, STORE_FILE};
use crate::world::{Effect, WorldAccess};

pub const CONFIG_FILE: &str = "config.toml";

/// What the host hands over when a player dies.
#[derive(Debug, Clone)]
pub struct Death {
    pub player: PlayerId,
    pub origin: BlockPos,
    pub items: Vec<ItemStack>,
    /// total points, see [`total_experience`]
    pub experience: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathOutcome {
    /// No chest wanted. The host drops everything as usual.
    Skipped,
    /// No room for a chest. Everything is handed back.
    NoPlacement { leftovers: Vec<ItemStack> },
    /// The host drops `leftovers` and withholds `stored_experience` from the death drop.
    Placed {
        cells: Vec<BlockPos>,
        leftovers: Vec<ItemStack>,
        stored_experience: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Untracked,
    Denied,
    Opened { experience: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakDecision {
    /// Not ours to decide.
    Untracked,
    /// Let the break happen. A chest is no longer tracked and drops its contents normally.
    Allowed,
    Denied,
}

/// Converts a level and the progress towards the next one into experience points.
pub fn total_experience(level: u32, progress: f32) -> u32 {
    let l = level as f64;
    let base = match level {
        0..=16 => l * l + 6.0 * l,
        17..=31 => 2.5 * l * l - 40.5 * l + 360.0,
        _ => 4.5 * l * l - 162.5 * l + 2220.0,
    };
    let to_next = match level {
        0..=15 => 2 * level + 7,
        16..=30 => 5 * level - 38,
        _ => 9 * level - 158,
    };
    base as u32 + (progress.clamp(0.0, 1.0) as f64 * to_next as f64).round() as u32
}

/// Owns everything about death chests and reacts to the host's events.
pub struct DeathChests {
    config: Config,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    replaceable: HashSet<Block>,
    registry: ChestRegistry,
    protection: Option<Box<dyn ProtectionChecker>>,
    timers: Timers,
    handles: Vec<TimerHandle>,
    tick: u64,
}
impl DeathChests {
    /// Runs without any files: nothing is loaded or saved.
    pub fn new(config: Config) -> Self {
        Self {
            replaceable: config.replaceable_set(),
            config,
            config_path: None,
            data_dir: None,
            registry: ChestRegistry::new(),
            protection: None,
            timers: Timers::new(),
            handles: vec![],
            tick: 0,
        }
    }
    /// Reads `config.toml` from `data_dir` (defaults if it's missing or broken)
    /// and keeps the chest store next to it.
    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let config_path = data_dir.join(CONFIG_FILE);
        let config = match Config::load(&config_path) {
            Ok(config) => config,
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no {}, using the default configuration", config_path.display());
                Config::default()
            }
            Err(e) => {
                log::error!("{e}; using the default configuration");
                Config::default()
            }
        };
        Self {
            config_path: Some(config_path),
            data_dir: Some(data_dir),
            ..Self::new(config)
        }
    }
    pub fn with_protection(mut self, checker: Box<dyn ProtectionChecker>) -> Self {
        self.protection = Some(checker);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn registry(&self) -> &ChestRegistry {
        &self.registry
    }
    pub fn store_path(&self) -> Option<PathBuf> {
        self.data_dir.as_deref().map(|dir| dir.join(STORE_FILE))
    }
    pub fn current_tick(&self) -> u64 {
        self.tick
    }
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    fn policy(&self) -> AccessPolicy<'_> {
        AccessPolicy {
            protection: if self.config.respect_protection_plugins { self.protection.as_deref() } else { None },
        }
    }

    pub fn handle_death(&mut self, world: &mut dyn WorldAccess, players: &mut dyn Players, death: Death, now: Millis) -> DeathOutcome {
        let Death { player, origin, items, experience } = death;
        if !self.config.enabled || !self.config.create_chest {
            return DeathOutcome::Skipped;
        }
        if !players.has_permission(player, PERMISSION_CHEST) {
            log::debug!("{player} may not have a death chest");
            return DeathOutcome::Skipped;
        }
        let experience = if self.config.store_experience { experience } else { 0 };
        let storable = storable_count(&items, |i| self.config.is_excluded(i));
        if storable == 0 && experience == 0 {
            return DeathOutcome::Skipped;
        }

        let Some(allocation) = self.find_site(world, player, &origin, storable) else {
            log::debug!("no place for the death chest of {player} near {origin}");
            send(players, player, &self.config.messages.no_valid_location, Some(&origin), &[]);
            let leftovers = items.into_iter().filter(|i| !i.is_empty()).collect();
            return DeathOutcome::NoPlacement { leftovers };
        };
        let Distribution { primary, secondary, leftovers } = distribute(items, &allocation, |i| self.config.is_excluded(i));

        let name = players.name_of(player).unwrap_or_else(|| player.to_string());
        let expires_at = self.config.expiry_for(now);
        let mut cells = vec![allocation.primary.clone()];
        self.build_chest(world, &allocation.primary, allocation.primary_state, primary, &name);
        self.registry.register(allocation.primary.clone(), ContainerRecord::new(player, experience, now, expires_at));
        if let Some((pos, state)) = &allocation.secondary {
            self.build_chest(world, pos, *state, secondary, &name);
            self.registry.register(pos.clone(), ContainerRecord::new(player, 0, now, expires_at));
            self.registry.link(&allocation.primary, pos);
            cells.push(pos.clone());
        }
        self.decorate(world, &allocation.primary, &name, now);
        world.play_effect(&allocation.primary, Effect::Created);

        send(players, player, &self.config.messages.chest_created, Some(&allocation.primary), &[]);
        log::info!(
            "stored {} stacks and {experience} experience of {name} at {} ({} left over)",
            storable.min(allocation.capacity()),
            allocation.primary,
            leftovers.len()
        );
        DeathOutcome::Placed { cells, leftovers, stored_experience: experience }
    }

    fn find_site(&self, world: &dyn WorldAccess, player: PlayerId, origin: &BlockPos, storable: usize) -> Option<Allocation> {
        if !world.world_exists(&origin.world) {
            log::warn!("death in unknown world {}", origin.world);
            return None;
        }
        let policy = self.policy();
        let rules = SiteRules {
            replaceable: &self.replaceable,
            registry: &self.registry,
            builder: Some((player, &policy)),
        };
        let radius = match self.config.invalid_location_behavior {
            InvalidLocationBehavior::ClosestValid => self.config.max_search_radius,
            InvalidLocationBehavior::Cancel => 0,
        };
        let primary = find_placement(origin, radius, |cell| rules.is_usable(world, cell))?;
        Some(allocate(&primary, storable, self.config.overflow_behavior, |cell| {
            SiteRules::is_free_for_twin(world, cell)
                && !self.registry.contains(cell)
                && policy.can_build_at(player, cell)
        }))
    }

    fn build_chest(&self, world: &mut dyn WorldAccess, pos: &BlockPos, state: ChestState, items: Vec<ItemStack>, owner: &str) {
        world.set_block(pos, Block::CHEST);
        world.set_chest_kind(pos, state.kind);
        world.set_facing(pos, state.facing);
        world.set_inventory(pos, items);
        if self.config.named_container {
            world.set_custom_name(pos, &format!("{owner}'s Death Chest"));
        }
    }

    fn decorate(&self, world: &mut dyn WorldAccess, chest: &BlockPos, owner: &str, now: Millis) {
        if self.config.enable_sign {
            match place_sign(world, chest, &self.config, owner, now) {
                Some(sign) => log::debug!("placed sign for {chest} at {sign}"),
                None => log::debug!("no room for a sign at {chest}"),
            }
        }
        if self.config.enable_hologram {
            if let Some(record) = self.registry.lookup(chest) {
                world.spawn_marker(chest, &marker_text(&self.config, owner, record, now));
            }
        }
    }

    /// The owner gets the stored experience back the first time they open the chest.
    pub fn handle_open(&mut self, world: &mut dyn WorldAccess, players: &mut dyn Players, actor: PlayerId, pos: &BlockPos) -> OpenOutcome {
        let Some(record) = self.registry.lookup(pos) else {
            return OpenOutcome::Untracked;
        };
        if self.config.protect_chest && !self.policy().can_access(players, actor, record) {
            send(players, actor, &self.config.messages.no_permission, Some(pos), &[]);
            return OpenOutcome::Denied;
        }
        let owner = record.owner;
        // experience lives on the primary half
        let holder = match &record.linked {
            Some(Link { partner, half: Half::Secondary }) => partner.clone(),
            _ => pos.clone(),
        };
        world.play_effect(pos, Effect::Opened);

        let mut experience = 0;
        if actor == owner && self.config.store_experience {
            if let Some(record) = self.registry.lookup_mut(&holder) {
                experience = record.redeem_experience();
            }
            if experience > 0 {
                let amount = experience.to_string();
                send(players, actor, &self.config.messages.experience_recovered, Some(pos), &[("amount", amount)]);
                log::debug!("{actor} recovered {experience} experience at {holder}");
            }
        }
        OpenOutcome::Opened { experience }
    }

    /// Removes the chest once it's been emptied. Returns whether it was.
    pub fn handle_close(&mut self, world: &mut dyn WorldAccess, players: &mut dyn Players, actor: PlayerId, pos: &BlockPos) -> bool {
        if !self.registry.contains(pos) || !world.is_inventory_empty(pos) {
            return false;
        }
        let removed = self.remove_chest(world, pos);
        send(players, actor, &self.config.messages.collected, Some(pos), &[]);
        log::debug!("{actor} emptied the death chest at {pos}, removed {} cells", removed.len());
        true
    }

    fn remove_chest(&mut self, world: &mut dyn WorldAccess, pos: &BlockPos) -> Vec<BlockPos> {
        let Some(record) = self.registry.remove(pos) else {
            return vec![];
        };
        clear_cell(world, pos);
        let mut removed = vec![pos.clone()];
        if let Some(partner) = record.partner() {
            if world.is_inventory_empty(partner) {
                if self.registry.remove(partner).is_some() {
                    clear_cell(world, partner);
                    removed.push(partner.clone());
                }
            } else {
                world.set_chest_kind(partner, ChestKind::Single);
            }
        }
        removed
    }

    pub fn handle_break(&mut self, world: &mut dyn WorldAccess, players: &mut dyn Players, actor: PlayerId, pos: &BlockPos) -> BreakDecision {
        if let Some(record) = self.registry.lookup(pos) {
            if self.config.protect_chest && !self.policy().can_access(players, actor, record) {
                send(players, actor, &self.config.messages.no_permission, Some(pos), &[]);
                return BreakDecision::Denied;
            }
            self.forget(world, pos);
            log::debug!("{actor} broke the death chest at {pos}");
            return BreakDecision::Allowed;
        }
        if self.config.enable_sign {
            if let Some(chest) = sign_holder(world, pos) {
                if self.registry.contains(&chest) && !world.is_inventory_empty(&chest) {
                    send(players, actor, &self.config.messages.sign_protected, Some(&chest), &[]);
                    return BreakDecision::Denied;
                }
            }
        }
        BreakDecision::Untracked
    }

    /// The host reports a tracked cell destroyed by something other than a player.
    pub fn handle_destroyed(&mut self, world: &mut dyn WorldAccess, pos: &BlockPos) -> bool {
        let known = self.forget(world, pos);
        if known {
            log::debug!("death chest at {pos} was destroyed");
        }
        known
    }

    // Unregisters without touching the chest block or its contents.
    fn forget(&mut self, world: &mut dyn WorldAccess, pos: &BlockPos) -> bool {
        let Some(record) = self.registry.remove(pos) else {
            return false;
        };
        for sign in attached_signs(world, pos) {
            world.set_block(&sign, Block::AIR);
        }
        world.despawn_marker(pos);
        // the other half picks up a marker on the next refresh
        if let Some(partner) = record.partner() {
            world.set_chest_kind(partner, ChestKind::Single);
        }
        true
    }

    /// Advances one game tick and runs whatever periodic work is due.
    pub fn tick(&mut self, world: &mut dyn WorldAccess, players: &mut dyn Players, now: Millis) {
        self.tick += 1;
        for job in self.timers.due(self.tick) {
            match job {
                Job::Sweep => {
                    self.sweep_now(world, players, now);
                }
                Job::RefreshMarkers => self.refresh_markers(world, players, now),
            }
        }
    }

    pub fn sweep_now(&mut self, world: &mut dyn WorldAccess, players: &mut dyn Players, now: Millis) -> SweepReport {
        sweep(&mut self.registry, world, players, &self.config, now)
    }

    fn refresh_markers(&self, world: &mut dyn WorldAccess, players: &dyn Players, now: Millis) {
        if !self.config.enable_hologram {
            return;
        }
        for (pos, record) in self.registry.iter() {
            if record.is_secondary() {
                continue;
            }
            let name = players.name_of(record.owner).unwrap_or_else(|| "Unknown".into());
            world.spawn_marker(pos, &marker_text(&self.config, &name, record, now));
        }
    }

    fn start_timers(&mut self) {
        for handle in self.handles.drain(..) {
            self.timers.cancel(handle);
        }
        let sweep_every = self.config.sweep_interval as u64;
        self.handles.push(self.timers.start(Job::Sweep, self.tick, sweep_every));
        if self.config.enable_hologram && self.config.show_time_remaining {
            let refresh_every = self.config.hologram_interval as u64;
            self.handles.push(self.timers.start(Job::RefreshMarkers, self.tick, refresh_every));
        }
    }

    /// Loads the chest store (when persistent storage is on), then starts the timers.
    pub fn startup(&mut self, world: &mut dyn WorldAccess, players: &dyn Players, now: Millis) -> LoadReport {
        let mut report = LoadReport::default();
        if let (true, Some(path)) = (self.config.persistent_storage, self.store_path()) {
            let world_exists = |name: &str| world.world_exists(name);
            match self.registry.load_from(&path, &world_exists, now) {
                Ok(loaded) => report = loaded,
                Err(e) => log::error!("could not load death chests from {}: {e}", path.display()),
            }
            let gone = self.drop_vanished(world);
            report.loaded = report.loaded.saturating_sub(gone);
            report.skipped += gone;
        }
        self.refresh_markers(world, players, now);
        self.start_timers();
        log::info!("death chests ready, tracking {}", self.registry.len());
        report
    }

    // Chests broken or replaced while the server was down come back as records
    // with nothing behind them.
    fn drop_vanished(&mut self, world: &mut dyn WorldAccess) -> usize {
        let vanished: Vec<BlockPos> = self.registry.positions()
            .filter(|pos| !world.block_at(pos).is_chest())
            .cloned()
            .collect();
        for pos in &vanished {
            log::warn!("death chest at {pos} is no longer there, forgetting it");
            self.forget(world, pos);
        }
        vanished.len()
    }

    /// Stops the timers, takes the markers down and saves.
    pub fn shutdown(&mut self, world: &mut dyn WorldAccess, now: Millis) -> Result<usize, StorageError> {
        self.timers.cancel_all();
        self.handles.clear();
        for pos in self.registry.positions() {
            world.despawn_marker(pos);
        }
        self.save_now(now)
    }

    pub fn save_now(&self, now: Millis) -> Result<usize, StorageError> {
        let Some(path) = self.store_path().filter(|_| self.config.persistent_storage) else {
            return Ok(0);
        };
        self.save_to(&path, now)
    }

    fn save_to(&self, path: &Path, now: Millis) -> Result<usize, StorageError> {
        self.registry.save_to(path, now).map_err(|e| {
            log::error!("could not save death chests: {e}");
            e
        })
    }

    /// Re-reads the config file. On error the current configuration stays in effect.
    pub fn reload_configuration(&mut self) -> Result<(), ConfigError> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        let config = Config::load(path).map_err(|e| {
            log::warn!("{e}; keeping the current configuration");
            e
        })?;
        self.replaceable = config.replaceable_set();
        self.config = config;
        self.start_timers();
        log::info!("configuration reloaded");
        Ok(())
    }
}
