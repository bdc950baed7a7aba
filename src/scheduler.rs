use crate::config::Config;
use crate::host::{send, Players};
use crate::markers::{clear_cell, minutes_left};
use crate::prelude::*;
use crate::registry::ChestRegistry;
use crate::world::WorldAccess;


/// Periodic work the controller knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Sweep,
    RefreshMarkers,
}

/// Names a started timer. Stays dead once cancelled, even if the slot gets reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    slot: usize,
    serial: u64,
}

#[derive(Debug)]
struct Timer {
    serial: u64,
    job: Job,
    period: u64,
    next_due: u64,
}

/// Repeating timers counted in game ticks.
#[derive(Debug, Default)]
pub struct Timers {
    timers: SlotMap<Timer>,
    serial: u64,
}
impl Timers {
    pub fn new() -> Self {
        Self::default()
    }
    /// First runs `period` ticks after `tick`, then every `period` ticks.
    pub fn start(&mut self, job: Job, tick: u64, period: u64) -> TimerHandle {
        let period = period.max(1);
        self.serial += 1;
        let serial = self.serial;
        let slot = self.timers.insert(Timer { serial, job, period, next_due: tick + period });
        log::trace!("started {job:?} timer every {period} ticks");
        TimerHandle { slot, serial }
    }
    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers.get(handle.slot).map_or(false, |t| t.serial == handle.serial)
    }
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        if !self.is_active(handle) {
            return false;
        }
        self.timers.release(handle.slot).is_some()
    }
    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }
    pub fn len(&self) -> usize {
        self.timers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
    /// Jobs whose timers are due at `tick`. A timer that fell behind runs once and
    /// picks its period up again from `tick`.
    pub fn due(&mut self, tick: u64) -> Vec<Job> {
        let mut jobs = vec![];
        for (_, timer) in self.timers.iter_mut() {
            if timer.next_due <= tick {
                jobs.push(timer.job);
                timer.next_due = tick + timer.period;
            }
        }
        jobs
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub warned: Vec<BlockPos>,
    pub evicted: Vec<BlockPos>,
    /// twin halves that outlived their partner because they still hold items
    pub deferred: Vec<BlockPos>,
}
impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.warned.is_empty() && self.evicted.is_empty() && self.deferred.is_empty()
    }
}

/// One pass of the expiry sweep: warnings first, then evictions.
pub fn sweep(
    registry: &mut ChestRegistry,
    world: &mut dyn WorldAccess,
    players: &mut dyn Players,
    config: &Config,
    now: Millis,
) -> SweepReport {
    let mut report = SweepReport::default();
    let window = config.warning_window_millis();

    if window > 0 {
        registry.for_each_snapshot(|registry, pos, record| {
            let Some(remaining) = record.remaining(now) else { return };
            if record.warning_sent || remaining > window {
                return;
            }
            let Some(live) = registry.lookup_mut(pos) else { return };
            if !live.mark_warned() {
                return;
            }
            report.warned.push(pos.clone());
            // one message per twin, from its primary
            if !record.is_secondary() && players.is_online(record.owner) {
                let time = minutes_left(record, now).to_string();
                send(players, record.owner, &config.messages.expiry_warning, Some(pos), &[("time", time)]);
            }
        });
    }

    registry.for_each_snapshot(|registry, pos, _| {
        // earlier evictions in this pass may have removed or pinned this one
        let Some(record) = registry.lookup(pos).cloned() else { return };
        if !record.is_expired(now) {
            return;
        }
        // a secondary goes together with its primary
        if record.is_secondary() && record.partner().map_or(false, |p| registry.contains(p)) {
            return;
        }
        registry.remove(pos);
        clear_cell(world, pos);
        report.evicted.push(pos.clone());
        log::debug!("death chest of {} at {pos} expired", record.owner);

        if let Some(partner) = record.partner() {
            if world.is_inventory_empty(partner) {
                registry.remove(partner);
                clear_cell(world, partner);
                report.evicted.push(partner.clone());
            } else if let Some(spared) = registry.lookup_mut(partner) {
                // stays until whoever empties it, and is no longer part of a twin
                spared.expires_at = 0;
                world.set_chest_kind(partner, ChestKind::Single);
                report.deferred.push(partner.clone());
                log::debug!("keeping the other half at {partner}, it still holds items");
            }
        }
        if players.is_online(record.owner) {
            send(players, record.owner, &config.messages.expired, Some(pos), &[]);
        }
    });

    if !report.is_empty() {
        log::info!(
            "expiry sweep: {} warned, {} evicted, {} kept",
            report.warned.len(),
            report.evicted.len(),
            report.deferred.len()
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Roster;
    use crate::registry::ContainerRecord;
    use crate::world::Level;

    const OWNER: PlayerId = PlayerId::from_u128(0x0DD);
    const START: Millis = 1_000_000;

    fn at(x: i32) -> BlockPos {
        BlockPos::new("world", x, 64, 0)
    }
    fn config(lifetime: u32, warning: u32) -> Config {
        Config { chest_lifetime: lifetime, expiry_warning_time: warning, ..Config::default() }
    }
    fn setup() -> (ChestRegistry, Level, Roster) {
        let mut roster = Roster::new();
        roster.join(OWNER, "Alex");
        (ChestRegistry::new(), Level::empty().with_flat_world("world", 63, Block::STONE), roster)
    }
    fn place(registry: &mut ChestRegistry, level: &mut Level, pos: &BlockPos, config: &Config, items: usize) {
        level.set_block(pos, Block::CHEST);
        level.set_inventory(pos, (0..items).map(|_| ItemStack::new("minecraft:dirt", 1)).collect());
        registry.register(pos.clone(), ContainerRecord::new(OWNER, 0, START, config.expiry_for(START)));
    }

    #[test]
    fn timers_repeat_and_cancel() {
        let mut timers = Timers::new();
        let sweep = timers.start(Job::Sweep, 0, 3);
        let refresh = timers.start(Job::RefreshMarkers, 0, 2);
        let fired: Vec<_> = (1..=6).map(|tick| timers.due(tick)).collect();
        assert_eq!(fired, [
            vec![],
            vec![Job::RefreshMarkers],
            vec![Job::Sweep],
            vec![Job::RefreshMarkers],
            vec![],
            vec![Job::Sweep, Job::RefreshMarkers],
        ]);
        assert!(timers.cancel(sweep));
        assert!(!timers.cancel(sweep));
        assert_eq!(timers.due(9), [Job::RefreshMarkers]);

        // the freed slot gets reused, the stale handle must not reach it
        let replacement = timers.start(Job::Sweep, 9, 1);
        assert!(!timers.is_active(sweep));
        assert!(timers.is_active(replacement));
        timers.cancel_all();
        assert!(timers.is_empty());
        assert!(!timers.is_active(refresh));
    }

    #[test]
    fn late_timers_fire_once() {
        let mut timers = Timers::new();
        timers.start(Job::Sweep, 0, 10);
        assert_eq!(timers.due(95), [Job::Sweep]);
        assert!(timers.due(100).is_empty());
        assert_eq!(timers.due(105), [Job::Sweep]);
    }

    #[test]
    fn warning_then_eviction() {
        let (mut registry, mut level, mut roster) = setup();
        let config = config(10, 2);
        place(&mut registry, &mut level, &at(0), &config, 1);
        let minute = MILLIS_PER_MINUTE;

        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 7 * minute);
        assert!(r.is_empty());

        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 8 * minute);
        assert_eq!(r.warned, [at(0)]);
        assert!(r.evicted.is_empty());
        assert_eq!(roster.outbox.len(), 1);
        assert!(roster.outbox[0].1.contains("in \u{a7}f2 minutes"));

        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 9 * minute);
        assert!(r.is_empty());

        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 10 * minute);
        assert_eq!(r.evicted, [at(0)]);
        assert!(r.warned.is_empty());
        assert!(registry.is_empty());
        assert!(level.block_at(&at(0)).is_air());
        assert_eq!(roster.outbox.len(), 2);
        assert!(roster.outbox[1].1.contains("has expired"));
    }

    #[test]
    fn a_skipped_window_still_warns_before_evicting() {
        let (mut registry, mut level, mut roster) = setup();
        let config = config(10, 2);
        place(&mut registry, &mut level, &at(0), &config, 1);
        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 11 * MILLIS_PER_MINUTE);
        assert_eq!(r.warned, [at(0)]);
        assert_eq!(r.evicted, [at(0)]);
        assert!(roster.outbox[0].1.contains("in \u{a7}f0 minutes"));
    }

    #[test]
    fn sweeping_twice_changes_nothing() {
        let (mut registry, mut level, mut roster) = setup();
        let config = config(10, 5);
        for x in [0, 3, 6] {
            place(&mut registry, &mut level, &at(x), &config, 1);
        }
        registry.register(at(9), ContainerRecord::new(OWNER, 0, START, START + 60 * MILLIS_PER_MINUTE));
        let now = START + 10 * MILLIS_PER_MINUTE;
        let first = sweep(&mut registry, &mut level, &mut roster, &config, now);
        assert_eq!(first.evicted.len(), 3);
        let second = sweep(&mut registry, &mut level, &mut roster, &config, now);
        assert!(second.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn zero_window_never_warns() {
        let (mut registry, mut level, mut roster) = setup();
        let config = config(10, 0);
        place(&mut registry, &mut level, &at(0), &config, 1);
        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 9 * MILLIS_PER_MINUTE);
        assert!(r.is_empty());
        assert!(roster.outbox.is_empty());
    }

    #[test]
    fn never_expiring_chests_are_left_alone() {
        let (mut registry, mut level, mut roster) = setup();
        let config = config(0, 5);
        place(&mut registry, &mut level, &at(0), &config, 1);
        let r = sweep(&mut registry, &mut level, &mut roster, &config, Millis::MAX);
        assert!(r.is_empty());
        assert!(!registry.lookup(&at(0)).unwrap().warning_sent);
    }

    #[test]
    fn offline_owners_get_no_message() {
        let (mut registry, mut level, mut roster) = setup();
        roster.leave(OWNER);
        let config = config(10, 2);
        place(&mut registry, &mut level, &at(0), &config, 1);
        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 10 * MILLIS_PER_MINUTE);
        assert_eq!(r.evicted, [at(0)]);
        assert!(roster.outbox.is_empty());
    }

    #[test]
    fn empty_twin_half_goes_with_its_primary() {
        let (mut registry, mut level, mut roster) = setup();
        let config = config(10, 2);
        place(&mut registry, &mut level, &at(1), &config, 27);
        place(&mut registry, &mut level, &at(0), &config, 0);
        registry.link(&at(1), &at(0));
        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 10 * MILLIS_PER_MINUTE);
        assert_eq!(r.warned, [at(0), at(1)]);
        assert_eq!(r.evicted, [at(1), at(0)]);
        assert!(registry.is_empty());
        // one warning and one expiry message for the pair
        assert_eq!(roster.outbox.len(), 2);
    }

    #[test]
    fn full_twin_half_is_kept_until_emptied() {
        let (mut registry, mut level, mut roster) = setup();
        let config = config(10, 2);
        place(&mut registry, &mut level, &at(0), &config, 27);
        place(&mut registry, &mut level, &at(1), &config, 13);
        registry.link(&at(0), &at(1));
        let now = START + 10 * MILLIS_PER_MINUTE;
        let r = sweep(&mut registry, &mut level, &mut roster, &config, now);
        assert_eq!(r.evicted, [at(0)]);
        assert_eq!(r.deferred, [at(1)]);
        let kept = registry.lookup(&at(1)).unwrap();
        assert_eq!(kept.linked, None);
        assert!(!kept.expires());
        assert_eq!(level.block_at(&at(1)), Block::CHEST);
        assert_eq!(level.chest_kind(&at(1)), Some(ChestKind::Single));

        assert!(sweep(&mut registry, &mut level, &mut roster, &config, now).is_empty());
    }

    #[test]
    fn half_left_behind_by_reregistering_still_expires() {
        let (mut registry, mut level, mut roster) = setup();
        let config = config(10, 2);
        place(&mut registry, &mut level, &at(0), &config, 1);
        place(&mut registry, &mut level, &at(1), &config, 0);
        registry.link(&at(0), &at(1));
        registry.register(at(0), ContainerRecord::new(OWNER, 0, START, 0));

        let r = sweep(&mut registry, &mut level, &mut roster, &config, START + 10 * MILLIS_PER_MINUTE);
        assert_eq!(r.evicted, [at(1)]);
        assert!(registry.contains(&at(0)));
        assert!(!registry.contains(&at(1)));
        assert_eq!(level.block_at(&at(1)), Block::AIR);
    }
}
