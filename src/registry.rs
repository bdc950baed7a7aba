use crate::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    /// the half the player's items went into first, and which carries the experience
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub partner: BlockPos,
    pub half: Half,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub owner: PlayerId,
    pub stored_experience: u32,
    pub created_at: Millis,
    /// `0` never expires
    pub expires_at: Millis,
    pub warning_sent: bool,
    pub linked: Option<Link>,
}
impl ContainerRecord {
    pub fn new(owner: PlayerId, stored_experience: u32, created_at: Millis, expires_at: Millis) -> Self {
        debug_assert!(expires_at == 0 || expires_at >= created_at);
        Self {
            owner,
            stored_experience,
            created_at,
            expires_at,
            warning_sent: false,
            linked: None,
        }
    }
    pub fn expires(&self) -> bool {
        self.expires_at > 0
    }
    pub fn is_expired(&self, now: Millis) -> bool {
        self.expires() && self.expires_at <= now
    }
    pub fn remaining(&self, now: Millis) -> Option<Millis> {
        self.expires().then(|| self.expires_at - now)
    }
    pub fn partner(&self) -> Option<&BlockPos> {
        self.linked.as_ref().map(|l| &l.partner)
    }
    pub fn is_secondary(&self) -> bool {
        matches!(self.linked, Some(Link { half: Half::Secondary, .. }))
    }
    /// Flips `warning_sent` on. Returns false if it was already set or the record never expires.
    pub fn mark_warned(&mut self) -> bool {
        if !self.expires() || self.warning_sent {
            return false;
        }
        self.warning_sent = true;
        true
    }
    /// Hands out the stored experience once.
    pub fn redeem_experience(&mut self) -> u32 {
        core::mem::take(&mut self.stored_experience)
    }
}

/// Every tracked death chest, by position.
#[derive(Debug, Default)]
pub struct ChestRegistry {
    records: HashMap<BlockPos, ContainerRecord>,
}
impl ChestRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /// Last write wins. Re-registering a position is how persisted chests get restored,
    /// so replacing a live record is only logged. The new record starts unlinked, and a
    /// replaced record's partner is let go; pairs only come from [`link`](Self::link).
    pub fn register(&mut self, pos: BlockPos, mut record: ContainerRecord) -> Option<ContainerRecord> {
        record.linked = None;
        let old = self.records.insert(pos.clone(), record);
        if let Some(old) = &old {
            log::warn!("replaced death chest of {} at {pos}", old.owner);
            if let Some(partner) = old.partner() {
                self.clear_link_to(partner, &pos);
            }
        }
        old
    }
    pub fn lookup(&self, pos: &BlockPos) -> Option<&ContainerRecord> {
        self.records.get(pos)
    }
    pub fn lookup_mut(&mut self, pos: &BlockPos) -> Option<&mut ContainerRecord> {
        self.records.get_mut(pos)
    }
    pub fn contains(&self, pos: &BlockPos) -> bool {
        self.records.contains_key(pos)
    }
    /// Removes a record. If it was half of a twin, the partner is left unlinked.
    pub fn remove(&mut self, pos: &BlockPos) -> Option<ContainerRecord> {
        let record = self.records.remove(pos)?;
        if let Some(partner) = record.partner() {
            self.clear_link_to(partner, pos);
        }
        Some(record)
    }
    /// Pairs two registered cells. `primary` keeps the items that didn't fit into `secondary`.
    pub fn link(&mut self, primary: &BlockPos, secondary: &BlockPos) -> bool {
        if primary == secondary || !self.contains(primary) || !self.contains(secondary) {
            return false;
        }
        for pos in [primary, secondary] {
            if let Some(old) = self.records[pos].partner().cloned() {
                self.clear_link_to(&old, pos);
            }
        }
        if let Some(record) = self.records.get_mut(primary) {
            record.linked = Some(Link { partner: secondary.clone(), half: Half::Primary });
        }
        if let Some(record) = self.records.get_mut(secondary) {
            record.linked = Some(Link { partner: primary.clone(), half: Half::Secondary });
        }
        true
    }
    pub fn unlink(&mut self, pos: &BlockPos) {
        let Some(record) = self.records.get_mut(pos) else { return };
        if let Some(link) = record.linked.take() {
            self.clear_link_to(&link.partner, pos);
        }
    }
    fn clear_link_to(&mut self, at: &BlockPos, target: &BlockPos) {
        if let Some(record) = self.records.get_mut(at) {
            if record.partner() == Some(target) {
                record.linked = None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&BlockPos, &ContainerRecord)> {
        self.records.iter()
    }
    pub fn positions(&self) -> impl Iterator<Item = &BlockPos> {
        self.records.keys()
    }
    /// A point-in-time copy, ordered by position.
    pub fn snapshot(&self) -> Vec<(BlockPos, ContainerRecord)> {
        let mut all: Vec<_> = self.records.iter().map(|(p, r)| (p.clone(), r.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
    /// Visits a snapshot, so `f` is free to register or remove while iterating.
    pub fn for_each_snapshot(&mut self, mut f: impl FnMut(&mut Self, &BlockPos, &ContainerRecord)) {
        for (pos, record) in self.snapshot() {
            f(self, &pos, &record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: PlayerId = PlayerId::from_u128(1);

    fn at(x: i32) -> BlockPos {
        BlockPos::new("world", x, 64, 0)
    }

    #[test]
    fn register_lookup_remove() {
        let mut registry = ChestRegistry::new();
        assert!(registry.register(at(0), ContainerRecord::new(OWNER, 5, 10, 20)).is_none());
        assert_eq!(registry.lookup(&at(0)).map(|r| r.stored_experience), Some(5));
        assert!(registry.lookup(&at(1)).is_none());
        let removed = registry.remove(&at(0)).unwrap();
        assert_eq!(removed.expires_at, 20);
        assert!(registry.is_empty());
        assert!(registry.remove(&at(0)).is_none());
    }

    #[test]
    fn reregistering_overwrites() {
        let mut registry = ChestRegistry::new();
        registry.register(at(0), ContainerRecord::new(OWNER, 5, 0, 0));
        let old = registry.register(at(0), ContainerRecord::new(OWNER, 9, 0, 0));
        assert_eq!(old.map(|r| r.stored_experience), Some(5));
        assert_eq!(registry.lookup(&at(0)).unwrap().stored_experience, 9);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn links_are_symmetric_and_removal_unlinks() {
        let mut registry = ChestRegistry::new();
        registry.register(at(0), ContainerRecord::new(OWNER, 0, 0, 100));
        registry.register(at(1), ContainerRecord::new(OWNER, 0, 0, 100));
        assert!(registry.link(&at(0), &at(1)));
        assert_eq!(registry.lookup(&at(0)).unwrap().partner(), Some(&at(1)));
        assert_eq!(registry.lookup(&at(1)).unwrap().partner(), Some(&at(0)));
        assert!(registry.lookup(&at(1)).unwrap().is_secondary());

        registry.remove(&at(0));
        assert_eq!(registry.lookup(&at(1)).unwrap().linked, None);
    }

    #[test]
    fn reregistering_a_linked_cell_frees_its_partner() {
        let mut registry = ChestRegistry::new();
        registry.register(at(0), ContainerRecord::new(OWNER, 0, 0, 1_000));
        registry.register(at(1), ContainerRecord::new(OWNER, 0, 0, 1_000));
        registry.link(&at(0), &at(1));

        let mut stray = ContainerRecord::new(OWNER, 0, 0, 0);
        stray.linked = Some(Link { partner: at(7), half: Half::Primary });
        let old = registry.register(at(0), stray).unwrap();
        assert_eq!(old.partner(), Some(&at(1)));
        assert_eq!(registry.lookup(&at(0)).unwrap().linked, None);
        assert_eq!(registry.lookup(&at(1)).unwrap().linked, None);
        assert!(!registry.lookup(&at(1)).unwrap().is_secondary());
    }

    #[test]
    fn linking_needs_both_halves() {
        let mut registry = ChestRegistry::new();
        registry.register(at(0), ContainerRecord::new(OWNER, 0, 0, 0));
        assert!(!registry.link(&at(0), &at(1)));
        assert!(!registry.link(&at(0), &at(0)));
        assert_eq!(registry.lookup(&at(0)).unwrap().linked, None);
    }

    #[test]
    fn relinking_drops_the_old_partner() {
        let mut registry = ChestRegistry::new();
        for x in 0..3 {
            registry.register(at(x), ContainerRecord::new(OWNER, 0, 0, 0));
        }
        registry.link(&at(0), &at(1));
        registry.link(&at(0), &at(2));
        assert_eq!(registry.lookup(&at(1)).unwrap().linked, None);
        assert_eq!(registry.lookup(&at(2)).unwrap().partner(), Some(&at(0)));
        registry.unlink(&at(2));
        assert_eq!(registry.lookup(&at(0)).unwrap().linked, None);
    }

    #[test]
    fn snapshot_iteration_tolerates_removal() {
        let mut registry = ChestRegistry::new();
        for x in 0..10 {
            registry.register(at(x), ContainerRecord::new(OWNER, 0, 0, 0));
        }
        let mut visited = 0;
        registry.for_each_snapshot(|registry, pos, _| {
            visited += 1;
            registry.remove(pos);
            registry.remove(&at(9));
        });
        assert_eq!(visited, 10);
        assert!(registry.is_empty());
    }

    #[test]
    fn warning_flag_only_sets_once() {
        let mut record = ContainerRecord::new(OWNER, 0, 0, 1_000);
        assert!(record.mark_warned());
        assert!(!record.mark_warned());
        assert!(record.warning_sent);

        let mut forever = ContainerRecord::new(OWNER, 0, 0, 0);
        assert!(!forever.mark_warned());
        assert!(!forever.warning_sent);
    }

    #[test]
    fn experience_redeems_once() {
        let mut record = ContainerRecord::new(OWNER, 30, 0, 0);
        assert_eq!(record.redeem_experience(), 30);
        assert_eq!(record.redeem_experience(), 0);
    }

    #[test]
    fn expiry_boundaries() {
        let record = ContainerRecord::new(OWNER, 0, 0, 1_000);
        assert!(!record.is_expired(999));
        assert!(record.is_expired(1_000));
        assert_eq!(record.remaining(400), Some(600));
        assert_eq!(ContainerRecord::new(OWNER, 0, 0, 0).remaining(400), None);
        assert!(!ContainerRecord::new(OWNER, 0, 0, 0).is_expired(i64::MAX));
    }
}
