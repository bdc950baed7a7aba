use crate::access::AccessPolicy;
use crate::prelude::*;
use crate::registry::ChestRegistry;
use crate::world::WorldAccess;
use std::collections::HashSet;

/// Vertical offsets tried at each column, in order.
const DY: [i32; 3] = [0, 1, -1];

/// Walks the cells a placement search visits: the origin, then the perimeter of each
/// square shell out to `max_radius`, x outer and z inner, each column at dy 0, +1, -1.
pub struct Shells {
    origin: BlockPos,
    max_radius: i32,
    started: bool,

    radius: i32,
    x: i32,
    z: i32,
    dy: usize,
}
impl Shells {
    pub fn new(origin: BlockPos, max_radius: i32) -> Self {
        Self {
            origin,
            max_radius,
            started: false,
            radius: 1,
            x: -1,
            z: -1,
            dy: 0,
        }
    }
}
impl Iterator for Shells {
    type Item = BlockPos;
    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            return Some(self.origin.clone());
        }
        while self.radius <= self.max_radius {
            let r = self.radius;
            if self.x > r {
                self.radius += 1;
                self.x = -self.radius;
                self.z = -self.radius;
                self.dy = 0;
            } else if self.z > r {
                self.x += 1;
                self.z = -r;
            } else if self.x.abs() != r && self.z.abs() != r {
                // interior of the shell was covered by a smaller radius
                self.z = r;
            } else if self.dy == DY.len() {
                self.dy = 0;
                self.z += 1;
            } else {
                let cell = self.origin.offset(self.x, DY[self.dy], self.z);
                self.dy += 1;
                return Some(cell);
            }
        }
        None
    }
}

/// The first usable cell in shell order, or `None` when nothing within `max_radius` is.
/// A radius of 0 (or less) only ever tries the origin.
pub fn find_placement(origin: &BlockPos, max_radius: i32, mut is_usable: impl FnMut(&BlockPos) -> bool) -> Option<BlockPos> {
    Shells::new(origin.clone(), max_radius).find(|cell| is_usable(cell))
}

/// Decides whether a cell can take a new death chest.
pub struct SiteRules<'a> {
    pub replaceable: &'a HashSet<Block>,
    pub registry: &'a ChestRegistry,
    /// who the chest is for, when protection should be consulted
    pub builder: Option<(PlayerId, &'a AccessPolicy<'a>)>,
}
impl SiteRules<'_> {
    pub fn is_support(world: &dyn WorldAccess, pos: &BlockPos) -> bool {
        world.block_at(pos).is_solid()
    }
    pub fn is_replaceable(&self, world: &dyn WorldAccess, pos: &BlockPos) -> bool {
        self.replaceable.contains(&world.block_at(pos))
    }
    pub fn is_usable(&self, world: &dyn WorldAccess, pos: &BlockPos) -> bool {
        if !self.is_replaceable(world, pos) || !Self::is_support(world, &pos.below()) {
            return false;
        }
        // a chest next to another would merge into it
        let touches_chest = BlockFace::HORIZONTAL.iter().any(|&face| {
            let side = pos.relative(face);
            self.registry.contains(&side) || world.block_at(&side).is_chest()
        });
        if touches_chest {
            return false;
        }
        match self.builder {
            Some((player, policy)) => policy.can_build_at(player, pos),
            None => true,
        }
    }
    /// Whether the second half of a twin chest fits at `pos`.
    pub fn is_free_for_twin(world: &dyn WorldAccess, pos: &BlockPos) -> bool {
        world.block_at(pos).is_air()
            && Self::is_support(world, &pos.below())
            && !world.block_at(&pos.above()).is_solid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ProtectionChecker;
    use crate::error::ProtectionError;
    use crate::registry::ContainerRecord;
    use crate::world::Level;

    fn at(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new("world", x, y, z)
    }
    fn offsets(origin: &BlockPos, cells: impl Iterator<Item = BlockPos>) -> Vec<(i32, i32, i32)> {
        cells.map(|c| (c.pos.x - origin.pos.x, c.pos.y - origin.pos.y, c.pos.z - origin.pos.z)).collect()
    }

    #[test]
    fn first_shell_order() {
        let origin = at(10, 64, -3);
        let cells = offsets(&origin, Shells::new(origin.clone(), 1));
        let mut expected = vec![(0, 0, 0)];
        for (x, z) in [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)] {
            for dy in [0, 1, -1] {
                expected.push((x, dy, z));
            }
        }
        assert_eq!(cells, expected);
    }

    #[test]
    fn shells_visit_each_cell_once() {
        let origin = at(0, 64, 0);
        let cells: Vec<_> = Shells::new(origin.clone(), 4).collect();
        let unique: HashSet<_> = cells.iter().cloned().collect();
        assert_eq!(cells.len(), unique.len());
        // every column in a 9x9 square, three heights each, except the origin column's +-1
        assert_eq!(cells.len(), 9 * 9 * 3 - 2);
        let mut last = 0;
        for cell in &cells {
            let shell = cell.shell_distance(&origin);
            assert!(shell >= last);
            last = shell;
        }
    }

    #[test]
    fn zero_or_negative_radius_is_origin_only() {
        let origin = at(0, 64, 0);
        assert_eq!(Shells::new(origin.clone(), 0).count(), 1);
        assert_eq!(Shells::new(origin.clone(), -3).count(), 1);
        assert_eq!(find_placement(&origin, 0, |_| false), None);
        assert_eq!(find_placement(&origin, -1, |c| *c != origin), None);
    }

    #[test]
    fn usable_origin_touches_nothing_else() {
        let origin = at(0, 64, 0);
        let mut tested = vec![];
        let found = find_placement(&origin, 5, |c| {
            tested.push(c.clone());
            true
        });
        assert_eq!(found, Some(origin.clone()));
        assert_eq!(tested, [origin]);
    }

    #[test]
    fn larger_radius_agrees_when_smaller_finds() {
        let origin = at(0, 64, 0);
        for target in [at(2, 64, -1), at(-1, 65, 1), at(3, 63, 3)] {
            let usable = |c: &BlockPos| *c == target || c.pos.x == 4;
            let small = find_placement(&origin, 3, usable);
            assert_eq!(small, Some(target.clone()));
            for r in 4..8 {
                assert_eq!(find_placement(&origin, r, usable), small);
            }
        }
    }

    #[test]
    fn nothing_found_within_radius() {
        let origin = at(0, 64, 0);
        assert_eq!(find_placement(&origin, 2, |c| c.pos.x == 3), None);
        assert_eq!(find_placement(&origin, 3, |c| c.pos.x == 3), Some(at(3, 64, -3)));
    }

    fn ground() -> Level {
        Level::empty().with_flat_world("world", 63, Block::STONE)
    }
    fn replaceable() -> HashSet<Block> {
        crate::config::Config::default().replaceable_set()
    }

    #[test]
    fn usability_rules() {
        let mut level = ground();
        let registry = ChestRegistry::new();
        let replaceable = replaceable();
        let rules = SiteRules { replaceable: &replaceable, registry: &registry, builder: None };

        assert!(rules.is_usable(&level, &at(0, 64, 0)));
        // floating
        assert!(!rules.is_usable(&level, &at(0, 66, 0)));
        // inside terrain
        assert!(!rules.is_usable(&level, &at(0, 63, 0)));

        level.set_block(&at(0, 64, 0), Block::TALL_GRASS);
        assert!(rules.is_usable(&level, &at(0, 64, 0)));
        level.set_block(&at(0, 64, 0), Block::OAK_PLANKS);
        assert!(!rules.is_usable(&level, &at(0, 64, 0)));

        level.set_block(&at(5, 64, 5), Block::CHEST);
        assert!(!rules.is_usable(&level, &at(5, 64, 6)));
        assert!(rules.is_usable(&level, &at(6, 64, 6)));
    }

    #[test]
    fn tracked_neighbours_block_placement() {
        let level = ground();
        let mut registry = ChestRegistry::new();
        registry.register(at(1, 64, 0), ContainerRecord::new(PlayerId::from_u128(1), 0, 0, 0));
        let replaceable = replaceable();
        let rules = SiteRules { replaceable: &replaceable, registry: &registry, builder: None };
        assert!(!rules.is_usable(&level, &at(0, 64, 0)));
        assert!(rules.is_usable(&level, &at(-1, 64, 0)));
    }

    struct NoBuildWestOfZero;
    impl ProtectionChecker for NoBuildWestOfZero {
        fn can_build(&self, _: PlayerId, pos: &BlockPos) -> Result<bool, ProtectionError> {
            Ok(pos.pos.x >= 0)
        }
    }

    #[test]
    fn protection_steers_the_search() {
        let level = ground();
        let registry = ChestRegistry::new();
        let replaceable = replaceable();
        let policy = AccessPolicy { protection: Some(&NoBuildWestOfZero) };
        let rules = SiteRules {
            replaceable: &replaceable,
            registry: &registry,
            builder: Some((PlayerId::from_u128(1), &policy)),
        };
        let origin = at(-1, 64, 0);
        let found = find_placement(&origin, 3, |c| rules.is_usable(&level, c));
        assert_eq!(found, Some(at(0, 64, -1)));
    }

    #[test]
    fn twin_half_needs_headroom() {
        let mut level = ground();
        assert!(SiteRules::is_free_for_twin(&level, &at(0, 64, 0)));
        level.set_block(&at(0, 65, 0), Block::STONE);
        assert!(!SiteRules::is_free_for_twin(&level, &at(0, 64, 0)));
        level.set_block(&at(1, 64, 0), Block::WATER);
        assert!(!SiteRules::is_free_for_twin(&level, &at(1, 64, 0)));
    }
}
