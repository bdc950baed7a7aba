use crate::config::OverflowBehavior;
use crate::prelude::*;

pub const SINGLE_CAPACITY: usize = 27;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub primary: BlockPos,
    pub primary_state: ChestState,
    pub secondary: Option<(BlockPos, ChestState)>,
    /// a twin was wanted but no neighbour could take it
    pub degraded: bool,
}
impl Allocation {
    pub fn capacity(&self) -> usize {
        if self.secondary.is_some() { 2 * SINGLE_CAPACITY } else { SINGLE_CAPACITY }
    }
}

pub fn needs_twin(item_count: usize, overflow: OverflowBehavior) -> bool {
    item_count > SINGLE_CAPACITY && overflow == OverflowBehavior::AllowTwinLayout
}

/// Which halves the two cells become when the secondary sits towards `facing`.
pub fn linkage(facing: BlockFace) -> (ChestKind, ChestKind) {
    match facing {
        BlockFace::North | BlockFace::East => (ChestKind::Left, ChestKind::Right),
        _ => (ChestKind::Right, ChestKind::Left),
    }
}

/// Picks single or twin layout for a chest at `primary`. The twin half goes on the first
/// cardinal neighbour (north, east, south, west) that `is_free` accepts.
pub fn allocate(
    primary: &BlockPos,
    item_count: usize,
    overflow: OverflowBehavior,
    mut is_free: impl FnMut(&BlockPos) -> bool,
) -> Allocation {
    let single = Allocation {
        primary: primary.clone(),
        primary_state: ChestState { kind: ChestKind::Single, facing: BlockFace::North },
        secondary: None,
        degraded: false,
    };
    if !needs_twin(item_count, overflow) {
        return single;
    }
    let Some(facing) = BlockFace::HORIZONTAL.into_iter().find(|&face| is_free(&primary.relative(face))) else {
        log::debug!("no room for a twin chest next to {primary}, {item_count} stacks won't all fit");
        return Allocation { degraded: true, ..single };
    };
    let (first, second) = linkage(facing);
    Allocation {
        primary: primary.clone(),
        primary_state: ChestState { kind: first, facing },
        secondary: Some((primary.relative(facing), ChestState { kind: second, facing })),
        degraded: false,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub primary: Vec<ItemStack>,
    pub secondary: Vec<ItemStack>,
    /// excluded items and whatever didn't fit, in their original order
    pub leftovers: Vec<ItemStack>,
}

/// Stacks that count towards the layout decision.
pub fn storable_count(items: &[ItemStack], is_excluded: impl Fn(&ItemStack) -> bool) -> usize {
    items.iter().filter(|i| !i.is_empty() && !is_excluded(i)).count()
}

/// Fills the primary, then the secondary, one stack per slot.
pub fn distribute(items: Vec<ItemStack>, allocation: &Allocation, is_excluded: impl Fn(&ItemStack) -> bool) -> Distribution {
    let mut out = Distribution::default();
    let second_capacity = if allocation.secondary.is_some() { SINGLE_CAPACITY } else { 0 };
    for item in items {
        if item.is_empty() {
            continue;
        }
        if is_excluded(&item) {
            out.leftovers.push(item);
        } else if out.primary.len() < SINGLE_CAPACITY {
            out.primary.push(item);
        } else if out.secondary.len() < second_capacity {
            out.secondary.push(item);
        } else {
            out.leftovers.push(item);
        }
    }
    out
}
