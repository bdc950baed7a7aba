use crate::prelude::*;
use std::collections::HashMap;

// The chest logic never owns the world. A host server implements `WorldAccess`
// over its own chunk storage and the core only ever talks to it through
// positions.
//
// `Level` is a small standalone implementation, good enough for the offline
// tool and for exercising the core without a server: chunks are generated
// lazily on first write, and reads from chunks that don't exist yet fall back
// to the dimension's flat floor (or air).

/// Fire-and-forget cosmetic feedback. The core never waits on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Created,
    Opened,
    Removed,
}

pub trait WorldAccess {
    fn world_exists(&self, world: &str) -> bool;

    fn block_at(&self, pos: &BlockPos) -> Block;
    /// Replaces the block without drops. Clears any block entity data at `pos`.
    fn set_block(&mut self, pos: &BlockPos, block: Block);
    fn facing(&self, pos: &BlockPos) -> Option<BlockFace>;
    fn set_facing(&mut self, pos: &BlockPos, facing: BlockFace);
    fn chest_kind(&self, pos: &BlockPos) -> Option<ChestKind>;
    fn set_chest_kind(&mut self, pos: &BlockPos, kind: ChestKind);

    fn inventory(&self, pos: &BlockPos) -> Vec<ItemStack>;
    fn set_inventory(&mut self, pos: &BlockPos, items: Vec<ItemStack>);
    fn is_inventory_empty(&self, pos: &BlockPos) -> bool {
        self.inventory(pos).iter().all(ItemStack::is_empty)
    }
    fn set_custom_name(&mut self, pos: &BlockPos, name: &str);
    fn set_sign_text(&mut self, pos: &BlockPos, lines: &[String]);

    /// A floating label for the chest at `pos`. Spawning again replaces the text.
    fn spawn_marker(&mut self, pos: &BlockPos, text: &str);
    fn despawn_marker(&mut self, pos: &BlockPos);
    fn play_effect(&mut self, pos: &BlockPos, effect: Effect);
}

const MIN_Y: i32 = -64;
const HEIGHT: i32 = 384;
const SECTIONS: usize = (HEIGHT / 16) as usize;

pub struct Chunk {
    pub content: ChunkContent,
}
pub enum ChunkContent {
    OneToOne {
        nonaircounts: [u16; SECTIONS],
        blocks: Box<[u64; (16 * 16 * 384) / 4]>,
    }
}
impl Chunk {
    fn generate(floor: Option<(i32, Block)>) -> Self {
        let mut blocks = vec![0u64; (16 * 16 * 384) / 4];
        let mut nonaircounts = [0; SECTIONS];
        if let Some((top, block)) = floor {
            let id = block.net_id() as u64;
            let long = id | id << 15 | id << 30 | id << 45;
            let layers = (top - MIN_Y + 1).clamp(0, HEIGHT) as usize;
            blocks[..layers * 16 * 16 / 4].iter_mut().for_each(|s| *s = long);
            if !block.is_air() {
                for (section, count) in nonaircounts.iter_mut().enumerate() {
                    let filled = layers.saturating_sub(section * 16).min(16);
                    *count = (filled * 16 * 16) as u16;
                }
            }
        }
        // the vec is exactly the array length
        let blocks = match blocks.into_boxed_slice().try_into() {
            Ok(blocks) => blocks,
            Err(_) => unreachable!(),
        };
        Self { content: ChunkContent::OneToOne { nonaircounts, blocks } }
    }
    fn get(&self, pos: V3<i32>) -> Block {
        match &self.content {
            ChunkContent::OneToOne { blocks, .. } => {
                let idx = index_in_chunk(pos);
                let id = (blocks[idx / 4] >> ((idx % 4) * 15)) & 0b11111_11111_11111;
                Block::from_net_id(id as u16).unwrap_or(Block::AIR)
            }
        }
    }
    fn set(&mut self, pos: V3<i32>, block: Block) {
        match &mut self.content {
            ChunkContent::OneToOne { nonaircounts, blocks } => {
                let id = block.net_id() as u64;
                let idx = index_in_chunk(pos);
                let long = &mut blocks[idx / 4];
                let subidx = idx % 4;
                let mask = 0b11111_11111_11111;
                let old = (*long >> (subidx * 15)) & mask;
                *long = (*long & !(mask << (subidx * 15))) | id << (subidx * 15);
                let section = ((pos.y - MIN_Y) / 16) as usize;
                if old == 0 && id != 0 {
                    nonaircounts[section] += 1;
                } else if old != 0 && id == 0 {
                    nonaircounts[section] -= 1;
                }
            }
        }
    }
    pub fn non_air_blocks(&self) -> u32 {
        match &self.content {
            ChunkContent::OneToOne { nonaircounts, .. } => nonaircounts.iter().map(|&c| c as u32).sum(),
        }
    }
}
fn index_in_chunk(pos: V3<i32>) -> usize {
    ((pos.y - MIN_Y) * 16 * 16 + pos.z.rem_euclid(16) * 16 + pos.x.rem_euclid(16)) as usize
}
fn in_height(y: i32) -> bool {
    (MIN_Y..MIN_Y + HEIGHT).contains(&y)
}

#[derive(Debug, Default, Clone)]
struct BlockEntity {
    facing: Option<BlockFace>,
    chest_kind: Option<ChestKind>,
    items: Vec<ItemStack>,
    name: Option<String>,
    sign: Vec<String>,
}

#[derive(Default)]
pub struct Dimension {
    floor: Option<(i32, Block)>,
    chunks: Vec<Chunk>,
    index: HashMap<(i32, i32), u32>,
    entities: HashMap<V3<i32>, BlockEntity>,
}
impl Dimension {
    fn chunk(&self, pos: V3<i32>) -> Option<&Chunk> {
        let idx = self.index.get(&(pos.x.div_euclid(16), pos.z.div_euclid(16)))?;
        self.chunks.get(*idx as usize)
    }
    fn chunk_mut(&mut self, pos: V3<i32>) -> &mut Chunk {
        let key = (pos.x.div_euclid(16), pos.z.div_euclid(16));
        let idx = match self.index.get(&key) {
            Some(idx) => *idx as usize,
            None => {
                log::trace!("generating chunk {},{}", key.0, key.1);
                self.chunks.push(Chunk::generate(self.floor));
                self.index.insert(key, self.chunks.len() as u32 - 1);
                self.chunks.len() - 1
            }
        };
        &mut self.chunks[idx]
    }
    fn get(&self, pos: V3<i32>) -> Block {
        if !in_height(pos.y) {
            return Block::AIR;
        }
        match (self.chunk(pos), self.floor) {
            (Some(chunk), _) => chunk.get(pos),
            (None, Some((top, block))) if pos.y <= top => block,
            (None, _) => Block::AIR,
        }
    }
}

#[derive(Default)]
pub struct Level {
    dimensions: HashMap<String, Dimension>,
    markers: HashMap<BlockPos, String>,
    effects: Vec<(BlockPos, Effect)>,
}
impl Level {
    pub fn empty() -> Self {
        Self::default()
    }
    /// Adds a world whose every cell at or below `top` is `floor` until written.
    pub fn with_flat_world(mut self, name: &str, top: i32, floor: Block) -> Self {
        self.dimensions.insert(name.to_owned(), Dimension { floor: Some((top, floor)), ..Default::default() });
        self
    }
    pub fn with_world(mut self, name: &str) -> Self {
        self.dimensions.insert(name.to_owned(), Dimension::default());
        self
    }
    /// Fills the inclusive box spanned by `from` and `to`.
    pub fn fill(&mut self, from: &BlockPos, to: V3<i32>, block: Block) {
        for x in from.pos.x.min(to.x)..=from.pos.x.max(to.x) {
            for y in from.pos.y.min(to.y)..=from.pos.y.max(to.y) {
                for z in from.pos.z.min(to.z)..=from.pos.z.max(to.z) {
                    self.set_block(&BlockPos { world: from.world.clone(), pos: V3(x, y, z) }, block);
                }
            }
        }
    }
    pub fn marker(&self, pos: &BlockPos) -> Option<&str> {
        self.markers.get(pos).map(String::as_str)
    }
    pub fn custom_name(&self, pos: &BlockPos) -> Option<&str> {
        self.entity(pos).and_then(|e| e.name.as_deref())
    }
    pub fn sign_text(&self, pos: &BlockPos) -> &[String] {
        self.entity(pos).map_or(&[][..], |e| e.sign.as_slice())
    }
    pub fn effects(&self) -> &[(BlockPos, Effect)] {
        &self.effects
    }
    pub fn loaded_chunks(&self, world: &str) -> usize {
        self.dimensions.get(world).map_or(0, |d| d.chunks.len())
    }

    fn entity(&self, pos: &BlockPos) -> Option<&BlockEntity> {
        self.dimensions.get(&pos.world)?.entities.get(&pos.pos)
    }
    fn entity_mut(&mut self, pos: &BlockPos) -> Option<&mut BlockEntity> {
        let dimension = self.dimensions.get_mut(&pos.world)?;
        if !in_height(pos.pos.y) {
            return None;
        }
        Some(dimension.entities.entry(pos.pos).or_default())
    }
}

impl WorldAccess for Level {
    fn world_exists(&self, world: &str) -> bool {
        self.dimensions.contains_key(world)
    }
    fn block_at(&self, pos: &BlockPos) -> Block {
        self.dimensions.get(&pos.world).map_or(Block::AIR, |d| d.get(pos.pos))
    }
    fn set_block(&mut self, pos: &BlockPos, block: Block) {
        let Some(dimension) = self.dimensions.get_mut(&pos.world) else {
            log::warn!("set_block in unknown world {}", pos.world);
            return;
        };
        if !in_height(pos.pos.y) {
            log::trace!("ignoring set_block outside the world at {pos}");
            return;
        }
        dimension.chunk_mut(pos.pos).set(pos.pos, block);
        dimension.entities.remove(&pos.pos);
    }
    fn facing(&self, pos: &BlockPos) -> Option<BlockFace> {
        self.entity(pos)?.facing
    }
    fn set_facing(&mut self, pos: &BlockPos, facing: BlockFace) {
        if let Some(e) = self.entity_mut(pos) {
            e.facing = Some(facing);
        }
    }
    fn chest_kind(&self, pos: &BlockPos) -> Option<ChestKind> {
        if !self.block_at(pos).is_chest() {
            return None;
        }
        Some(self.entity(pos).and_then(|e| e.chest_kind).unwrap_or(ChestKind::Single))
    }
    fn set_chest_kind(&mut self, pos: &BlockPos, kind: ChestKind) {
        if let Some(e) = self.entity_mut(pos) {
            e.chest_kind = Some(kind);
        }
    }
    fn inventory(&self, pos: &BlockPos) -> Vec<ItemStack> {
        self.entity(pos).map_or_else(Vec::new, |e| e.items.clone())
    }
    fn set_inventory(&mut self, pos: &BlockPos, items: Vec<ItemStack>) {
        if let Some(e) = self.entity_mut(pos) {
            e.items = items;
        }
    }
    fn set_custom_name(&mut self, pos: &BlockPos, name: &str) {
        if let Some(e) = self.entity_mut(pos) {
            e.name = Some(name.to_owned());
        }
    }
    fn set_sign_text(&mut self, pos: &BlockPos, lines: &[String]) {
        if let Some(e) = self.entity_mut(pos) {
            e.sign = lines.to_vec();
        }
    }
    fn spawn_marker(&mut self, pos: &BlockPos, text: &str) {
        self.markers.insert(pos.clone(), text.to_owned());
    }
    fn despawn_marker(&mut self, pos: &BlockPos) {
        self.markers.remove(pos);
    }
    fn play_effect(&mut self, pos: &BlockPos, effect: Effect) {
        self.effects.push((pos.clone(), effect));
    }
}
