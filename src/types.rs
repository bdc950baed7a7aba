use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Milliseconds since the unix epoch. `0` is used as "never" for expiry times.
pub type Millis = i64;

pub const MILLIS_PER_MINUTE: Millis = 60_000;
pub const TICKS_PER_SECOND: u32 = 20;

pub fn now_millis() -> Millis {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Millis)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct V3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}
#[allow(non_snake_case)]
pub const fn V3<T>(x: T, y: T, z: T) -> V3<T> {
    V3 { x, y, z }
}
impl<T: Add<Output = T>> Add for V3<T> {
    type Output = V3<T>;
    fn add(self, rhs: Self) -> Self {
        V3(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}
impl V3<i32> {
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        V3(self.x + dx, self.y + dy, self.z + dz)
    }
    pub fn relative(self, face: BlockFace) -> Self {
        self + face.offset()
    }
}
impl fmt::Display for V3<i32> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockFace {
    Top,
    Bottom,
    North,
    South,
    West,
    East,
}
impl BlockFace {
    /// Order used whenever neighbouring cells are scanned.
    pub const HORIZONTAL: [BlockFace; 4] = [BlockFace::North, BlockFace::East, BlockFace::South, BlockFace::West];

    pub fn offset(self) -> V3<i32> {
        match self {
            BlockFace::Top => V3(0, 1, 0),
            BlockFace::Bottom => V3(0, -1, 0),
            BlockFace::North => V3(0, 0, -1),
            BlockFace::South => V3(0, 0, 1),
            BlockFace::West => V3(-1, 0, 0),
            BlockFace::East => V3(1, 0, 0),
        }
    }
    pub fn opposite(self) -> Self {
        match self {
            BlockFace::Top => BlockFace::Bottom,
            BlockFace::Bottom => BlockFace::Top,
            BlockFace::North => BlockFace::South,
            BlockFace::South => BlockFace::North,
            BlockFace::West => BlockFace::East,
            BlockFace::East => BlockFace::West,
        }
    }
    /// The horizontal face pointing from `from` towards `to`, if they are cardinal neighbours.
    pub fn between(from: V3<i32>, to: V3<i32>) -> Option<Self> {
        match (to.x - from.x, to.y - from.y, to.z - from.z) {
            (1, 0, 0) => Some(BlockFace::East),
            (-1, 0, 0) => Some(BlockFace::West),
            (0, 0, 1) => Some(BlockFace::South),
            (0, 0, -1) => Some(BlockFace::North),
            _ => None,
        }
    }
}

struct BlockInfo {
    name: &'static str,
    solid: bool,
}
macro_rules! blocks {
    {$($id:literal $konst:ident $name:literal $solid:literal)*} => {
        const BLOCKS: &[BlockInfo] = &[$(BlockInfo { name: $name, solid: $solid },)*];
        impl Block {
            $(pub const $konst: Block = Block($id);)*
        }
    };
}
/// A block material. The id indexes a static table of names and solidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u16);
blocks! {
    0 AIR "air" false
    1 STONE "stone" true
    2 GRASS_BLOCK "grass_block" true
    3 DIRT "dirt" true
    4 COBBLESTONE "cobblestone" true
    5 ANDESITE "andesite" true
    6 BEDROCK "bedrock" true
    7 SAND "sand" true
    8 GRAVEL "gravel" true
    9 OAK_PLANKS "oak_planks" true
    10 GLASS "glass" true
    11 BARRIER "barrier" true
    12 WATER "water" false
    13 LAVA "lava" false
    14 CAVE_AIR "cave_air" false
    15 VOID_AIR "void_air" false
    16 SHORT_GRASS "short_grass" false
    17 TALL_GRASS "tall_grass" false
    18 SEAGRASS "seagrass" false
    19 FERN "fern" false
    20 SNOW "snow" false
    21 VINE "vine" false
    22 DEAD_BUSH "dead_bush" false
    23 CHEST "chest" true
    24 OAK_WALL_SIGN "oak_wall_sign" false
    25 OAK_SIGN "oak_sign" false
    26 TORCH "torch" false
    27 SNOW_BLOCK "snow_block" true
    28 SPRUCE_WALL_SIGN "spruce_wall_sign" false
    29 SPRUCE_SIGN "spruce_sign" false
    30 BIRCH_WALL_SIGN "birch_wall_sign" false
    31 BIRCH_SIGN "birch_sign" false
    32 DARK_OAK_WALL_SIGN "dark_oak_wall_sign" false
    33 DARK_OAK_SIGN "dark_oak_sign" false
}
impl Block {
    pub fn net_id(self) -> u16 {
        self.0
    }
    pub fn from_net_id(id: u16) -> Option<Self> {
        BLOCKS.get(id as usize).map(|_| Block(id))
    }
    pub fn name(self) -> &'static str {
        BLOCKS[self.0 as usize].name
    }
    /// Accepts `chest`, `minecraft:chest` or `CHEST`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let name = name.strip_prefix("minecraft:").unwrap_or(name).to_ascii_lowercase();
        BLOCKS.iter().position(|b| b.name == name).map(|i| Block(i as u16))
    }
    pub fn is_solid(self) -> bool {
        BLOCKS[self.0 as usize].solid
    }
    pub fn is_air(self) -> bool {
        matches!(self, Block::AIR | Block::CAVE_AIR | Block::VOID_AIR)
    }
    pub fn is_chest(self) -> bool {
        self == Block::CHEST
    }
    /// Any sign, hanging or standing.
    pub fn is_sign(self) -> bool {
        self.name().ends_with("_sign")
    }
    pub fn is_wall_sign(self) -> bool {
        self.name().ends_with("_wall_sign")
    }
}
impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "minecraft:{}", self.name())
    }
}

/// Which half of a chest a block is. Twin chests are a `Left` and a `Right` sharing a facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChestKind {
    Single,
    Left,
    Right,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChestState {
    pub kind: ChestKind,
    pub facing: BlockFace,
}

/// A block position keyed by world name. Equality and hashing are exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub world: String,
    pub pos: V3<i32>,
}
impl BlockPos {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self { world: world.into(), pos: V3(x, y, z) }
    }
    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self { world: self.world.clone(), pos: self.pos.offset(dx, dy, dz) }
    }
    pub fn relative(&self, face: BlockFace) -> Self {
        Self { world: self.world.clone(), pos: self.pos.relative(face) }
    }
    pub fn below(&self) -> Self {
        self.relative(BlockFace::Bottom)
    }
    pub fn above(&self) -> Self {
        self.relative(BlockFace::Top)
    }
    /// Horizontal Chebyshev distance, the shell index used by the placement search.
    pub fn shell_distance(&self, other: &BlockPos) -> i32 {
        (self.pos.x - other.pos.x).abs().max((self.pos.z - other.pos.z).abs())
    }
}
impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x:{}, y:{}, z:{} in {}", self.pos.x, self.pos.y, self.pos.z, self.world)
    }
}

/// A player's UUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId([u8; 16]);
impl PlayerId {
    pub const fn from_u128(v: u128) -> Self {
        Self(v.to_be_bytes())
    }
    /// Parses the 8-4-4-4-12 hex form. Dashes are optional but the digit count is not.
    pub fn parse(s: &str) -> Option<Self> {
        let hex: String = s.trim().chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}
impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({self})")
    }
}
impl Serialize for PlayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PlayerId::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid UUID"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    /// Namespaced item key, e.g. `minecraft:diamond_sword`
    pub item: String,
    pub count: u8,
}
impl ItemStack {
    pub fn new(item: impl Into<String>, count: u8) -> Self {
        Self { item: item.into(), count }
    }
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.item == "minecraft:air"
    }
}
