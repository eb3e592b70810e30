use serde::{Deserialize, Serialize};

/// A block position in the world (x, y, z integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn chunk_pos(&self) -> ChunkPos {
        ChunkPos {
            x: self.x >> 4,
            z: self.z >> 4,
        }
    }
}

/// A chunk position (x, z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// A 3D position with double precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3d {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn chunk_pos(&self) -> ChunkPos {
        ChunkPos {
            x: (self.x.floor() as i32) >> 4,
            z: (self.z.floor() as i32) >> 4,
        }
    }
}

/// Game mode enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GameMode {
    Survival = 0,
    Creative = 1,
    Adventure = 2,
}

impl GameMode {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Weather state broadcast to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weather {
    Clear,
    Rain,
    Thunder,
}

/// An item stack in an inventory slot.
/// Empty slots are represented as `Option::None`, not as a zero count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Numeric item/block ID.
    pub id: i16,
    /// Number of items in this stack (1-64).
    pub count: i8,
    /// Damage / metadata value.
    pub damage: i16,
}

impl ItemStack {
    pub fn new(id: i16, count: i8, damage: i16) -> Self {
        Self { id, count, damage }
    }
}

/// A single block change within one chunk, coordinates chunk-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChange {
    pub rel_x: u8,
    pub y: u8,
    pub rel_z: u8,
    pub block_type: u8,
    pub block_meta: u8,
}

/// An entity metadata entry (index + typed value).
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub index: u8,
    pub value: MetadataValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    String(String),
    Item(ItemStack),
    Position(i32, i32, i32),
}

/// Everything the join packet needs about the joining player and world.
#[derive(Debug, Clone)]
pub struct LoginInfo {
    pub entity_id: i32,
    pub game_mode: GameMode,
    pub dimension: i8,
    pub difficulty: i8,
    pub world_height: u8,
    pub max_players: u8,
    pub level_type: String,
}

/// Spawn data for a named player entity.
#[derive(Debug, Clone)]
pub struct PlayerSpawn {
    pub entity_id: i32,
    pub name: String,
    pub pos: Vec3d,
    pub yaw: f32,
    pub pitch: f32,
    /// Item ID currently held, 0 for empty hand.
    pub held_item: i16,
}

/// Spawn data for a mob entity.
#[derive(Debug, Clone)]
pub struct MobSpawn {
    pub entity_id: i32,
    pub mob_type: i8,
    pub pos: Vec3d,
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
    pub velocity_x: i16,
    pub velocity_y: i16,
    pub velocity_z: i16,
    pub metadata: Vec<MetadataEntry>,
}

/// Spawn data for a non-mob object or vehicle.
#[derive(Debug, Clone)]
pub struct ObjectSpawn {
    pub entity_id: i32,
    pub object_type: i8,
    pub pos: Vec3d,
    /// Object-specific data field; a velocity block follows iff non-zero.
    pub object_data: i32,
    pub speed_x: i16,
    pub speed_y: i16,
    pub speed_z: i16,
    pub yaw: i8,
    pub pitch: i8,
}

/// Spawn data for a dropped item pickup.
#[derive(Debug, Clone)]
pub struct PickupSpawn {
    pub entity_id: i32,
    pub item: ItemStack,
    pub pos: Vec3d,
    pub yaw: i8,
    pub pitch: i8,
    pub roll: i8,
}

/// One full chunk column of block data, pre-split into the four arrays
/// the wire format wants. Lengths are the serializer's concern.
#[derive(Debug, Clone, Default)]
pub struct ChunkData {
    pub block_types: Vec<u8>,
    pub block_meta: Vec<u8>,
    pub block_light: Vec<u8>,
    pub sky_light: Vec<u8>,
}
