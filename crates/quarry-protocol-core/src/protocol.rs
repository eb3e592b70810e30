use anyhow::Result;
use quarry_types::{
    BlockChange, BlockPos, ChunkData, ChunkPos, GameMode, ItemStack, LoginInfo, MetadataEntry,
    MobSpawn, ObjectSpawn, PickupSpawn, PlayerSpawn, Vec3d, Weather,
};
use std::sync::Arc;

/// Raw outbound byte path back to the connection layer. Implementations
/// queue the bytes for the socket writer; nothing here blocks.
pub trait ByteSink: Send + Sync {
    fn send_raw(&self, data: &[u8]) -> Result<()>;

    /// Ask the connection layer to tear the connection down once queued
    /// bytes have been flushed.
    fn close(&self);
}

pub type SharedSink = Arc<dyn ByteSink>;

/// Point-in-time server status, used to answer legacy server-list pings.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub description: String,
    pub online_players: usize,
    pub max_players: usize,
}

/// Supplies the current status on demand; backed by config and live
/// player counters in the embedding server.
pub trait StatusSource: Send + Sync {
    fn status(&self) -> ServerStatus;
}

/// The capability set every concrete protocol revision implements.
///
/// One instance serves one connection. Inbound bytes go through
/// `data_received`; everything else is an outbound event the rest of the
/// server fires without knowing which revision is on the wire. Methods are
/// sorted alphabetically, `data_received`/`auth_server_id` first.
pub trait Protocol: Send {
    /// Feed raw inbound bytes for decoding.
    fn data_received(&mut self, data: &[u8]) -> Result<()>;

    /// Identifier of the session-auth server this revision checks against.
    fn auth_server_id(&self) -> String;

    fn send_block_action(
        &mut self,
        pos: BlockPos,
        byte1: i8,
        byte2: i8,
        block_type: u8,
    ) -> Result<()>;
    fn send_block_break_anim(&mut self, entity_id: i32, pos: BlockPos, stage: i8) -> Result<()>;
    fn send_block_change(&mut self, pos: BlockPos, block_type: u8, block_meta: u8) -> Result<()>;
    fn send_block_changes(&mut self, chunk: ChunkPos, changes: &[BlockChange]) -> Result<()>;
    fn send_chat(&mut self, message: &str) -> Result<()>;
    fn send_chunk_data(&mut self, chunk: ChunkPos, data: &ChunkData) -> Result<()>;
    fn send_collect_pickup(&mut self, pickup_id: i32, player_id: i32) -> Result<()>;
    fn send_destroy_entity(&mut self, entity_id: i32) -> Result<()>;
    fn send_disconnect(&mut self, reason: &str) -> Result<()>;
    fn send_entity_equipment(
        &mut self,
        entity_id: i32,
        slot: i16,
        item: Option<ItemStack>,
    ) -> Result<()>;
    fn send_entity_head_look(&mut self, entity_id: i32, head_yaw: i8) -> Result<()>;
    fn send_entity_look(&mut self, entity_id: i32, yaw: i8, pitch: i8) -> Result<()>;
    fn send_entity_rel_move(&mut self, entity_id: i32, dx: i8, dy: i8, dz: i8) -> Result<()>;
    fn send_entity_rel_move_look(
        &mut self,
        entity_id: i32,
        dx: i8,
        dy: i8,
        dz: i8,
        yaw: i8,
        pitch: i8,
    ) -> Result<()>;
    fn send_entity_status(&mut self, entity_id: i32, status: i8) -> Result<()>;
    fn send_game_mode(&mut self, mode: GameMode) -> Result<()>;
    fn send_health(&mut self, health: i16, food: i16, saturation: f32) -> Result<()>;
    fn send_inventory_progress(&mut self, window_id: i8, progress_bar: i16, value: i16)
        -> Result<()>;
    fn send_inventory_slot(
        &mut self,
        window_id: i8,
        slot: i16,
        item: Option<ItemStack>,
    ) -> Result<()>;
    fn send_keep_alive(&mut self, ping_id: i32) -> Result<()>;
    fn send_login(&mut self, info: &LoginInfo) -> Result<()>;
    fn send_metadata(&mut self, entity_id: i32, metadata: &[MetadataEntry]) -> Result<()>;
    fn send_pickup_spawn(&mut self, pickup: &PickupSpawn) -> Result<()>;
    fn send_player_animation(&mut self, player_id: i32, animation: i8) -> Result<()>;
    fn send_player_list_item(&mut self, name: &str, online: bool, ping: i16) -> Result<()>;
    fn send_player_move_look(
        &mut self,
        pos: Vec3d,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    ) -> Result<()>;
    fn send_player_position(&mut self, pos: Vec3d, on_ground: bool) -> Result<()>;
    fn send_player_spawn(&mut self, player: &PlayerSpawn) -> Result<()>;
    fn send_respawn(
        &mut self,
        dimension: i8,
        difficulty: i8,
        game_mode: GameMode,
        world_height: u8,
    ) -> Result<()>;
    fn send_sound_effect(
        &mut self,
        sound_name: &str,
        x: i32,
        y: i32,
        z: i32,
        volume: f32,
        pitch: f32,
    ) -> Result<()>;
    fn send_sound_particle_effect(&mut self, effect_id: i32, pos: BlockPos, data: i32)
        -> Result<()>;
    fn send_spawn_falling_block(&mut self, entity_id: i32, block_type: u8, pos: Vec3d)
        -> Result<()>;
    fn send_spawn_mob(&mut self, mob: &MobSpawn) -> Result<()>;
    fn send_spawn_object(&mut self, object: &ObjectSpawn) -> Result<()>;
    fn send_spawn_vehicle(&mut self, entity_id: i32, vehicle_type: i8, pos: Vec3d) -> Result<()>;
    fn send_teleport_entity(&mut self, entity_id: i32, pos: Vec3d, yaw: i8, pitch: i8)
        -> Result<()>;
    fn send_thunderbolt(&mut self, pos: BlockPos) -> Result<()>;
    fn send_time_update(&mut self, world_age: i64, time_of_day: i64) -> Result<()>;
    fn send_unload_chunk(&mut self, chunk: ChunkPos) -> Result<()>;
    fn send_update_sign(&mut self, pos: BlockPos, lines: &[String; 4]) -> Result<()>;
    fn send_use_bed(&mut self, entity_id: i32, pos: BlockPos) -> Result<()>;
    fn send_weather(&mut self, weather: Weather) -> Result<()>;
    fn send_whole_inventory(&mut self, window_id: i8, slots: &[Option<ItemStack>]) -> Result<()>;
    fn send_window_close(&mut self, window_id: i8) -> Result<()>;
    fn send_window_open(
        &mut self,
        window_id: i8,
        window_type: i8,
        title: &str,
        num_slots: i8,
    ) -> Result<()>;
}
