use crate::events::{self, InboundEvent};
use anyhow::{bail, Result};
use bytes::{Buf, BufMut, BytesMut};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use quarry_protocol_core::{
    read_varint, varint_len, versions, write_slot, write_string16, write_varint, CodecError,
    Protocol, SharedSink,
};
use quarry_types::{
    BlockChange, BlockPos, ChunkData, ChunkPos, GameMode, ItemStack, LoginInfo, MetadataEntry,
    MetadataValue, MobSpawn, ObjectSpawn, PickupSpawn, PlayerSpawn, Vec3d, Weather,
};
use std::collections::VecDeque;
use std::io::Write as _;
use tracing::trace;

// Clientbound packet IDs, shared across the supported revisions except
// where the encoder branches on the negotiated version.
const KEEP_ALIVE: i32 = 0x00;
const LOGIN: i32 = 0x01;
const CHAT: i32 = 0x03;
const TIME_UPDATE: i32 = 0x04;
const ENTITY_EQUIPMENT: i32 = 0x05;
const UPDATE_HEALTH: i32 = 0x08;
const RESPAWN: i32 = 0x09;
const PLAYER_POSITION: i32 = 0x0B;
const PLAYER_MOVE_LOOK: i32 = 0x0D;
const USE_BED: i32 = 0x11;
const ANIMATION: i32 = 0x12;
const PLAYER_SPAWN: i32 = 0x14;
const PICKUP_SPAWN: i32 = 0x15;
const COLLECT_PICKUP: i32 = 0x16;
const SPAWN_OBJECT: i32 = 0x17;
const SPAWN_MOB: i32 = 0x18;
const DESTROY_ENTITY: i32 = 0x1D;
const ENT_REL_MOVE: i32 = 0x1F;
const ENT_LOOK: i32 = 0x20;
const ENT_REL_MOVE_LOOK: i32 = 0x21;
const TELEPORT_ENTITY: i32 = 0x22;
const ENT_HEAD_LOOK: i32 = 0x23;
const ENTITY_STATUS: i32 = 0x26;
const METADATA: i32 = 0x28;
const PRE_CHUNK: i32 = 0x32;
const MAP_CHUNK: i32 = 0x33;
const MULTI_BLOCK_CHANGE: i32 = 0x34;
const BLOCK_CHANGE: i32 = 0x35;
const BLOCK_ACTION: i32 = 0x36;
const BLOCK_BREAK_ANIM: i32 = 0x37;
const SOUND_PARTICLE_EFFECT: i32 = 0x3D;
const NAMED_SOUND_EFFECT: i32 = 0x3E;
const GAME_STATE: i32 = 0x46;
const THUNDERBOLT: i32 = 0x47;
const WINDOW_OPEN: i32 = 0x64;
const WINDOW_CLOSE: i32 = 0x65;
const INVENTORY_SLOT: i32 = 0x67;
const WHOLE_INVENTORY: i32 = 0x68;
const INVENTORY_PROGRESS: i32 = 0x69;
const UPDATE_SIGN: i32 = 0x82;
const PLAYER_LIST_ITEM: i32 = 0xC9;
const KICK: i32 = 0xFF;

// Falling blocks ride the spawn-object packet with this type.
const OBJECT_FALLING_BLOCK: i8 = 70;

/// Decoder/encoder for the classic client generations (1.2.4 through
/// 1.4.7). The revisions are close enough that one implementation covers
/// the set, branching on the negotiated version where a field or packet
/// was added along the way.
pub struct ClassicProtocol {
    version: i32,
    sink: SharedSink,
    read_buf: BytesMut,
    handshaken: bool,
    username: Option<String>,
    events: VecDeque<InboundEvent>,
}

impl ClassicProtocol {
    pub fn new(version: i32, sink: SharedSink) -> Self {
        Self {
            version,
            sink,
            read_buf: BytesMut::with_capacity(4096),
            handshaken: false,
            username: None,
            events: VecDeque::new(),
        }
    }

    pub fn protocol_version(&self) -> i32 {
        self.version
    }

    /// Username carried by the handshake, once it has been re-parsed.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Drain the next decoded inbound event, if any.
    pub fn poll_event(&mut self) -> Option<InboundEvent> {
        self.events.pop_front()
    }

    fn write_frame(&self, packet_id: i32, payload: &[u8]) -> Result<()> {
        let mut frame = BytesMut::with_capacity(payload.len() + 6);
        write_varint(&mut frame, (varint_len(packet_id) + payload.len()) as i32);
        write_varint(&mut frame, packet_id);
        frame.extend_from_slice(payload);
        self.sink.send_raw(&frame)
    }
}

/// Try to split one `<varint length><varint id><fields>` frame off the
/// read buffer. None means the frame has not fully arrived.
fn try_parse_frame(read_buf: &mut BytesMut) -> Result<Option<(i32, BytesMut)>> {
    if read_buf.is_empty() {
        return Ok(None);
    }

    let mut peek = read_buf.clone();
    let length = match read_varint(&mut peek) {
        Ok(len) => len,
        Err(CodecError::NotEnoughData) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if length <= 0 {
        bail!("invalid frame length {}", length);
    }

    let varint_bytes = read_buf.len() - peek.len();
    if peek.remaining() < length as usize {
        return Ok(None);
    }

    read_buf.advance(varint_bytes);
    let mut packet_data = read_buf.split_to(length as usize);
    let packet_id = read_varint(&mut packet_data)?;
    trace!(
        "Read frame id=0x{:02X} len={}",
        packet_id,
        packet_data.len()
    );

    Ok(Some((packet_id, packet_data)))
}

/// Absolute position in the era's 1/32-block fixed point.
fn fixed(coord: f64) -> i32 {
    (coord * 32.0).floor() as i32
}

/// Rotation in 256ths of a turn.
fn angle(degrees: f32) -> i8 {
    ((degrees / 360.0) * 256.0) as i8
}

fn write_metadata(buf: &mut BytesMut, entries: &[MetadataEntry]) {
    for entry in entries {
        let type_id: u8 = match entry.value {
            MetadataValue::Byte(_) => 0,
            MetadataValue::Short(_) => 1,
            MetadataValue::Int(_) => 2,
            MetadataValue::Float(_) => 3,
            MetadataValue::String(_) => 4,
            MetadataValue::Item(_) => 5,
            MetadataValue::Position(..) => 6,
        };
        buf.put_u8((type_id << 5) | (entry.index & 0x1F));
        match &entry.value {
            MetadataValue::Byte(v) => buf.put_i8(*v),
            MetadataValue::Short(v) => buf.put_i16(*v),
            MetadataValue::Int(v) => buf.put_i32(*v),
            MetadataValue::Float(v) => buf.put_f32(*v),
            MetadataValue::String(v) => write_string16(buf, v),
            MetadataValue::Item(item) => write_slot(buf, &Some(*item)),
            MetadataValue::Position(x, y, z) => {
                buf.put_i32(*x);
                buf.put_i32(*y);
                buf.put_i32(*z);
            }
        }
    }
    buf.put_u8(0x7F);
}

impl Protocol for ClassicProtocol {
    fn data_received(&mut self, data: &[u8]) -> Result<()> {
        self.read_buf.extend_from_slice(data);
        while let Some((id, mut payload)) = try_parse_frame(&mut self.read_buf)? {
            let event = if !self.handshaken {
                if id != 0x00 {
                    bail!("first packet must be a handshake, got 0x{:02X}", id);
                }
                let event = events::decode_handshake(&mut payload)?;
                if let InboundEvent::Handshake {
                    protocol_version,
                    username,
                    ..
                } = &event
                {
                    if *protocol_version != self.version {
                        bail!(
                            "handshake version {} does not match negotiated {}",
                            protocol_version,
                            self.version
                        );
                    }
                    self.username = Some(username.clone());
                }
                self.handshaken = true;
                event
            } else {
                events::decode_packet(id, &mut payload)?
            };
            self.events.push_back(event);
        }
        Ok(())
    }

    fn auth_server_id(&self) -> String {
        // Offline placeholder; the session hash needs the encryption layer.
        "-".into()
    }

    fn send_block_action(
        &mut self,
        pos: BlockPos,
        byte1: i8,
        byte2: i8,
        block_type: u8,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(pos.x);
        buf.put_i16(pos.y as i16);
        buf.put_i32(pos.z);
        buf.put_i8(byte1);
        buf.put_i8(byte2);
        buf.put_i16(block_type as i16);
        self.write_frame(BLOCK_ACTION, &buf)
    }

    fn send_block_break_anim(&mut self, entity_id: i32, pos: BlockPos, stage: i8) -> Result<()> {
        if self.version < versions::V1_4_2 {
            // Packet introduced in 1.4; older clients just see the break.
            return Ok(());
        }
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i32(pos.x);
        buf.put_i32(pos.y);
        buf.put_i32(pos.z);
        buf.put_i8(stage);
        self.write_frame(BLOCK_BREAK_ANIM, &buf)
    }

    fn send_block_change(&mut self, pos: BlockPos, block_type: u8, block_meta: u8) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(pos.x);
        buf.put_i8(pos.y as i8);
        buf.put_i32(pos.z);
        buf.put_u8(block_type);
        buf.put_u8(block_meta);
        self.write_frame(BLOCK_CHANGE, &buf)
    }

    fn send_block_changes(&mut self, chunk: ChunkPos, changes: &[BlockChange]) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(chunk.x);
        buf.put_i32(chunk.z);
        buf.put_u16(changes.len() as u16);
        buf.put_i32(changes.len() as i32 * 4);
        for change in changes {
            buf.put_u16(
                ((change.rel_x as u16) << 12) | ((change.rel_z as u16) << 8) | change.y as u16,
            );
            buf.put_u16(((change.block_type as u16) << 4) | (change.block_meta as u16 & 0x0F));
        }
        self.write_frame(MULTI_BLOCK_CHANGE, &buf)
    }

    fn send_chat(&mut self, message: &str) -> Result<()> {
        let mut buf = BytesMut::new();
        write_string16(&mut buf, message);
        self.write_frame(CHAT, &buf)
    }

    fn send_chunk_data(&mut self, chunk: ChunkPos, data: &ChunkData) -> Result<()> {
        let mut raw =
            Vec::with_capacity(data.block_types.len() + data.block_meta.len() * 3);
        raw.extend_from_slice(&data.block_types);
        raw.extend_from_slice(&data.block_meta);
        raw.extend_from_slice(&data.block_light);
        raw.extend_from_slice(&data.sky_light);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let compressed = encoder.finish()?;

        let mut buf = BytesMut::with_capacity(compressed.len() + 18);
        buf.put_i32(chunk.x);
        buf.put_i32(chunk.z);
        buf.put_u8(1); // whole column
        buf.put_u16(0xFFFF); // primary bitmask
        buf.put_u16(0); // add bitmask
        buf.put_i32(compressed.len() as i32);
        buf.put_slice(&compressed);
        self.write_frame(MAP_CHUNK, &buf)
    }

    fn send_collect_pickup(&mut self, pickup_id: i32, player_id: i32) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(pickup_id);
        buf.put_i32(player_id);
        self.write_frame(COLLECT_PICKUP, &buf)
    }

    fn send_destroy_entity(&mut self, entity_id: i32) -> Result<()> {
        let mut buf = BytesMut::new();
        if self.version >= versions::V1_3_2 {
            // 1.3 turned this into a list packet.
            buf.put_u8(1);
        }
        buf.put_i32(entity_id);
        self.write_frame(DESTROY_ENTITY, &buf)
    }

    fn send_disconnect(&mut self, reason: &str) -> Result<()> {
        let mut buf = BytesMut::new();
        write_string16(&mut buf, reason);
        self.write_frame(KICK, &buf)
    }

    fn send_entity_equipment(
        &mut self,
        entity_id: i32,
        slot: i16,
        item: Option<ItemStack>,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i16(slot);
        match item {
            Some(item) => {
                buf.put_i16(item.id);
                buf.put_i16(item.damage);
            }
            None => {
                buf.put_i16(-1);
                buf.put_i16(0);
            }
        }
        self.write_frame(ENTITY_EQUIPMENT, &buf)
    }

    fn send_entity_head_look(&mut self, entity_id: i32, head_yaw: i8) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i8(head_yaw);
        self.write_frame(ENT_HEAD_LOOK, &buf)
    }

    fn send_entity_look(&mut self, entity_id: i32, yaw: i8, pitch: i8) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i8(yaw);
        buf.put_i8(pitch);
        self.write_frame(ENT_LOOK, &buf)
    }

    fn send_entity_rel_move(&mut self, entity_id: i32, dx: i8, dy: i8, dz: i8) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i8(dx);
        buf.put_i8(dy);
        buf.put_i8(dz);
        self.write_frame(ENT_REL_MOVE, &buf)
    }

    fn send_entity_rel_move_look(
        &mut self,
        entity_id: i32,
        dx: i8,
        dy: i8,
        dz: i8,
        yaw: i8,
        pitch: i8,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i8(dx);
        buf.put_i8(dy);
        buf.put_i8(dz);
        buf.put_i8(yaw);
        buf.put_i8(pitch);
        self.write_frame(ENT_REL_MOVE_LOOK, &buf)
    }

    fn send_entity_status(&mut self, entity_id: i32, status: i8) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i8(status);
        self.write_frame(ENTITY_STATUS, &buf)
    }

    fn send_game_mode(&mut self, mode: GameMode) -> Result<()> {
        if self.version < versions::V1_3_2 {
            // Mid-session mode switches arrived with 1.3.
            return Ok(());
        }
        let mut buf = BytesMut::new();
        buf.put_u8(3); // change game mode
        buf.put_u8(mode.id());
        self.write_frame(GAME_STATE, &buf)
    }

    fn send_health(&mut self, health: i16, food: i16, saturation: f32) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i16(health);
        buf.put_i16(food);
        buf.put_f32(saturation);
        self.write_frame(UPDATE_HEALTH, &buf)
    }

    fn send_inventory_progress(
        &mut self,
        window_id: i8,
        progress_bar: i16,
        value: i16,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i8(window_id);
        buf.put_i16(progress_bar);
        buf.put_i16(value);
        self.write_frame(INVENTORY_PROGRESS, &buf)
    }

    fn send_inventory_slot(
        &mut self,
        window_id: i8,
        slot: i16,
        item: Option<ItemStack>,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i8(window_id);
        buf.put_i16(slot);
        write_slot(&mut buf, &item);
        self.write_frame(INVENTORY_SLOT, &buf)
    }

    fn send_keep_alive(&mut self, ping_id: i32) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(ping_id);
        self.write_frame(KEEP_ALIVE, &buf)
    }

    fn send_login(&mut self, info: &LoginInfo) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(info.entity_id);
        write_string16(&mut buf, &info.level_type);
        buf.put_u8(info.game_mode.id());
        buf.put_i8(info.dimension);
        buf.put_i8(info.difficulty);
        buf.put_u8(info.world_height);
        buf.put_u8(info.max_players);
        self.write_frame(LOGIN, &buf)
    }

    fn send_metadata(&mut self, entity_id: i32, metadata: &[MetadataEntry]) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        write_metadata(&mut buf, metadata);
        self.write_frame(METADATA, &buf)
    }

    fn send_pickup_spawn(&mut self, pickup: &PickupSpawn) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(pickup.entity_id);
        buf.put_i16(pickup.item.id);
        buf.put_i8(pickup.item.count);
        buf.put_i16(pickup.item.damage);
        buf.put_i32(fixed(pickup.pos.x));
        buf.put_i32(fixed(pickup.pos.y));
        buf.put_i32(fixed(pickup.pos.z));
        buf.put_i8(pickup.yaw);
        buf.put_i8(pickup.pitch);
        buf.put_i8(pickup.roll);
        self.write_frame(PICKUP_SPAWN, &buf)
    }

    fn send_player_animation(&mut self, player_id: i32, animation: i8) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(player_id);
        buf.put_i8(animation);
        self.write_frame(ANIMATION, &buf)
    }

    fn send_player_list_item(&mut self, name: &str, online: bool, ping: i16) -> Result<()> {
        let mut buf = BytesMut::new();
        write_string16(&mut buf, name);
        buf.put_u8(online as u8);
        buf.put_i16(ping);
        self.write_frame(PLAYER_LIST_ITEM, &buf)
    }

    fn send_player_move_look(
        &mut self,
        pos: Vec3d,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_f64(pos.x);
        buf.put_f64(pos.y);
        buf.put_f64(pos.y + 1.62); // eye-height stance
        buf.put_f64(pos.z);
        buf.put_f32(yaw);
        buf.put_f32(pitch);
        buf.put_u8(on_ground as u8);
        self.write_frame(PLAYER_MOVE_LOOK, &buf)
    }

    fn send_player_position(&mut self, pos: Vec3d, on_ground: bool) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_f64(pos.x);
        buf.put_f64(pos.y);
        buf.put_f64(pos.y + 1.62);
        buf.put_f64(pos.z);
        buf.put_u8(on_ground as u8);
        self.write_frame(PLAYER_POSITION, &buf)
    }

    fn send_player_spawn(&mut self, player: &PlayerSpawn) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(player.entity_id);
        write_string16(&mut buf, &player.name);
        buf.put_i32(fixed(player.pos.x));
        buf.put_i32(fixed(player.pos.y));
        buf.put_i32(fixed(player.pos.z));
        buf.put_i8(angle(player.yaw));
        buf.put_i8(angle(player.pitch));
        buf.put_i16(player.held_item);
        self.write_frame(PLAYER_SPAWN, &buf)
    }

    fn send_respawn(
        &mut self,
        dimension: i8,
        difficulty: i8,
        game_mode: GameMode,
        world_height: u8,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i8(dimension);
        buf.put_i8(difficulty);
        buf.put_u8(game_mode.id());
        buf.put_i16(world_height as i16);
        self.write_frame(RESPAWN, &buf)
    }

    fn send_sound_effect(
        &mut self,
        sound_name: &str,
        x: i32,
        y: i32,
        z: i32,
        volume: f32,
        pitch: f32,
    ) -> Result<()> {
        if self.version < versions::V1_4_2 {
            // Named sounds arrived with 1.4; nothing to fall back to.
            return Ok(());
        }
        let mut buf = BytesMut::new();
        write_string16(&mut buf, sound_name);
        buf.put_i32(x);
        buf.put_i32(y);
        buf.put_i32(z);
        buf.put_f32(volume);
        buf.put_f32(pitch);
        self.write_frame(NAMED_SOUND_EFFECT, &buf)
    }

    fn send_sound_particle_effect(
        &mut self,
        effect_id: i32,
        pos: BlockPos,
        data: i32,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(effect_id);
        buf.put_i32(pos.x);
        buf.put_i8(pos.y as i8);
        buf.put_i32(pos.z);
        buf.put_i32(data);
        self.write_frame(SOUND_PARTICLE_EFFECT, &buf)
    }

    fn send_spawn_falling_block(
        &mut self,
        entity_id: i32,
        block_type: u8,
        pos: Vec3d,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i8(OBJECT_FALLING_BLOCK);
        buf.put_i32(fixed(pos.x));
        buf.put_i32(fixed(pos.y));
        buf.put_i32(fixed(pos.z));
        if self.version >= versions::V1_4_2 {
            buf.put_i8(0); // yaw
            buf.put_i8(0); // pitch
        }
        buf.put_i32(block_type as i32);
        buf.put_i16(0);
        buf.put_i16(0);
        buf.put_i16(0);
        self.write_frame(SPAWN_OBJECT, &buf)
    }

    fn send_spawn_mob(&mut self, mob: &MobSpawn) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(mob.entity_id);
        buf.put_i8(mob.mob_type);
        buf.put_i32(fixed(mob.pos.x));
        buf.put_i32(fixed(mob.pos.y));
        buf.put_i32(fixed(mob.pos.z));
        buf.put_i8(angle(mob.yaw));
        buf.put_i8(angle(mob.pitch));
        if self.version >= versions::V1_3_2 {
            // 1.3 added head yaw and an initial velocity.
            buf.put_i8(angle(mob.head_yaw));
            buf.put_i16(mob.velocity_x);
            buf.put_i16(mob.velocity_y);
            buf.put_i16(mob.velocity_z);
        }
        write_metadata(&mut buf, &mob.metadata);
        self.write_frame(SPAWN_MOB, &buf)
    }

    fn send_spawn_object(&mut self, object: &ObjectSpawn) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(object.entity_id);
        buf.put_i8(object.object_type);
        buf.put_i32(fixed(object.pos.x));
        buf.put_i32(fixed(object.pos.y));
        buf.put_i32(fixed(object.pos.z));
        if self.version >= versions::V1_4_2 {
            buf.put_i8(object.yaw);
            buf.put_i8(object.pitch);
        }
        buf.put_i32(object.object_data);
        if object.object_data != 0 {
            buf.put_i16(object.speed_x);
            buf.put_i16(object.speed_y);
            buf.put_i16(object.speed_z);
        }
        self.write_frame(SPAWN_OBJECT, &buf)
    }

    fn send_spawn_vehicle(&mut self, entity_id: i32, vehicle_type: i8, pos: Vec3d) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i8(vehicle_type);
        buf.put_i32(fixed(pos.x));
        buf.put_i32(fixed(pos.y));
        buf.put_i32(fixed(pos.z));
        if self.version >= versions::V1_4_2 {
            buf.put_i8(0);
            buf.put_i8(0);
        }
        buf.put_i32(0);
        self.write_frame(SPAWN_OBJECT, &buf)
    }

    fn send_teleport_entity(
        &mut self,
        entity_id: i32,
        pos: Vec3d,
        yaw: i8,
        pitch: i8,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_i32(fixed(pos.x));
        buf.put_i32(fixed(pos.y));
        buf.put_i32(fixed(pos.z));
        buf.put_i8(yaw);
        buf.put_i8(pitch);
        self.write_frame(TELEPORT_ENTITY, &buf)
    }

    fn send_thunderbolt(&mut self, pos: BlockPos) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(0); // pseudo entity ID; clients only draw the bolt
        buf.put_u8(1);
        buf.put_i32(pos.x * 32);
        buf.put_i32(pos.y * 32);
        buf.put_i32(pos.z * 32);
        self.write_frame(THUNDERBOLT, &buf)
    }

    fn send_time_update(&mut self, world_age: i64, time_of_day: i64) -> Result<()> {
        let mut buf = BytesMut::new();
        if self.version >= versions::V1_3_2 {
            buf.put_i64(world_age);
        }
        buf.put_i64(time_of_day);
        self.write_frame(TIME_UPDATE, &buf)
    }

    fn send_unload_chunk(&mut self, chunk: ChunkPos) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(chunk.x);
        buf.put_i32(chunk.z);
        buf.put_u8(0); // unload
        self.write_frame(PRE_CHUNK, &buf)
    }

    fn send_update_sign(&mut self, pos: BlockPos, lines: &[String; 4]) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(pos.x);
        buf.put_i16(pos.y as i16);
        buf.put_i32(pos.z);
        for line in lines {
            write_string16(&mut buf, line);
        }
        self.write_frame(UPDATE_SIGN, &buf)
    }

    fn send_use_bed(&mut self, entity_id: i32, pos: BlockPos) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(entity_id);
        buf.put_u8(0);
        buf.put_i32(pos.x);
        buf.put_i8(pos.y as i8);
        buf.put_i32(pos.z);
        self.write_frame(USE_BED, &buf)
    }

    fn send_weather(&mut self, weather: Weather) -> Result<()> {
        let mut buf = BytesMut::new();
        let reason: u8 = match weather {
            Weather::Clear => 2,
            Weather::Rain | Weather::Thunder => 1,
        };
        buf.put_u8(reason);
        buf.put_u8(0);
        self.write_frame(GAME_STATE, &buf)
    }

    fn send_whole_inventory(&mut self, window_id: i8, slots: &[Option<ItemStack>]) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i8(window_id);
        buf.put_i16(slots.len() as i16);
        for slot in slots {
            write_slot(&mut buf, slot);
        }
        self.write_frame(WHOLE_INVENTORY, &buf)
    }

    fn send_window_close(&mut self, window_id: i8) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i8(window_id);
        self.write_frame(WINDOW_CLOSE, &buf)
    }

    fn send_window_open(
        &mut self,
        window_id: i8,
        window_type: i8,
        title: &str,
        num_slots: i8,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i8(window_id);
        buf.put_i8(window_type);
        write_string16(&mut buf, title);
        buf.put_i8(num_slots);
        self.write_frame(WINDOW_OPEN, &buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use quarry_protocol_core::{read_string16, ByteSink};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<Vec<u8>>,
    }

    impl ByteSink for RecordingSink {
        fn send_raw(&self, data: &[u8]) -> Result<()> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }
        fn close(&self) {}
    }

    impl RecordingSink {
        fn take(&self) -> BytesMut {
            BytesMut::from(&self.written.lock().unwrap().split_off(0)[..])
        }
    }

    fn protocol(version: i32) -> (ClassicProtocol, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (ClassicProtocol::new(version, sink.clone()), sink)
    }

    fn handshake_frame(version: i32, username: &str) -> Vec<u8> {
        let mut body = BytesMut::new();
        write_varint(&mut body, 0x00);
        write_varint(&mut body, version);
        write_string16(&mut body, username);
        write_string16(&mut body, "localhost");
        body.put_u16(25565);
        let mut frame = BytesMut::new();
        write_varint(&mut frame, body.len() as i32);
        frame.extend_from_slice(&body);
        frame.to_vec()
    }

    #[test]
    fn test_chat_frame_layout() {
        let (mut proto, sink) = protocol(versions::V1_4_7);
        proto.send_chat("hi").unwrap();
        let mut out = sink.take();
        let length = read_varint(&mut out).unwrap();
        assert_eq!(length as usize, out.len());
        assert_eq!(read_varint(&mut out).unwrap(), CHAT);
        assert_eq!(read_string16(&mut out, 119).unwrap(), "hi");
        assert!(out.is_empty());
    }

    #[test]
    fn test_handshake_reparse() {
        let (mut proto, _sink) = protocol(versions::V1_4_2);
        proto
            .data_received(&handshake_frame(versions::V1_4_2, "Notch"))
            .unwrap();
        match proto.poll_event() {
            Some(InboundEvent::Handshake {
                protocol_version,
                username,
                server_port,
                ..
            }) => {
                assert_eq!(protocol_version, 47);
                assert_eq!(username, "Notch");
                assert_eq!(server_port, 25565);
            }
            other => panic!("expected handshake event, got {:?}", other),
        }
        assert_eq!(proto.username(), Some("Notch"));
    }

    #[test]
    fn test_handshake_version_mismatch_is_error() {
        let (mut proto, _sink) = protocol(versions::V1_4_2);
        assert!(proto
            .data_received(&handshake_frame(versions::V1_2_5, "Notch"))
            .is_err());
    }

    #[test]
    fn test_inbound_frame_across_chunks() {
        let (mut proto, _sink) = protocol(versions::V1_4_7);
        proto
            .data_received(&handshake_frame(versions::V1_4_7, "Notch"))
            .unwrap();
        proto.poll_event();

        let mut frame = BytesMut::new();
        write_varint(&mut frame, 5);
        write_varint(&mut frame, events::SB_KEEP_ALIVE);
        frame.put_i32(77);
        for byte in &frame[..frame.len() - 1] {
            proto.data_received(&[*byte]).unwrap();
            assert!(proto.poll_event().is_none());
        }
        proto.data_received(&[frame[frame.len() - 1]]).unwrap();
        match proto.poll_event() {
            Some(InboundEvent::KeepAlive { ping_id }) => assert_eq!(ping_id, 77),
            other => panic!("expected keep-alive, got {:?}", other),
        }
    }

    #[test]
    fn test_destroy_entity_differs_by_version() {
        let (mut old, old_sink) = protocol(versions::V1_2_5);
        old.send_destroy_entity(9).unwrap();
        let mut out = old_sink.take();
        let _ = read_varint(&mut out).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), DESTROY_ENTITY);
        assert_eq!(out.len(), 4);

        let (mut new, new_sink) = protocol(versions::V1_3_2);
        new.send_destroy_entity(9).unwrap();
        let mut out = new_sink.take();
        let _ = read_varint(&mut out).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), DESTROY_ENTITY);
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], 1);
    }

    #[test]
    fn test_named_sound_is_noop_before_1_4() {
        let (mut proto, sink) = protocol(versions::V1_3_2);
        proto
            .send_sound_effect("random.click", 0, 64, 0, 1.0, 1.0)
            .unwrap();
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_chunk_data_roundtrips_through_zlib() {
        use flate2::read::ZlibDecoder;
        use std::io::Read as _;

        let (mut proto, sink) = protocol(versions::V1_4_7);
        let data = ChunkData {
            block_types: vec![1; 64],
            block_meta: vec![2; 32],
            block_light: vec![3; 32],
            sky_light: vec![4; 32],
        };
        proto.send_chunk_data(ChunkPos::new(3, -7), &data).unwrap();

        let mut out = sink.take();
        let _ = read_varint(&mut out).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), MAP_CHUNK);
        assert_eq!(out.get_i32(), 3);
        assert_eq!(out.get_i32(), -7);
        assert_eq!(out.get_u8(), 1);
        assert_eq!(out.get_u16(), 0xFFFF);
        assert_eq!(out.get_u16(), 0);
        let compressed_len = out.get_i32() as usize;
        assert_eq!(out.len(), compressed_len);

        let mut decompressed = Vec::new();
        ZlibDecoder::new(&out[..])
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed.len(), 160);
        assert_eq!(&decompressed[..64], &[1; 64][..]);
    }
}
