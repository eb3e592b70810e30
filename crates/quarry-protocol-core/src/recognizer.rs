use crate::buffer::{Lookahead, PendingBuffer};
use crate::legacy::{self, PingParse};
use crate::protocol::{Protocol, SharedSink, StatusSource};
use crate::registry::VersionRegistry;
use anyhow::Result;
use bytes::BytesMut;
use quarry_types::{
    BlockChange, BlockPos, ChunkData, ChunkPos, GameMode, ItemStack, LoginInfo, MetadataEntry,
    MobSpawn, ObjectSpawn, PickupSpawn, PlayerSpawn, Vec3d, Weather,
};
use std::mem;
use std::sync::Arc;
use tracing::{debug, info};

/// Packet ID of the handshake, the first framed packet a conforming
/// client sends. Uniform across the supported revisions.
const HANDSHAKE_PACKET_ID: i32 = 0x00;

/// Largest plausible declared length for a handshake frame.
const MAX_HANDSHAKE_FRAME: i32 = 1024;

enum State {
    /// No decision yet; bytes accumulate in the pending buffer.
    Sniffing(PendingBuffer),
    /// A revision has been selected and owns the rest of the connection.
    Bound(Box<dyn Protocol>),
    /// Terminal: legacy ping answered, or the client was kicked.
    Closed,
}

/// What one recognition attempt concluded from the buffered bytes.
enum Attempt {
    NeedMore,
    Select(i32),
    LegacyPing,
    /// Structurally invalid framed opening; kick with a generic error.
    Malformed(&'static str),
    /// Legacy marker followed by garbage; drop without a reply.
    MalformedPing,
}

/// Meta-protocol facade for one client connection.
///
/// Buffers the first bytes until they identify a protocol revision (or a
/// legacy server-list ping), then becomes that revision: every inbound
/// byte and outbound send is forwarded to the selected decoder unchanged.
/// The selection is permanent for the connection's lifetime.
pub struct Recognizer {
    state: State,
    sink: SharedSink,
    registry: Arc<VersionRegistry>,
    status: Arc<dyn StatusSource>,
}

impl Recognizer {
    pub fn new(
        sink: SharedSink,
        registry: Arc<VersionRegistry>,
        status: Arc<dyn StatusSource>,
    ) -> Self {
        Self {
            state: State::Sniffing(PendingBuffer::new()),
            sink,
            registry,
            status,
        }
    }

    /// True once a concrete revision owns the connection.
    pub fn is_bound(&self) -> bool {
        matches!(self.state, State::Bound(_))
    }

    /// True once the connection reached a terminal decision (ping answered
    /// or client kicked) without a decoder being selected.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Write raw bytes straight to the connection, bypassing any decoder.
    /// Usable before recognition, e.g. to answer pings by hand.
    pub fn send_data(&self, data: &[u8]) -> Result<()> {
        self.sink.send_raw(data)
    }

    fn sniff(&mut self, data: &[u8]) -> Result<()> {
        // Failure paths below leave the state at Closed; only NeedMore and
        // a successful bind replace it.
        let State::Sniffing(mut buf) = mem::replace(&mut self.state, State::Closed) else {
            return Ok(());
        };
        buf.append(data);
        if buf.over_limit() {
            debug!(
                buffered = buf.len(),
                "kicking client: pending limit exceeded before a protocol decision"
            );
            return self.kick("Protocol error");
        }
        match Self::attempt(&buf) {
            Attempt::NeedMore => {
                self.state = State::Sniffing(buf);
                Ok(())
            }
            Attempt::Select(version) => self.bind(version, buf),
            Attempt::LegacyPing => self.answer_ping(),
            Attempt::Malformed(why) => {
                debug!("kicking client: {}", why);
                self.kick("Protocol error")
            }
            Attempt::MalformedPing => {
                debug!("dropping client: malformed legacy ping payload");
                self.sink.close();
                Ok(())
            }
        }
    }

    /// Inspect the buffered bytes without consuming anything. Legacy-ping
    /// detection runs first and only ever on the very first byte: the
    /// marker value would otherwise be misread as a packet length.
    fn attempt(buf: &PendingBuffer) -> Attempt {
        let first = match buf.peek_byte(0) {
            Lookahead::Ready(b) => b,
            Lookahead::Incomplete => return Attempt::NeedMore,
        };
        if first == legacy::PING_MARKER {
            return match legacy::parse_ping(buf) {
                PingParse::Incomplete => Attempt::NeedMore,
                PingParse::Ping => Attempt::LegacyPing,
                PingParse::Malformed => Attempt::MalformedPing,
            };
        }

        // Framed stream: <varint length><varint packet id><fields>, where
        // the first packet must be a handshake leading with the version.
        let (length, length_size) = match buf.peek_varint(0) {
            Ok(Lookahead::Ready(v)) => v,
            Ok(Lookahead::Incomplete) => return Attempt::NeedMore,
            Err(_) => return Attempt::Malformed("unreadable packet length"),
        };
        if length <= 0 || length > MAX_HANDSHAKE_FRAME {
            return Attempt::Malformed("implausible handshake length");
        }
        let (packet_id, id_size) = match buf.peek_varint(length_size) {
            Ok(Lookahead::Ready(v)) => v,
            Ok(Lookahead::Incomplete) => return Attempt::NeedMore,
            Err(_) => return Attempt::Malformed("unreadable packet id"),
        };
        if packet_id != HANDSHAKE_PACKET_ID {
            return Attempt::Malformed("first packet is not a handshake");
        }
        match buf.peek_varint(length_size + id_size) {
            Ok(Lookahead::Ready((version, _))) => Attempt::Select(version),
            Ok(Lookahead::Incomplete) => Attempt::NeedMore,
            Err(_) => Attempt::Malformed("unreadable protocol version"),
        }
    }

    /// Instantiate the decoder for the negotiated version and hand it the
    /// entire buffered sequence — handshake included, since it re-parses
    /// that packet with full semantics. Unregistered versions are kicked
    /// with a message naming the number the client asked for.
    fn bind(&mut self, version: i32, mut buf: PendingBuffer) -> Result<()> {
        let Some(mut proto) = self
            .registry
            .create_decoder(version, Arc::clone(&self.sink))
        else {
            info!(
                version,
                "kicking client: unsupported protocol version"
            );
            return self.kick(&format!(
                "Unsupported protocol version {}; supported client versions: {}",
                version,
                self.registry.client_versions()
            ));
        };
        debug!(
            version,
            client = self.registry.version_text(version),
            "protocol recognized"
        );
        let pending = buf.read_all();
        proto.data_received(&pending)?;
        self.state = State::Bound(proto);
        Ok(())
    }

    /// Answer a legacy server-list ping and end the connection. The reply
    /// rides the legacy kick packet, the one message every client
    /// generation understands. No decoder is ever selected on this path.
    fn answer_ping(&mut self) -> Result<()> {
        let status = self.status.status();
        let reply = legacy::build_ping_reply(&status);
        debug!("answering legacy server-list ping");
        self.kick(&reply)
    }

    /// Write a legacy kick frame raw to the connection and close it.
    fn kick(&mut self, message: &str) -> Result<()> {
        self.state = State::Closed;
        let mut out = BytesMut::new();
        legacy::write_kick(&mut out, message);
        let sent = self.sink.send_raw(&out);
        self.sink.close();
        sent
    }

    fn bound(&mut self) -> Result<&mut Box<dyn Protocol>> {
        match &mut self.state {
            State::Bound(proto) => Ok(proto),
            _ => Err(anyhow::anyhow!("no protocol selected yet")),
        }
    }
}

/// Pure delegation: the rest of the server talks to the Recognizer as if
/// it were the concrete protocol. Until a decoder is selected only
/// `data_received`, `send_disconnect` and `auth_server_id` do anything
/// version-independent; every other send requires a bound decoder.
impl Protocol for Recognizer {
    fn data_received(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            State::Bound(proto) => return proto.data_received(data),
            State::Closed => return Ok(()),
            State::Sniffing(_) => {}
        }
        self.sniff(data)
    }

    fn auth_server_id(&self) -> String {
        match &self.state {
            State::Bound(proto) => proto.auth_server_id(),
            // Version-agnostic default for clients still unidentified.
            _ => String::new(),
        }
    }

    fn send_block_action(
        &mut self,
        pos: BlockPos,
        byte1: i8,
        byte2: i8,
        block_type: u8,
    ) -> Result<()> {
        self.bound()?.send_block_action(pos, byte1, byte2, block_type)
    }

    fn send_block_break_anim(&mut self, entity_id: i32, pos: BlockPos, stage: i8) -> Result<()> {
        self.bound()?.send_block_break_anim(entity_id, pos, stage)
    }

    fn send_block_change(&mut self, pos: BlockPos, block_type: u8, block_meta: u8) -> Result<()> {
        self.bound()?.send_block_change(pos, block_type, block_meta)
    }

    fn send_block_changes(&mut self, chunk: ChunkPos, changes: &[BlockChange]) -> Result<()> {
        self.bound()?.send_block_changes(chunk, changes)
    }

    fn send_chat(&mut self, message: &str) -> Result<()> {
        self.bound()?.send_chat(message)
    }

    fn send_chunk_data(&mut self, chunk: ChunkPos, data: &ChunkData) -> Result<()> {
        self.bound()?.send_chunk_data(chunk, data)
    }

    fn send_collect_pickup(&mut self, pickup_id: i32, player_id: i32) -> Result<()> {
        self.bound()?.send_collect_pickup(pickup_id, player_id)
    }

    fn send_destroy_entity(&mut self, entity_id: i32) -> Result<()> {
        self.bound()?.send_destroy_entity(entity_id)
    }

    fn send_disconnect(&mut self, reason: &str) -> Result<()> {
        if let State::Bound(proto) = &mut self.state {
            return proto.send_disconnect(reason);
        }
        // No revision selected: old-style kick straight to the wire.
        self.kick(reason)
    }

    fn send_entity_equipment(
        &mut self,
        entity_id: i32,
        slot: i16,
        item: Option<ItemStack>,
    ) -> Result<()> {
        self.bound()?.send_entity_equipment(entity_id, slot, item)
    }

    fn send_entity_head_look(&mut self, entity_id: i32, head_yaw: i8) -> Result<()> {
        self.bound()?.send_entity_head_look(entity_id, head_yaw)
    }

    fn send_entity_look(&mut self, entity_id: i32, yaw: i8, pitch: i8) -> Result<()> {
        self.bound()?.send_entity_look(entity_id, yaw, pitch)
    }

    fn send_entity_rel_move(&mut self, entity_id: i32, dx: i8, dy: i8, dz: i8) -> Result<()> {
        self.bound()?.send_entity_rel_move(entity_id, dx, dy, dz)
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
        self.bound()?
            .send_entity_rel_move_look(entity_id, dx, dy, dz, yaw, pitch)
    }

    fn send_entity_status(&mut self, entity_id: i32, status: i8) -> Result<()> {
        self.bound()?.send_entity_status(entity_id, status)
    }

    fn send_game_mode(&mut self, mode: GameMode) -> Result<()> {
        self.bound()?.send_game_mode(mode)
    }

    fn send_health(&mut self, health: i16, food: i16, saturation: f32) -> Result<()> {
        self.bound()?.send_health(health, food, saturation)
    }

    fn send_inventory_progress(
        &mut self,
        window_id: i8,
        progress_bar: i16,
        value: i16,
    ) -> Result<()> {
        self.bound()?
            .send_inventory_progress(window_id, progress_bar, value)
    }

    fn send_inventory_slot(
        &mut self,
        window_id: i8,
        slot: i16,
        item: Option<ItemStack>,
    ) -> Result<()> {
        self.bound()?.send_inventory_slot(window_id, slot, item)
    }

    fn send_keep_alive(&mut self, ping_id: i32) -> Result<()> {
        self.bound()?.send_keep_alive(ping_id)
    }

    fn send_login(&mut self, info: &LoginInfo) -> Result<()> {
        self.bound()?.send_login(info)
    }

    fn send_metadata(&mut self, entity_id: i32, metadata: &[MetadataEntry]) -> Result<()> {
        self.bound()?.send_metadata(entity_id, metadata)
    }

    fn send_pickup_spawn(&mut self, pickup: &PickupSpawn) -> Result<()> {
        self.bound()?.send_pickup_spawn(pickup)
    }

    fn send_player_animation(&mut self, player_id: i32, animation: i8) -> Result<()> {
        self.bound()?.send_player_animation(player_id, animation)
    }

    fn send_player_list_item(&mut self, name: &str, online: bool, ping: i16) -> Result<()> {
        self.bound()?.send_player_list_item(name, online, ping)
    }

    fn send_player_move_look(
        &mut self,
        pos: Vec3d,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    ) -> Result<()> {
        self.bound()?.send_player_move_look(pos, yaw, pitch, on_ground)
    }

    fn send_player_position(&mut self, pos: Vec3d, on_ground: bool) -> Result<()> {
        self.bound()?.send_player_position(pos, on_ground)
    }

    fn send_player_spawn(&mut self, player: &PlayerSpawn) -> Result<()> {
        self.bound()?.send_player_spawn(player)
    }

    fn send_respawn(
        &mut self,
        dimension: i8,
        difficulty: i8,
        game_mode: GameMode,
        world_height: u8,
    ) -> Result<()> {
        self.bound()?
            .send_respawn(dimension, difficulty, game_mode, world_height)
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
        self.bound()?
            .send_sound_effect(sound_name, x, y, z, volume, pitch)
    }

    fn send_sound_particle_effect(
        &mut self,
        effect_id: i32,
        pos: BlockPos,
        data: i32,
    ) -> Result<()> {
        self.bound()?.send_sound_particle_effect(effect_id, pos, data)
    }

    fn send_spawn_falling_block(
        &mut self,
        entity_id: i32,
        block_type: u8,
        pos: Vec3d,
    ) -> Result<()> {
        self.bound()?.send_spawn_falling_block(entity_id, block_type, pos)
    }

    fn send_spawn_mob(&mut self, mob: &MobSpawn) -> Result<()> {
        self.bound()?.send_spawn_mob(mob)
    }

    fn send_spawn_object(&mut self, object: &ObjectSpawn) -> Result<()> {
        self.bound()?.send_spawn_object(object)
    }

    fn send_spawn_vehicle(&mut self, entity_id: i32, vehicle_type: i8, pos: Vec3d) -> Result<()> {
        self.bound()?.send_spawn_vehicle(entity_id, vehicle_type, pos)
    }

    fn send_teleport_entity(&mut self, entity_id: i32, pos: Vec3d, yaw: i8, pitch: i8) -> Result<()> {
        self.bound()?.send_teleport_entity(entity_id, pos, yaw, pitch)
    }

    fn send_thunderbolt(&mut self, pos: BlockPos) -> Result<()> {
        self.bound()?.send_thunderbolt(pos)
    }

    fn send_time_update(&mut self, world_age: i64, time_of_day: i64) -> Result<()> {
        self.bound()?.send_time_update(world_age, time_of_day)
    }

    fn send_unload_chunk(&mut self, chunk: ChunkPos) -> Result<()> {
        self.bound()?.send_unload_chunk(chunk)
    }

    fn send_update_sign(&mut self, pos: BlockPos, lines: &[String; 4]) -> Result<()> {
        self.bound()?.send_update_sign(pos, lines)
    }

    fn send_use_bed(&mut self, entity_id: i32, pos: BlockPos) -> Result<()> {
        self.bound()?.send_use_bed(entity_id, pos)
    }

    fn send_weather(&mut self, weather: Weather) -> Result<()> {
        self.bound()?.send_weather(weather)
    }

    fn send_whole_inventory(&mut self, window_id: i8, slots: &[Option<ItemStack>]) -> Result<()> {
        self.bound()?.send_whole_inventory(window_id, slots)
    }

    fn send_window_close(&mut self, window_id: i8) -> Result<()> {
        self.bound()?.send_window_close(window_id)
    }

    fn send_window_open(
        &mut self,
        window_id: i8,
        window_type: i8,
        title: &str,
        num_slots: i8,
    ) -> Result<()> {
        self.bound()?
            .send_window_open(window_id, window_type, title, num_slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{read_string16, write_string16, write_varint};
    use crate::protocol::{ByteSink, ServerStatus};
    use crate::registry::versions;
    use bytes::{Buf, BufMut};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockSink {
        written: Mutex<Vec<u8>>,
        closed: AtomicBool,
    }

    impl ByteSink for MockSink {
        fn send_raw(&self, data: &[u8]) -> Result<()> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl MockSink {
        fn written(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
        /// Decode the legacy kick frame written so far.
        fn kick_text(&self) -> String {
            let mut buf = BytesMut::from(&self.written()[..]);
            assert_eq!(buf.get_u8(), 0xFF, "expected a legacy kick frame");
            read_string16(&mut buf, 32767).unwrap()
        }
    }

    struct FixedStatus;

    impl StatusSource for FixedStatus {
        fn status(&self) -> ServerStatus {
            ServerStatus {
                description: "A Quarry Server".into(),
                online_players: 2,
                max_players: 16,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Data(Vec<u8>),
        Chat(String),
        Disconnect(String),
    }

    struct MockProtocol {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Protocol for MockProtocol {
        fn data_received(&mut self, data: &[u8]) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Data(data.to_vec()));
            Ok(())
        }
        fn auth_server_id(&self) -> String {
            "mock-auth".into()
        }
        fn send_chat(&mut self, message: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Chat(message.into()));
            Ok(())
        }
        fn send_disconnect(&mut self, reason: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Disconnect(reason.into()));
            Ok(())
        }

        // The remaining sends are uninteresting to these tests.
        fn send_block_action(&mut self, _: BlockPos, _: i8, _: i8, _: u8) -> Result<()> {
            Ok(())
        }
        fn send_block_break_anim(&mut self, _: i32, _: BlockPos, _: i8) -> Result<()> {
            Ok(())
        }
        fn send_block_change(&mut self, _: BlockPos, _: u8, _: u8) -> Result<()> {
            Ok(())
        }
        fn send_block_changes(&mut self, _: ChunkPos, _: &[BlockChange]) -> Result<()> {
            Ok(())
        }
        fn send_chunk_data(&mut self, _: ChunkPos, _: &ChunkData) -> Result<()> {
            Ok(())
        }
        fn send_collect_pickup(&mut self, _: i32, _: i32) -> Result<()> {
            Ok(())
        }
        fn send_destroy_entity(&mut self, _: i32) -> Result<()> {
            Ok(())
        }
        fn send_entity_equipment(&mut self, _: i32, _: i16, _: Option<ItemStack>) -> Result<()> {
            Ok(())
        }
        fn send_entity_head_look(&mut self, _: i32, _: i8) -> Result<()> {
            Ok(())
        }
        fn send_entity_look(&mut self, _: i32, _: i8, _: i8) -> Result<()> {
            Ok(())
        }
        fn send_entity_rel_move(&mut self, _: i32, _: i8, _: i8, _: i8) -> Result<()> {
            Ok(())
        }
        fn send_entity_rel_move_look(
            &mut self,
            _: i32,
            _: i8,
            _: i8,
            _: i8,
            _: i8,
            _: i8,
        ) -> Result<()> {
            Ok(())
        }
        fn send_entity_status(&mut self, _: i32, _: i8) -> Result<()> {
            Ok(())
        }
        fn send_game_mode(&mut self, _: GameMode) -> Result<()> {
            Ok(())
        }
        fn send_health(&mut self, _: i16, _: i16, _: f32) -> Result<()> {
            Ok(())
        }
        fn send_inventory_progress(&mut self, _: i8, _: i16, _: i16) -> Result<()> {
            Ok(())
        }
        fn send_inventory_slot(&mut self, _: i8, _: i16, _: Option<ItemStack>) -> Result<()> {
            Ok(())
        }
        fn send_keep_alive(&mut self, _: i32) -> Result<()> {
            Ok(())
        }
        fn send_login(&mut self, _: &LoginInfo) -> Result<()> {
            Ok(())
        }
        fn send_metadata(&mut self, _: i32, _: &[MetadataEntry]) -> Result<()> {
            Ok(())
        }
        fn send_pickup_spawn(&mut self, _: &PickupSpawn) -> Result<()> {
            Ok(())
        }
        fn send_player_animation(&mut self, _: i32, _: i8) -> Result<()> {
            Ok(())
        }
        fn send_player_list_item(&mut self, _: &str, _: bool, _: i16) -> Result<()> {
            Ok(())
        }
        fn send_player_move_look(&mut self, _: Vec3d, _: f32, _: f32, _: bool) -> Result<()> {
            Ok(())
        }
        fn send_player_position(&mut self, _: Vec3d, _: bool) -> Result<()> {
            Ok(())
        }
        fn send_player_spawn(&mut self, _: &PlayerSpawn) -> Result<()> {
            Ok(())
        }
        fn send_respawn(&mut self, _: i8, _: i8, _: GameMode, _: u8) -> Result<()> {
            Ok(())
        }
        fn send_sound_effect(
            &mut self,
            _: &str,
            _: i32,
            _: i32,
            _: i32,
            _: f32,
            _: f32,
        ) -> Result<()> {
            Ok(())
        }
        fn send_sound_particle_effect(&mut self, _: i32, _: BlockPos, _: i32) -> Result<()> {
            Ok(())
        }
        fn send_spawn_falling_block(&mut self, _: i32, _: u8, _: Vec3d) -> Result<()> {
            Ok(())
        }
        fn send_spawn_mob(&mut self, _: &MobSpawn) -> Result<()> {
            Ok(())
        }
        fn send_spawn_object(&mut self, _: &ObjectSpawn) -> Result<()> {
            Ok(())
        }
        fn send_spawn_vehicle(&mut self, _: i32, _: i8, _: Vec3d) -> Result<()> {
            Ok(())
        }
        fn send_teleport_entity(&mut self, _: i32, _: Vec3d, _: i8, _: i8) -> Result<()> {
            Ok(())
        }
        fn send_thunderbolt(&mut self, _: BlockPos) -> Result<()> {
            Ok(())
        }
        fn send_time_update(&mut self, _: i64, _: i64) -> Result<()> {
            Ok(())
        }
        fn send_unload_chunk(&mut self, _: ChunkPos) -> Result<()> {
            Ok(())
        }
        fn send_update_sign(&mut self, _: BlockPos, _: &[String; 4]) -> Result<()> {
            Ok(())
        }
        fn send_use_bed(&mut self, _: i32, _: BlockPos) -> Result<()> {
            Ok(())
        }
        fn send_weather(&mut self, _: Weather) -> Result<()> {
            Ok(())
        }
        fn send_whole_inventory(&mut self, _: i8, _: &[Option<ItemStack>]) -> Result<()> {
            Ok(())
        }
        fn send_window_close(&mut self, _: i8) -> Result<()> {
            Ok(())
        }
        fn send_window_open(&mut self, _: i8, _: i8, _: &str, _: i8) -> Result<()> {
            Ok(())
        }
    }

    const SUPPORTED: [(i32, &str); 5] = [
        (versions::V1_2_5, "1.2.4/1.2.5"),
        (versions::V1_3_2, "1.3.1/1.3.2"),
        (versions::V1_4_2, "1.4.2"),
        (versions::V1_4_5, "1.4.4/1.4.5/1.4.6"),
        (versions::V1_4_7, "1.4.7"),
    ];

    struct Harness {
        recognizer: Recognizer,
        sink: Arc<MockSink>,
        registry: Arc<VersionRegistry>,
        calls: Arc<Mutex<Vec<Call>>>,
        created: Arc<Mutex<Vec<i32>>>,
    }

    fn harness() -> Harness {
        let sink = Arc::new(MockSink::default());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let created = Arc::new(Mutex::new(Vec::new()));

        let mut registry = VersionRegistry::new();
        for (version, text) in SUPPORTED {
            let calls = Arc::clone(&calls);
            let created = Arc::clone(&created);
            registry = registry.register(version, text, move |v, _sink| {
                created.lock().unwrap().push(v);
                Box::new(MockProtocol {
                    calls: Arc::clone(&calls),
                }) as Box<dyn Protocol>
            });
        }
        let registry = Arc::new(registry);

        let recognizer = Recognizer::new(
            sink.clone(),
            Arc::clone(&registry),
            Arc::new(FixedStatus),
        );
        Harness {
            recognizer,
            sink,
            registry,
            calls,
            created,
        }
    }

    fn handshake_bytes(version: i32) -> Vec<u8> {
        let mut body = BytesMut::new();
        write_varint(&mut body, 0x00);
        write_varint(&mut body, version);
        write_string16(&mut body, "TestPlayer");
        write_string16(&mut body, "localhost");
        body.put_u16(25565);
        let mut frame = BytesMut::new();
        write_varint(&mut frame, body.len() as i32);
        frame.extend_from_slice(&body);
        frame.to_vec()
    }

    /// All decoder-bound bytes, in arrival order, across every
    /// `data_received` forward.
    fn forwarded_bytes(calls: &Arc<Mutex<Vec<Call>>>) -> Vec<u8> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Data(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_recognizes_each_supported_version() {
        for (version, text) in SUPPORTED {
            let mut h = harness();
            let bytes = handshake_bytes(version);
            h.recognizer.data_received(&bytes).unwrap();

            assert!(h.recognizer.is_bound(), "version {} not bound", version);
            assert_eq!(*h.created.lock().unwrap(), vec![version]);
            // The decoder gets the whole buffered sequence, handshake included.
            assert_eq!(forwarded_bytes(&h.calls), bytes);
            assert_eq!(h.registry.version_text(version), text);
        }
    }

    #[test]
    fn test_chat_forwarded_after_selection() {
        let mut h = harness();
        h.recognizer
            .data_received(&handshake_bytes(versions::V1_4_2))
            .unwrap();
        h.recognizer.send_chat("hi").unwrap();
        assert_eq!(
            h.calls.lock().unwrap().last(),
            Some(&Call::Chat("hi".into()))
        );
    }

    #[test]
    fn test_unsupported_version_is_kicked() {
        let mut h = harness();
        h.recognizer.data_received(&handshake_bytes(999)).unwrap();

        assert!(!h.recognizer.is_bound());
        assert!(h.recognizer.is_closed());
        assert!(h.created.lock().unwrap().is_empty());
        assert!(h.sink.is_closed());
        let text = h.sink.kick_text();
        assert!(text.contains("999"), "kick text was {:?}", text);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let bytes = handshake_bytes(versions::V1_4_7);
        for chunk_size in 1..=bytes.len() {
            let mut h = harness();
            for chunk in bytes.chunks(chunk_size) {
                h.recognizer.data_received(chunk).unwrap();
            }
            assert!(h.recognizer.is_bound(), "chunk size {} failed", chunk_size);
            assert_eq!(*h.created.lock().unwrap(), vec![versions::V1_4_7]);
            // Reassembled, the decoder saw exactly the original sequence.
            assert_eq!(forwarded_bytes(&h.calls), bytes);
        }
    }

    #[test]
    fn test_selection_is_permanent() {
        let mut h = harness();
        h.recognizer
            .data_received(&handshake_bytes(versions::V1_4_2))
            .unwrap();
        // Another handshake for a different version is just payload now.
        h.recognizer
            .data_received(&handshake_bytes(versions::V1_2_5))
            .unwrap();
        h.recognizer.data_received(&[0xAB, 0xCD]).unwrap();

        assert_eq!(*h.created.lock().unwrap(), vec![versions::V1_4_2]);
        let forwarded = forwarded_bytes(&h.calls);
        assert!(forwarded.ends_with(&[0xAB, 0xCD]));
    }

    #[test]
    fn test_legacy_ping_one_shot() {
        let mut h = harness();
        // Scenario C: the lone marker byte must not force a decision.
        h.recognizer.data_received(&[0xFE]).unwrap();
        assert!(!h.recognizer.is_bound());
        assert!(!h.recognizer.is_closed());
        assert!(h.sink.written().is_empty());

        h.recognizer.data_received(&[0x01]).unwrap();
        assert!(!h.recognizer.is_bound());
        assert!(h.recognizer.is_closed());
        assert!(h.sink.is_closed());
        assert!(h.created.lock().unwrap().is_empty());
        assert_eq!(h.sink.kick_text(), "A Quarry Server|2|16");
    }

    #[test]
    fn test_legacy_ping_with_plugin_payload() {
        let mut blob = BytesMut::new();
        blob.put_slice(&[0xFE, 0x01, 0xFA]);
        write_string16(&mut blob, "MC|PingHost");
        blob.put_u16(5);
        blob.put_slice(&[0x33, 0x00, 0x04, 0x00, 0x68]);

        let mut h = harness();
        h.recognizer.data_received(&blob[..3]).unwrap();
        assert!(!h.recognizer.is_closed());
        h.recognizer.data_received(&blob[3..]).unwrap();
        assert!(h.recognizer.is_closed());
        assert_eq!(h.sink.kick_text(), "A Quarry Server|2|16");
    }

    #[test]
    fn test_legacy_marker_then_garbage_drops_silently() {
        let mut h = harness();
        h.recognizer.data_received(&[0xFE, 0x6B]).unwrap();
        assert!(h.recognizer.is_closed());
        assert!(h.sink.is_closed());
        assert!(h.sink.written().is_empty());
    }

    #[test]
    fn test_malformed_first_packet_is_kicked() {
        // A structurally valid frame whose ID is not the handshake.
        let mut frame = BytesMut::new();
        write_varint(&mut frame, 3);
        write_varint(&mut frame, 0x05);
        frame.put_u16(0);

        let mut h = harness();
        h.recognizer.data_received(&frame).unwrap();
        assert!(h.recognizer.is_closed());
        assert!(h.sink.is_closed());
        assert!(h.created.lock().unwrap().is_empty());
        assert_eq!(h.sink.kick_text(), "Protocol error");
    }

    #[test]
    fn test_pending_limit_cuts_never_ending_opening() {
        let mut h = harness();
        let mut blob = vec![0xFE, 0x01, 0xFA, 0xFF, 0xFF];
        blob.extend_from_slice(&[0u8; 1100]);
        h.recognizer.data_received(&blob).unwrap();
        assert!(h.recognizer.is_closed());
        assert!(h.sink.is_closed());
        assert_eq!(h.sink.kick_text(), "Protocol error");
    }

    #[test]
    fn test_sends_before_selection() {
        let mut h = harness();
        assert!(h.recognizer.send_chat("too early").is_err());
        assert_eq!(h.recognizer.auth_server_id(), "");

        // Disconnect works without a decoder: old-style kick on the wire.
        h.recognizer.send_disconnect("server shutting down").unwrap();
        assert_eq!(h.sink.kick_text(), "server shutting down");
        assert!(h.sink.is_closed());
        assert!(h.recognizer.is_closed());
    }

    #[test]
    fn test_auth_server_id_forwarded_once_bound() {
        let mut h = harness();
        h.recognizer
            .data_received(&handshake_bytes(versions::V1_3_2))
            .unwrap();
        assert_eq!(h.recognizer.auth_server_id(), "mock-auth");
    }

    #[test]
    fn test_raw_send_data_bypasses_everything() {
        let h = harness();
        h.recognizer.send_data(&[1, 2, 3]).unwrap();
        assert_eq!(h.sink.written(), vec![1, 2, 3]);
        assert!(!h.sink.is_closed());
    }
}
