use anyhow::{ensure, Result};
use bytes::{Buf, BytesMut};
use quarry_protocol_core::{read_slot, read_string16, read_varint};
use quarry_types::{BlockPos, ItemStack, Vec3d};

/// Version-independent representation of an inbound packet. The game
/// layer drains these from the decoder; it never sees wire bytes.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Handshake {
        protocol_version: i32,
        username: String,
        server_host: String,
        server_port: u16,
    },
    KeepAlive {
        ping_id: i32,
    },
    Chat {
        message: String,
    },
    PlayerOnGround {
        on_ground: bool,
    },
    PlayerPosition {
        pos: Vec3d,
        stance: f64,
        on_ground: bool,
    },
    PlayerLook {
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    PlayerPositionAndLook {
        pos: Vec3d,
        stance: f64,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    BlockDig {
        status: i8,
        pos: BlockPos,
        face: i8,
    },
    BlockPlace {
        pos: BlockPos,
        face: i8,
        held: Option<ItemStack>,
    },
    HeldItemChange {
        slot: i16,
    },
    Animation {
        entity_id: i32,
        animation: i8,
    },
    Disconnect {
        reason: String,
    },
    /// Unhandled packet — raw bytes preserved for logging.
    Unknown {
        packet_id: i32,
        data: Vec<u8>,
    },
}

// Serverbound packet IDs. 0x00 doubles as handshake (first frame only)
// and keep-alive; the decoder disambiguates by connection phase.
pub(crate) const SB_KEEP_ALIVE: i32 = 0x00;
pub(crate) const SB_CHAT: i32 = 0x03;
pub(crate) const SB_PLAYER_ON_GROUND: i32 = 0x0A;
pub(crate) const SB_PLAYER_POSITION: i32 = 0x0B;
pub(crate) const SB_PLAYER_LOOK: i32 = 0x0C;
pub(crate) const SB_PLAYER_POSITION_LOOK: i32 = 0x0D;
pub(crate) const SB_BLOCK_DIG: i32 = 0x0E;
pub(crate) const SB_BLOCK_PLACE: i32 = 0x0F;
pub(crate) const SB_HELD_ITEM_CHANGE: i32 = 0x10;
pub(crate) const SB_ANIMATION: i32 = 0x12;
pub(crate) const SB_DISCONNECT: i32 = 0xFF;

/// Decode the handshake frame the recognizer handed over.
pub(crate) fn decode_handshake(data: &mut BytesMut) -> Result<InboundEvent> {
    let protocol_version = read_varint(data)?;
    let username = read_string16(data, 16)?;
    let server_host = read_string16(data, 255)?;
    ensure!(data.remaining() >= 2, "handshake truncated");
    let server_port = data.get_u16();
    Ok(InboundEvent::Handshake {
        protocol_version,
        username,
        server_host,
        server_port,
    })
}

/// Decode a post-handshake frame into an event.
pub(crate) fn decode_packet(id: i32, data: &mut BytesMut) -> Result<InboundEvent> {
    match id {
        SB_KEEP_ALIVE => {
            ensure!(data.remaining() >= 4, "keep-alive truncated");
            Ok(InboundEvent::KeepAlive {
                ping_id: data.get_i32(),
            })
        }
        SB_CHAT => Ok(InboundEvent::Chat {
            message: read_string16(data, 119)?,
        }),
        SB_PLAYER_ON_GROUND => {
            ensure!(data.remaining() >= 1, "flying packet truncated");
            Ok(InboundEvent::PlayerOnGround {
                on_ground: data.get_u8() != 0,
            })
        }
        SB_PLAYER_POSITION => {
            ensure!(data.remaining() >= 33, "position packet truncated");
            let x = data.get_f64();
            let y = data.get_f64();
            let stance = data.get_f64();
            let z = data.get_f64();
            Ok(InboundEvent::PlayerPosition {
                pos: Vec3d::new(x, y, z),
                stance,
                on_ground: data.get_u8() != 0,
            })
        }
        SB_PLAYER_LOOK => {
            ensure!(data.remaining() >= 9, "look packet truncated");
            Ok(InboundEvent::PlayerLook {
                yaw: data.get_f32(),
                pitch: data.get_f32(),
                on_ground: data.get_u8() != 0,
            })
        }
        SB_PLAYER_POSITION_LOOK => {
            ensure!(data.remaining() >= 41, "position+look packet truncated");
            let x = data.get_f64();
            let y = data.get_f64();
            let stance = data.get_f64();
            let z = data.get_f64();
            Ok(InboundEvent::PlayerPositionAndLook {
                pos: Vec3d::new(x, y, z),
                stance,
                yaw: data.get_f32(),
                pitch: data.get_f32(),
                on_ground: data.get_u8() != 0,
            })
        }
        SB_BLOCK_DIG => {
            ensure!(data.remaining() >= 11, "dig packet truncated");
            let status = data.get_i8();
            let x = data.get_i32();
            let y = data.get_i8() as i32;
            let z = data.get_i32();
            Ok(InboundEvent::BlockDig {
                status,
                pos: BlockPos::new(x, y, z),
                face: data.get_i8(),
            })
        }
        SB_BLOCK_PLACE => {
            ensure!(data.remaining() >= 10, "place packet truncated");
            let x = data.get_i32();
            let y = data.get_i8() as i32;
            let z = data.get_i32();
            let face = data.get_i8();
            Ok(InboundEvent::BlockPlace {
                pos: BlockPos::new(x, y, z),
                face,
                held: read_slot(data)?,
            })
        }
        SB_HELD_ITEM_CHANGE => {
            ensure!(data.remaining() >= 2, "held-item packet truncated");
            Ok(InboundEvent::HeldItemChange {
                slot: data.get_i16(),
            })
        }
        SB_ANIMATION => {
            ensure!(data.remaining() >= 5, "animation packet truncated");
            Ok(InboundEvent::Animation {
                entity_id: data.get_i32(),
                animation: data.get_i8(),
            })
        }
        SB_DISCONNECT => Ok(InboundEvent::Disconnect {
            reason: read_string16(data, 240)?,
        }),
        _ => Ok(InboundEvent::Unknown {
            packet_id: id,
            data: data.to_vec(),
        }),
    }
}
