//! Legacy server-list ping: the pre-handshake status query older clients
//! send. No outer framing — a marker byte, a follow byte, and optionally a
//! plugin-message-style blob naming the host/port the client dialed (which
//! this layer skips without interpreting).

use crate::buffer::{Lookahead, PendingBuffer};
use crate::codec::write_string16;
use crate::protocol::ServerStatus;
use bytes::{BufMut, BytesMut};

/// First byte of a legacy ping. Checked before framed parsing because the
/// framed format would misread it as a (nonsensical) packet length.
pub const PING_MARKER: u8 = 0xFE;

/// Second byte of a legacy ping.
const PING_FOLLOW: u8 = 0x01;

/// Opcode of the optional trailing plugin-message blob.
const PLUGIN_MESSAGE: u8 = 0xFA;

/// Opcode of the legacy kick packet; also carries the ping reply.
const KICK: u8 = 0xFF;

/// Outcome of one attempt at reading a legacy ping from buffered bytes.
/// `Incomplete` leaves the buffer untouched for the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingParse {
    Incomplete,
    /// A complete status request; reply and close.
    Ping,
    /// The marker was followed by bytes that are not a valid ping.
    Malformed,
}

/// Non-destructively parse a legacy ping starting at offset 0. The caller
/// has already established that byte 0 is the marker.
pub fn parse_ping(buf: &PendingBuffer) -> PingParse {
    match buf.peek_byte(1) {
        Lookahead::Incomplete => return PingParse::Incomplete,
        Lookahead::Ready(PING_FOLLOW) => {}
        Lookahead::Ready(_) => return PingParse::Malformed,
    }
    match buf.peek_byte(2) {
        // Nothing after the follow byte: the bare two-byte ping.
        Lookahead::Incomplete => PingParse::Ping,
        Lookahead::Ready(PLUGIN_MESSAGE) => parse_plugin_payload(buf),
        Lookahead::Ready(_) => PingParse::Malformed,
    }
}

/// Skip over the `0xFA` host/port blob: u16 channel length in code units,
/// UTF-16 channel name, u16 payload length, payload. Content is ignored;
/// only structural completeness matters before the reply goes out.
fn parse_plugin_payload(buf: &PendingBuffer) -> PingParse {
    let channel_units = match buf.peek_u16(3) {
        Lookahead::Ready(n) => n as usize,
        Lookahead::Incomplete => return PingParse::Incomplete,
    };
    let payload_at = 5 + channel_units * 2;
    let payload_len = match buf.peek_u16(payload_at) {
        Lookahead::Ready(n) => n as usize,
        Lookahead::Incomplete => return PingParse::Incomplete,
    };
    if buf.len() < payload_at + 2 + payload_len {
        return PingParse::Incomplete;
    }
    PingParse::Ping
}

/// Build the pipe-delimited status text legacy clients expect:
/// description, online count, max count.
pub fn build_ping_reply(status: &ServerStatus) -> String {
    format!(
        "{}|{}|{}",
        status.description, status.online_players, status.max_players
    )
}

/// Write a legacy kick packet: the one pre-framing message every client
/// generation understands. Used for the ping reply and for kicking clients
/// no decoder exists for.
pub fn write_kick(buf: &mut BytesMut, message: &str) {
    buf.put_u8(KICK);
    write_string16(buf, message);
}
