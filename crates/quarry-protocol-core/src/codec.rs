use bytes::{Buf, BufMut, BytesMut};
use quarry_types::ItemStack;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("VarInt too big")]
    VarIntTooBig,
    #[error("Not enough data")]
    NotEnoughData,
    #[error("String too long: {0} > {1}")]
    StringTooLong(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Read a VarInt from the buffer.
pub fn read_varint(buf: &mut BytesMut) -> CodecResult<i32> {
    let mut result: i32 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::NotEnoughData);
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 32 {
            return Err(CodecError::VarIntTooBig);
        }
    }
}

/// Write a VarInt to the buffer.
pub fn write_varint(buf: &mut BytesMut, mut value: i32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Calculate the byte length of a VarInt.
pub fn varint_len(value: i32) -> usize {
    let mut val = value as u32;
    let mut len = 0;
    loop {
        len += 1;
        val >>= 7;
        if val == 0 {
            break;
        }
    }
    len
}

/// Read a UCS-2 protocol string (u16 length in code units, then UTF-16BE).
pub fn read_string16(buf: &mut BytesMut, max_len: usize) -> CodecResult<String> {
    if buf.remaining() < 2 {
        return Err(CodecError::NotEnoughData);
    }
    let len = buf.get_u16() as usize;
    if len > max_len {
        return Err(CodecError::StringTooLong(len, max_len));
    }
    if buf.remaining() < len * 2 {
        return Err(CodecError::NotEnoughData);
    }
    let mut units = Vec::with_capacity(len);
    for _ in 0..len {
        units.push(buf.get_u16());
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Write a UCS-2 protocol string.
pub fn write_string16(buf: &mut BytesMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    buf.put_u16(units.len() as u16);
    for unit in units {
        buf.put_u16(unit);
    }
}

/// Read a Slot from the wire. Returns None for empty slots (item ID < 0).
pub fn read_slot(buf: &mut BytesMut) -> CodecResult<Option<ItemStack>> {
    if buf.remaining() < 2 {
        return Err(CodecError::NotEnoughData);
    }
    let id = buf.get_i16();
    if id < 0 {
        return Ok(None);
    }
    if buf.remaining() < 3 {
        return Err(CodecError::NotEnoughData);
    }
    let count = buf.get_i8();
    let damage = buf.get_i16();
    Ok(Some(ItemStack::new(id, count, damage)))
}

/// Write a Slot to the wire. Empty slots are item ID -1.
pub fn write_slot(buf: &mut BytesMut, slot: &Option<ItemStack>) {
    match slot {
        None => buf.put_i16(-1),
        Some(item) => {
            buf.put_i16(item.id);
            buf.put_i8(item.count);
            buf.put_i16(item.damage);
        }
    }
}
