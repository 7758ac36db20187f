//! MAC packets and the bursts that carry them over the air.
//!
//! A packet starts with one of two header shapes. A header with the top bit
//! of the first byte set is a fixed 6-byte control header (bandwidth
//! request). Otherwise it is a generic header whose 11-bit length field is
//! split across the low three bits of byte 1 and all of byte 2; the length
//! covers the whole packet, header included.

use bytes::{BufMut, Bytes, BytesMut};

use crate::CoreError;

pub const HEADER_SIZE: usize = 6;
pub const CONTROL_PACKET_SIZE: usize = HEADER_SIZE;
pub const MAX_PACKET_SIZE: usize = 0x07FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    /// Fixed-size bandwidth request header, no payload.
    Control,
    /// Length-prefixed generic header followed by payload.
    Generic,
}

impl HeaderType {
    pub fn of(first_byte: u8) -> Self {
        if first_byte & 0x80 != 0 {
            HeaderType::Control
        } else {
            HeaderType::Generic
        }
    }
}

/// Reads the 11-bit length field of a generic header.
pub fn generic_length(byte1: u8, byte2: u8) -> usize {
    (((byte1 & 0x07) as usize) << 8) | byte2 as usize
}

/// CRC-8 (x^8 + x^2 + x + 1) over the first five header bytes.
fn header_check_sequence(header: &[u8]) -> u8 {
    header.iter().fold(0u8, |mut crc, &byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
        crc
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Bytes,
}

impl Packet {
    /// Wraps raw packet bytes, checking that they form one of the two
    /// header shapes.
    pub fn new(data: impl Into<Bytes>) -> Result<Self, CoreError> {
        let data = data.into();
        let first = *data.first().ok_or(CoreError::PacketTooShort(0))?;
        match HeaderType::of(first) {
            HeaderType::Control => {
                if data.len() != CONTROL_PACKET_SIZE {
                    return Err(CoreError::HeaderMismatch);
                }
            }
            HeaderType::Generic => {
                if data.len() < 3 {
                    return Err(CoreError::PacketTooShort(data.len()));
                }
                if data.len() > MAX_PACKET_SIZE {
                    return Err(CoreError::PacketTooLarge(data.len()));
                }
                if generic_length(data[1], data[2]) != data.len() {
                    return Err(CoreError::HeaderMismatch);
                }
            }
        }
        Ok(Self { data })
    }

    /// Builds a packet with a generic header for connection `cid`.
    pub fn generic(cid: u16, payload: &[u8]) -> Result<Self, CoreError> {
        let len = HEADER_SIZE + payload.len();
        if len > MAX_PACKET_SIZE {
            return Err(CoreError::PacketTooLarge(len));
        }
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u8(0x00);
        buf.put_u8(((len >> 8) & 0x07) as u8);
        buf.put_u8((len & 0xFF) as u8);
        buf.put_u16(cid);
        let hcs = header_check_sequence(&buf[..5]);
        buf.put_u8(hcs);
        buf.put_slice(payload);
        Ok(Self { data: buf.freeze() })
    }

    /// Builds a bandwidth request control packet asking for `bytes_requested`
    /// (19-bit field) on connection `cid`.
    pub fn bandwidth_request(cid: u16, bytes_requested: u32) -> Self {
        let br = bytes_requested & 0x7_FFFF;
        let mut buf = BytesMut::with_capacity(CONTROL_PACKET_SIZE);
        buf.put_u8(0x80 | ((br >> 16) & 0x07) as u8);
        buf.put_u8(((br >> 8) & 0xFF) as u8);
        buf.put_u8((br & 0xFF) as u8);
        buf.put_u16(cid);
        let hcs = header_check_sequence(&buf[..5]);
        buf.put_u8(hcs);
        Self { data: buf.freeze() }
    }

    pub fn header_type(&self) -> HeaderType {
        HeaderType::of(self.data[0])
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn cid(&self) -> Option<u16> {
        if self.data.len() < HEADER_SIZE {
            return None;
        }
        Some(u16::from_be_bytes([self.data[3], self.data[4]]))
    }

    pub fn payload(&self) -> &[u8] {
        match self.header_type() {
            HeaderType::Control => &[],
            HeaderType::Generic => self.data.get(HEADER_SIZE..).unwrap_or(&[]),
        }
    }

    pub fn header_check_ok(&self) -> bool {
        self.data.len() >= HEADER_SIZE
            && header_check_sequence(&self.data[..5]) == self.data[5]
    }
}

/// Ordered group of packets sent as one physical-layer unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Burst {
    packets: Vec<Packet>,
}

impl Burst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_packet(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn nr_packets(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Total size in bytes of all packets.
    pub fn size(&self) -> usize {
        self.packets.iter().map(Packet::size).sum()
    }
}

impl FromIterator<Packet> for Burst {
    fn from_iter<I: IntoIterator<Item = Packet>>(iter: I) -> Self {
        Self {
            packets: iter.into_iter().collect(),
        }
    }
}
