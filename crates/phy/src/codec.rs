//! Burst to bit stream conversion.
//!
//! Packets are laid out back to back, each byte MSB first. Nothing separates
//! packets on the wire; the receiver finds boundaries from the headers.

use bytes::Bytes;
use log::trace;
use wran_core::burst::{generic_length, CONTROL_PACKET_SIZE};
use wran_core::{Burst, HeaderType, Packet};

use crate::PhyError;

pub type BitVec = Vec<bool>;

pub fn serialize_burst(burst: &Burst) -> BitVec {
    let mut bits = Vec::with_capacity(burst.size() * 8);
    for packet in burst.packets() {
        for &byte in packet.as_bytes() {
            bits.extend((0..8).map(|l| (byte >> (7 - l)) & 0x01 == 1));
        }
    }
    bits
}

pub fn bits_to_bytes(bits: &[bool]) -> Result<Bytes, PhyError> {
    if bits.len() % 8 != 0 {
        return Err(PhyError::UnalignedBits(bits.len()));
    }
    let bytes: Vec<u8> = bits
        .chunks_exact(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | bit as u8))
        .collect();
    Ok(Bytes::from(bytes))
}

pub fn deserialize_burst(bits: &[bool]) -> Result<Burst, PhyError> {
    let buffer = bits_to_bytes(bits)?;
    let len = buffer.len();
    let mut burst = Burst::new();
    let mut pos = 0;

    while pos < len {
        let size = match HeaderType::of(buffer[pos]) {
            HeaderType::Control => CONTROL_PACKET_SIZE,
            HeaderType::Generic => {
                if pos + 3 > len {
                    if buffer[pos..].iter().all(|&b| b == 0) {
                        break;
                    }
                    return Err(PhyError::Truncated {
                        offset: pos,
                        needed: 3,
                        available: len - pos,
                    });
                }
                let size = generic_length(buffer[pos + 1], buffer[pos + 2]);
                if size == 0 {
                    trace!("padding reached at byte {}, {} bytes discarded", pos, len - pos);
                    break;
                }
                size
            }
        };
        if pos + size > len {
            return Err(PhyError::Truncated {
                offset: pos,
                needed: size,
                available: len - pos,
            });
        }
        let packet = Packet::new(buffer.slice(pos..pos + size))
            .map_err(|reason| PhyError::MalformedPacket { offset: pos, reason })?;
        burst.add_packet(packet);
        pos += size;
    }

    Ok(burst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_burst() -> Burst {
        vec![
            Packet::generic(0x0101, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap(),
            Packet::bandwidth_request(0x0202, 512),
            Packet::generic(0x0303, &[0x55; 40]).unwrap(),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn serialize_is_msb_first() {
        let burst: Burst = std::iter::once(Packet::new(vec![0x00u8, 0x00, 0x04, 0xA1]).unwrap()).collect();
        let bits = serialize_burst(&burst);
        assert_eq!(bits.len(), 32);
        let last: Vec<u8> = bits[24..].iter().map(|&b| b as u8).collect();
        assert_eq!(last, vec![1, 0, 1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn round_trip_preserves_packet_boundaries() {
        let burst = sample_burst();
        let bits = serialize_burst(&burst);
        assert_eq!(bits.len(), burst.size() * 8);
        assert_eq!(deserialize_burst(&bits).unwrap(), burst);
    }

    #[test]
    fn zero_padding_terminates_the_scan() {
        let burst = sample_burst();
        let mut bits = serialize_burst(&burst);
        bits.extend(std::iter::repeat(false).take(160));
        assert_eq!(deserialize_burst(&bits).unwrap(), burst);

        // a short zero tail is still padding
        let mut bits = serialize_burst(&burst);
        bits.extend(std::iter::repeat(false).take(16));
        assert_eq!(deserialize_burst(&bits).unwrap(), burst);
    }

    #[test]
    fn declared_length_past_the_end_is_an_error() {
        let bits = serialize_burst(&sample_burst());
        let cut = &bits[..bits.len() - 8];
        match deserialize_burst(cut) {
            Err(PhyError::Truncated { offset, needed, available }) => {
                assert_eq!(offset, 16);
                assert_eq!(needed, 46);
                assert_eq!(available, 45);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn unaligned_bits_are_rejected() {
        assert!(matches!(
            deserialize_burst(&[true, false, true]),
            Err(PhyError::UnalignedBits(3))
        ));
    }

    #[test]
    fn undersized_generic_length_is_malformed() {
        let bits = serialize_burst(&sample_burst());
        let mut bytes = bits_to_bytes(&bits).unwrap().to_vec();
        bytes[2] = 0x02;
        let bits: Vec<bool> = bytes
            .iter()
            .flat_map(|&byte| (0..8).map(move |l| (byte >> (7 - l)) & 1 == 1))
            .collect();
        assert!(matches!(
            deserialize_burst(&bits),
            Err(PhyError::MalformedPacket { offset: 0, .. })
        ));
    }

    fn packet_strategy() -> impl Strategy<Value = Packet> {
        prop_oneof![
            (any::<u16>(), 0u32..0x7_FFFF).prop_map(|(cid, br)| Packet::bandwidth_request(cid, br)),
            (any::<u16>(), proptest::collection::vec(any::<u8>(), 0..200))
                .prop_map(|(cid, payload)| Packet::generic(cid, &payload).unwrap()),
        ]
    }

    proptest! {
        #[test]
        fn any_well_formed_burst_round_trips(packets in proptest::collection::vec(packet_strategy(), 1..12)) {
            let burst: Burst = packets.into_iter().collect();
            let bits = serialize_burst(&burst);
            prop_assert_eq!(deserialize_burst(&bits).unwrap(), burst);
        }
    }
}
