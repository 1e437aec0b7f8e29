//! The two checksum layers of the Hoymiles wire format.
//!
//! Every on-air fragment ends in a CRC-8 trailer computed over all preceding bytes. The logical
//! payload reassembled from the fragments ends in a Modbus CRC-16 trailer, stored big-endian.
//! Both have to pass before a payload reaches a decoder.

/// Computes the per-fragment CRC-8 (generator `0x101`, init 0, no xor-out).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;

    for byte in data {
        crc ^= *byte;

        for _ in 0..8 {
            let msb = crc & 0x80 != 0;
            crc <<= 1;

            if msb {
                crc ^= 0x01;
            }
        }
    }

    crc
}

/// Computes the Modbus CRC-16 (reflected polynomial `0xA001`, init `0xFFFF`, no xor-out) used as
/// the logical payload trailer.
///
/// Note that the trailer is stored *big-endian* on the wire, unlike in Modbus proper.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;

    for byte in data {
        crc ^= u16::from(*byte);

        for _ in 0..8 {
            let lsb = crc & 1 != 0;
            crc >>= 1;

            if lsb {
                crc ^= 0xA001;
            }
        }
    }

    crc
}
