//! Serial numbers and on-air addresses.
//!
//! Hoymiles devices address each other with 4 bytes derived from their decimal serial number: the
//! last 8 decimal digits, packed one digit per hex nibble (BCD-style), big-endian. The 5-byte
//! Enhanced ShockBurst pipe address is the same 4 bytes prefixed with `0x01` (the nRF24 library
//! expects pipe addresses LSB first, and the air order is the BCD bytes reversed followed by
//! `0x01`; reversing that again yields the prefixed form).

use crate::utils::HexSlice;
use crate::Error;
use core::fmt;

/// A decimal Hoymiles serial number, as printed on the device label.
///
/// Serials are 12 decimal digits; the first four identify the model family, the last eight are
/// unique per device and form its on-air address.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Serial(u64);

impl Serial {
    /// Creates a `Serial` from its decimal value.
    pub fn new(ser: u64) -> Self {
        Serial(ser)
    }

    /// Returns the decimal value of this serial.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Derives the 4-byte address the devices use in their internal messages.
    ///
    /// The last 8 decimal digits are packed one digit per nibble: serial `…72220143` becomes
    /// `[0x72, 0x22, 0x01, 0x43]`.
    pub fn hm_addr(&self) -> HmAddr {
        let mut tail = self.0 % 100_000_000;
        let mut bcd = 0u32;
        let mut shift = 0;

        while shift < 32 {
            bcd |= ((tail % 10) as u32) << shift;
            tail /= 10;
            shift += 4;
        }

        HmAddr(bcd.to_be_bytes())
    }

    /// Derives the 5-byte Enhanced ShockBurst pipe address for this serial.
    pub fn esb_addr(&self) -> EsbAddr {
        self.hm_addr().esb_addr()
    }

    /// Classifies the model family from the decimal serial prefix.
    ///
    /// `1121…` is HM-300, `1141…` is HM-600, `1161…` is HM-1200. Any other prefix (or a serial
    /// shorter than the full 12 digits) fails with `UnknownModel`.
    pub fn family(&self) -> Result<InverterModel, Error> {
        if self.0 < 100_000_000_000 {
            return Err(Error::UnknownModel);
        }

        let mut prefix = self.0;
        while prefix >= 10_000 {
            prefix /= 10;
        }

        match prefix {
            1121 => Ok(InverterModel::Hm300),
            1141 => Ok(InverterModel::Hm600),
            1161 => Ok(InverterModel::Hm1200),
            _ => Err(Error::UnknownModel),
        }
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ser#{}", self.0)
    }
}

/// The 4-byte address carried in frame headers, big-endian.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct HmAddr([u8; 4]);

impl HmAddr {
    /// Creates an address from its raw big-endian bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        HmAddr(bytes)
    }

    /// Creates an address from its `u32` representation.
    pub fn from_u32(word: u32) -> Self {
        HmAddr(word.to_be_bytes())
    }

    /// Returns the raw bytes in wire order.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Returns the address as a `u32` (big-endian interpretation), the form used to filter
    /// received fragments.
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Derives the 5-byte Enhanced ShockBurst pipe address (`0x01` followed by the address
    /// bytes).
    pub fn esb_addr(&self) -> EsbAddr {
        let mut esb = [0x01; 5];
        esb[1..].copy_from_slice(&self.0);
        EsbAddr(esb)
    }
}

impl fmt::Debug for HmAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HM {:?}", HexSlice(self.0))
    }
}

/// A 5-byte Enhanced ShockBurst pipe address.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct EsbAddr([u8; 5]);

impl EsbAddr {
    /// Creates a pipe address from its raw bytes (register interface order).
    pub fn from_bytes(bytes: [u8; 5]) -> Self {
        EsbAddr(bytes)
    }

    /// Returns the raw pipe address bytes, in the order the nRF24 register interface expects
    /// them.
    pub fn as_bytes(&self) -> &[u8; 5] {
        &self.0
    }
}

impl fmt::Debug for EsbAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ESB {:?}", HexSlice(self.0))
    }
}

/// The micro-inverter families this driver can decode.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InverterModel {
    /// 1121-series, 1 MPPT string, 1 AC phase.
    Hm300,
    /// 1141-series, 2 MPPT strings, 1 AC phase.
    Hm600,
    /// 1161-series, 4 MPPT strings, 1 AC phase.
    Hm1200,
}
