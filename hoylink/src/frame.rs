//! Enhanced ShockBurst fragment build and parse (the CRC-8 framing layer).
//!
//! An on-air fragment is laid out as
//!
//! ```notrust
//! +----------+-------------+-------------+-----------+-------------+--------+
//! | preamble |   target    |   source    |  sub-cmd  |    data     |  CRC-8 |
//! | (1 byte) |  (4 bytes)  |  (4 bytes)  | (1 byte)  | (0..17 B)   | (1 B)  |
//! +----------+-------------+-------------+-----------+-------------+--------+
//! ```
//!
//! with at most 32 bytes in total (the nRF24L01+ payload ceiling). The preamble is `0x15` on
//! requests and `0x95` on replies, but it is carried verbatim rather than enforced. The CRC-8
//! trailer covers every preceding byte.
//!
//! # Address slot naming
//!
//! Replies swap the address slots relative to requests: the inverter puts its own address into
//! the on-air *target* slot. The accessors on [`Fragment`] are named for the reply direction —
//! [`Fragment::src`] reads bytes 1..5 and is the field the transaction filters its scratch set
//! by. Keep that in mind when inspecting raw request frames with the same accessors.
//!
//! [`Fragment`]: struct.Fragment.html
//! [`Fragment::src`]: struct.Fragment.html#method.src

use crate::addr::HmAddr;
use crate::bytes::ByteWriter;
use crate::crc::crc8;
use crate::time::Instant;
use crate::utils::HexSlice;
use crate::Error;
use byteorder::{BigEndian, ByteOrder};
use core::fmt;
use heapless::{consts::*, Vec};

/// Maximum on-air fragment size in bytes.
pub const MAX_FRAME: usize = 32;

/// Minimum parseable fragment: preamble, two addresses, sub-command byte, CRC-8 trailer.
pub const MIN_FRAME: usize = 11;

/// The raw bytes of one on-air fragment.
pub type Packet = Vec<u8, U32>;

/// Assembles a fragment from its parts and appends the CRC-8 trailer.
///
/// `data` may hold at most 17 bytes (the composer never emits more than 16; 17 covers replayed
/// captures from firmware that chunked one byte wider). The assembled fragment is checked
/// against the 32-byte ceiling.
pub fn build_frame(
    preamble: u8,
    target: HmAddr,
    source: HmAddr,
    subcmd: &[u8],
    data: &[u8],
) -> Result<Packet, Error> {
    if data.len() > 17 {
        return Err(Error::InvalidLength);
    }

    let total = 1 + 4 + 4 + subcmd.len() + data.len() + 1;
    if total > MAX_FRAME {
        return Err(Error::InvalidLength);
    }

    let mut buf = [0u8; MAX_FRAME];
    let mut writer = ByteWriter::new(&mut buf);
    writer.write_u8(preamble)?;
    writer.write_slice(target.as_bytes())?;
    writer.write_slice(source.as_bytes())?;
    writer.write_slice(subcmd)?;
    writer.write_slice(data)?;

    let body = total - 1;
    buf[body] = crc8(&buf[..body]);

    let mut packet = Packet::new();
    packet.extend_from_slice(&buf[..total]).map_err(|_| Error::Eof)?;
    Ok(packet)
}

/// One received (or replayed) on-air fragment, CRC-8 validated, with reception bookkeeping.
#[derive(Clone, PartialEq, Eq)]
pub struct Fragment {
    frame: Packet,
    time_rx: Instant,
    ch_rx: Option<u8>,
    ch_tx: Option<u8>,
}

impl Fragment {
    /// Parses raw payload bytes into a `Fragment`, validating length and the CRC-8 trailer.
    ///
    /// `ch_rx`/`ch_tx` record the channels the fragment arrived on and the request went out on;
    /// they only feed log output.
    pub fn parse(
        bytes: &[u8],
        time_rx: Instant,
        ch_rx: Option<u8>,
        ch_tx: Option<u8>,
    ) -> Result<Self, Error> {
        if bytes.len() < MIN_FRAME || bytes.len() > MAX_FRAME {
            return Err(Error::InvalidLength);
        }

        let (body, trailer) = bytes.split_at(bytes.len() - 1);
        if crc8(body) != trailer[0] {
            return Err(Error::BadFrame);
        }

        let mut frame = Packet::new();
        frame.extend_from_slice(bytes).map_err(|_| Error::Eof)?;
        Ok(Fragment {
            frame,
            time_rx,
            ch_rx,
            ch_tx,
        })
    }

    /// The first byte of the fragment, carried through to the decoders verbatim.
    pub fn main_cmd(&self) -> u8 {
        self.frame[0]
    }

    /// The reply sender's address (bytes 1..5, big-endian).
    ///
    /// On the air this is the *target* slot; replies carry the inverter's own address here, and
    /// reassembly filters by this field.
    pub fn src(&self) -> u32 {
        BigEndian::read_u32(&self.frame[1..5])
    }

    /// The reply receiver's address (bytes 5..9, big-endian).
    pub fn dst(&self) -> u32 {
        BigEndian::read_u32(&self.frame[5..9])
    }

    /// The sequence byte: `0x01..=0x7F` for non-terminal fragments; bit 7 set marks the terminal
    /// fragment, whose low 7 bits carry the total fragment count.
    pub fn seq(&self) -> u8 {
        self.frame[9]
    }

    /// The data region (everything between the sequence byte and the CRC-8 trailer).
    pub fn data(&self) -> &[u8] {
        &self.frame[10..self.frame.len() - 1]
    }

    /// The verbatim on-air bytes, trailer included.
    pub fn raw(&self) -> &[u8] {
        &self.frame
    }

    /// When this fragment was received.
    pub fn time_rx(&self) -> Instant {
        self.time_rx
    }

    /// The channel this fragment was received on, if known.
    pub fn ch_rx(&self) -> Option<u8> {
        self.ch_rx
    }

    /// The channel the request was transmitted on, if known.
    pub fn ch_tx(&self) -> Option<u8> {
        self.ch_tx
    }
}

// The Debug form doubles as the transaction log line: byte count, channel, hex dump.
impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Received {} bytes", self.frame.len())?;
        if let Some(ch) = self.ch_rx {
            write!(f, " channel {}", ch)?;
        }
        write!(f, ": {:?}", HexSlice(&self.frame[..]))
    }
}
