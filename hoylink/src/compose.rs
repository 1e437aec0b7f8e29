//! Request composition: CRC-16 trailer, chunking, sequence numbering.
//!
//! A logical command payload gets a big-endian Modbus CRC-16 appended and is then split into
//! fragments of at most [`MTU`] data bytes. Fragment `i` (counting from 1) carries `i` as its
//! sub-command byte; the terminal fragment carries `0x80 | N` where `N` is the total fragment
//! count. A request that fits a single fragment therefore goes out with sub-command `0x81`.
//!
//! [`MTU`]: constant.MTU.html

use crate::addr::HmAddr;
use crate::crc::crc16_modbus;
use crate::frame::{build_frame, Packet};
use crate::Error;
use heapless::{consts::*, Vec};

/// Data bytes per fragment.
pub const MTU: usize = 16;

/// Preamble byte of DTU→inverter frames.
pub const REQUEST_PREAMBLE: u8 = 0x15;

/// A reassembled or to-be-fragmented logical payload, CRC-16 trailer included.
///
/// Sized for the longest possible message: 127 fragments of [`MTU`] bytes.
///
/// [`MTU`]: constant.MTU.html
pub type Payload = Vec<u8, U2048>;

/// Appends the big-endian Modbus CRC-16 trailer to a logical payload.
pub fn frame_payload(payload: &[u8]) -> Result<Payload, Error> {
    let mut framed = Payload::new();
    framed.extend_from_slice(payload).map_err(|_| Error::Eof)?;
    framed
        .extend_from_slice(&crc16_modbus(payload).to_be_bytes())
        .map_err(|_| Error::Eof)?;
    Ok(framed)
}

/// Builds a single request-direction fragment with an explicit sub-command byte.
///
/// This is the escape hatch used for retransmit requests (empty `data`, sub-command
/// `0x80 + fragment id`); ordinary commands go through [`Request`].
///
/// [`Request`]: struct.Request.html
pub fn compose_fragment(
    target: HmAddr,
    source: HmAddr,
    subcmd: u8,
    data: &[u8],
) -> Result<Packet, Error> {
    build_frame(REQUEST_PREAMBLE, target, source, &[subcmd], data)
}

/// The canonical set-time command payload (without the CRC-16 trailer).
///
/// Pass the result to [`Request::new`].
///
/// [`Request::new`]: struct.Request.html#method.new
pub fn set_time_payload(timestamp: u32) -> [u8; 14] {
    let ts = timestamp.to_be_bytes();
    [
        0x0b, 0x00, ts[0], ts[1], ts[2], ts[3], 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00,
    ]
}

/// A logical command addressed to one inverter, ready to be fragmented.
///
/// Addresses are taken as [`HmAddr`]; convert serials once at the boundary
/// (`Serial::hm_addr`).
///
/// [`HmAddr`]: ../addr/struct.HmAddr.html
#[derive(Debug)]
pub struct Request {
    target: HmAddr,
    source: HmAddr,
    payload: Payload,
}

impl Request {
    /// Creates a request from the logical command payload (CRC-16 not yet appended).
    ///
    /// Fails with `InvalidLength` for an empty payload or one that would not fit the 127-fragment
    /// sequence space.
    pub fn new(inverter: HmAddr, dtu: HmAddr, payload: &[u8]) -> Result<Self, Error> {
        if payload.is_empty() || payload.len() + 2 > MTU * 127 {
            return Err(Error::InvalidLength);
        }

        Ok(Request {
            target: inverter,
            source: dtu,
            payload: frame_payload(payload)?,
        })
    }

    /// The command opcode (first payload byte); replies are dispatched to a decoder by it.
    pub fn opcode(&self) -> u8 {
        self.payload[0]
    }

    /// The inverter address this request is directed at.
    pub fn target(&self) -> HmAddr {
        self.target
    }

    /// The DTU address the reply will be directed at.
    pub fn source(&self) -> HmAddr {
        self.source
    }

    /// Number of on-air fragments this request splits into.
    pub fn num_fragments(&self) -> usize {
        (self.payload.len() + MTU - 1) / MTU
    }

    /// Returns an iterator over the on-air fragments of this request, in transmit order.
    pub fn fragments(&self) -> Fragments<'_> {
        Fragments {
            request: self,
            offset: 0,
            n_frame: 0,
        }
    }
}

/// Iterator over the on-air fragments of a [`Request`].
///
/// [`Request`]: struct.Request.html
pub struct Fragments<'a> {
    request: &'a Request,
    offset: usize,
    n_frame: u8,
}

impl<'a> Iterator for Fragments<'a> {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        let payload = &self.request.payload;
        if self.offset >= payload.len() {
            return None;
        }

        self.n_frame += 1;
        let end = (self.offset + MTU).min(payload.len());
        let mut subcmd = self.n_frame;
        if end == payload.len() {
            subcmd |= 0x80;
        }

        let chunk = &payload[self.offset..end];
        self.offset = end;

        let packet = build_frame(
            REQUEST_PREAMBLE,
            self.request.target,
            self.request.source,
            &[subcmd],
            chunk,
        )
        .expect("fragment within frame limits");
        Some(packet)
    }
}
