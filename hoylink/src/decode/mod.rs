//! Reply decoding: from a CRC-checked payload to a typed telemetry record.
//!
//! Which decoder applies depends on the inverter's model family (from its serial prefix) and on
//! the opcode of the *request* the payload answers. The dispatch is an explicit table:
//!
//! | request opcode            | decoder                               |
//! |---------------------------|---------------------------------------|
//! | `0x01`/`0x02`/`0x11`/`0x12` | event log ([`EventsResponse`])      |
//! | `0x0B`                    | per-family status ([`StatusResponse`]) |
//! | anything else             | [`RawResponse`] when debugging, otherwise `UnsupportedReply` |
//!
//! [`EventsResponse`]: events/struct.EventsResponse.html
//! [`StatusResponse`]: status/struct.StatusResponse.html
//! [`RawResponse`]: struct.RawResponse.html

pub mod events;
pub mod status;

pub use self::events::{alarm_text, Event, EventsResponse};
pub use self::status::{AcPhase, DcString, StatusResponse};

use crate::addr::InverterModel;
use crate::compose::Payload;
use crate::crc::{crc16_modbus, crc8};
use crate::time::Instant;
use crate::utils::HexSlice;
use crate::Error;
use byteorder::{BigEndian, ByteOrder};
use core::fmt::Write;
use heapless::{consts::*, String};

/// A decoded reply.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// Telemetry snapshot (reply to a `0x0B` request).
    Status(StatusResponse),

    /// Alarm/event log entries.
    Events(EventsResponse),

    /// A payload without a decoder, kept verbatim for inspection.
    Raw(RawResponse),
}

/// Decodes a reassembled payload (CRC-16 already verified and stripped by the transaction).
///
/// `debug_logging` controls the fallback for unknown opcodes: with it set, the payload is
/// returned as [`Response::Raw`] and its field views are dumped through the log macros; without
/// it, unknown opcodes fail with `UnsupportedReply`.
///
/// [`Response::Raw`]: enum.Response.html#variant.Raw
pub fn decode(
    model: InverterModel,
    req_type: u8,
    payload: &[u8],
    time_rx: Instant,
    debug_logging: bool,
) -> Result<Response, Error> {
    match req_type {
        0x01 | 0x02 | 0x11 | 0x12 => {
            Ok(Response::Events(events::decode_events(payload, time_rx)?))
        }
        0x0B => {
            let status = match model {
                InverterModel::Hm300 => status::decode_hm300(payload, time_rx)?,
                InverterModel::Hm600 => status::decode_hm600(payload, time_rx)?,
                InverterModel::Hm1200 => status::decode_hm1200(payload, time_rx)?,
            };
            Ok(Response::Status(status))
        }
        _ if debug_logging => {
            let raw = RawResponse::new(payload, time_rx)?;
            raw.log_field_views();
            Ok(Response::Raw(raw))
        }
        _ => Err(Error::UnsupportedReply),
    }
}

/// An undecoded payload, with any valid trailing checksum layers removed.
///
/// Helps reverse-engineering unknown opcodes: the sliding u16/u32 field views expose plausible
/// counters and scaled values at a glance.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResponse {
    time_rx: Instant,
    payload: Payload,
}

impl RawResponse {
    pub(crate) fn new(bytes: &[u8], time_rx: Instant) -> Result<Self, Error> {
        let mut bytes = bytes;

        // Payloads of unknown shape sometimes still carry one or both trailer layers.
        if let Some((&last, body)) = bytes.split_last() {
            if crc8(body) == last {
                bytes = body;
            }
        }
        if bytes.len() >= 2 {
            let body = &bytes[..bytes.len() - 2];
            let trailer = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
            if crc16_modbus(body) == trailer {
                bytes = body;
            }
        }

        let mut payload = Payload::new();
        payload.extend_from_slice(bytes).map_err(|_| Error::Eof)?;
        Ok(RawResponse { time_rx, payload })
    }

    /// The payload bytes after trailer stripping.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// When the terminal fragment of this payload was received.
    pub fn time_rx(&self) -> Instant {
        self.time_rx
    }

    /// Dumps the payload and its sliding big-endian u16/u32 field views through the log macros.
    pub fn log_field_views(&self) {
        debug!(
            "payload has {} bytes: {:?}",
            self.payload.len(),
            HexSlice(&self.payload[..])
        );

        let mut row: String<U256> = String::new();
        for phase in 0..2 {
            row.clear();
            let mut pos = phase;
            while pos + 2 <= self.payload.len() {
                let _ = write!(row, "{:>6}", BigEndian::read_u16(&self.payload[pos..pos + 2]));
                pos += 2;
            }
            debug!("u16 view +{}: {}", phase, row.as_str());
        }
        for phase in 0..4 {
            row.clear();
            let mut pos = phase;
            while pos + 4 <= self.payload.len() {
                let _ = write!(row, "{:>11}", BigEndian::read_u32(&self.payload[pos..pos + 4]));
                pos += 4;
            }
            debug!("u32 view +{}: {}", phase, row.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::from_raw_micros(0)
    }

    #[test]
    fn dispatch_table() {
        let events_payload = [
            0x00, 0x01, 0x01, 0x01, 0x00, 0x01, 0x00, 0x2c, 0x03, 0xe8, 0x00, 0xd8, 0x00, 0x06,
        ];
        match decode(InverterModel::Hm600, 0x11, &events_payload, t0(), false).unwrap() {
            Response::Events(events) => assert_eq!(events.events.len(), 1),
            other => panic!("expected events, got {:?}", other),
        }

        assert_eq!(
            decode(InverterModel::Hm600, 0x07, &[0x01, 0x02], t0(), false).unwrap_err(),
            Error::UnsupportedReply
        );

        match decode(InverterModel::Hm600, 0x07, &[0x01, 0x02], t0(), true).unwrap() {
            Response::Raw(raw) => assert_eq!(raw.payload(), &[0x01, 0x02]),
            other => panic!("expected raw, got {:?}", other),
        }
    }

    #[test]
    fn raw_response_strips_valid_trailers() {
        // 9 data bytes with a valid Modbus CRC-16 appended.
        let body = b"123456789";
        let mut bytes = body.to_vec();
        bytes.extend_from_slice(&0x4B37u16.to_be_bytes());

        let raw = RawResponse::new(&bytes, t0()).unwrap();
        assert_eq!(raw.payload(), body);

        // Without a valid trailer nothing is stripped.
        let raw = RawResponse::new(body, t0()).unwrap();
        assert_eq!(raw.payload(), body);
    }
}
