//! Event log (`0x01`/`0x02`/`0x11`/`0x12`) reply decoding.
//!
//! An event payload starts with two status bytes, followed by 12-byte records. Each record
//! carries an opcode, the alarm code, how often that alarm fired, and two uptime counters in
//! seconds; the last two words of the record have no known meaning and are not carried. Some
//! firmware revisions append an extra Modbus CRC-16 trailer to the payload; when present and
//! valid it is removed first.

use crate::bytes::ByteReader;
use crate::crc::crc16_modbus;
use crate::time::Instant;
use crate::Error;
use heapless::{consts::*, Vec};

/// Record size in the event payload.
const CHUNK: usize = 12;

/// One event log entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Entry opcode.
    pub opcode: u8,

    /// Alarm code; [`alarm_text`] maps it to a human-readable description.
    ///
    /// [`alarm_text`]: fn.alarm_text.html
    pub alarm_code: u8,

    /// How often this alarm has fired.
    pub alarm_count: u16,

    /// First uptime counter, in seconds.
    pub uptime1: u16,

    /// Second uptime counter, in seconds.
    pub uptime2: u16,
}

impl Event {
    /// The description of this entry's alarm code.
    pub fn alarm_text(&self) -> &'static str {
        alarm_text(u16::from(self.alarm_code))
    }
}

/// A decoded event log reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventsResponse {
    /// When the terminal fragment of this reply was received.
    pub time_rx: Instant,

    /// The two leading status bytes, carried verbatim.
    pub status: [u8; 2],

    /// The log entries, newest first as sent by the inverter.
    pub events: Vec<Event, U32>,
}

pub(crate) fn decode_events(payload: &[u8], time_rx: Instant) -> Result<EventsResponse, Error> {
    let mut payload = payload;

    if payload.len() >= 2 {
        let body = &payload[..payload.len() - 2];
        let trailer =
            u16::from_be_bytes([payload[payload.len() - 2], payload[payload.len() - 1]]);
        if crc16_modbus(body) == trailer {
            payload = body;
        }
    }

    if payload.len() < 2 {
        return Err(Error::Eof);
    }
    let status = [payload[0], payload[1]];

    let mut events = Vec::new();
    let mut rest = &payload[2..];
    // A trailing partial record is ignored.
    while rest.len() >= CHUNK {
        let mut reader = ByteReader::new(&rest[..CHUNK]);
        let event = Event {
            opcode: reader.read_u8()?,
            alarm_code: reader.read_u8()?,
            alarm_count: reader.read_u16_be()?,
            uptime1: reader.read_u16_be()?,
            uptime2: reader.read_u16_be()?,
        };
        events.push(event).map_err(|_| Error::Eof)?;
        rest = &rest[CHUNK..];
    }

    Ok(EventsResponse {
        time_rx,
        status,
        events,
    })
}

/// Maps an alarm code to its description, `"N/A"` for unknown codes.
pub fn alarm_text(code: u16) -> &'static str {
    match code {
        1 => "Inverter start",
        2 => "DTU command failed",
        121 => "Over temperature protection",
        125 => "Grid configuration parameter error",
        126 => "Software error code 126",
        127 => "Firmware error",
        128 => "Software error code 128",
        129 => "Software error code 129",
        130 => "Offline",
        141 => "Grid overvoltage",
        142 => "Average grid overvoltage",
        143 => "Grid undervoltage",
        144 => "Grid overfrequency",
        145 => "Grid underfrequency",
        146 => "Rapid grid frequency change",
        147 => "Power grid outage",
        148 => "Grid disconnection",
        149 => "Island detected",
        205 => "Input port 1 & 2 overvoltage",
        206 => "Input port 3 & 4 overvoltage",
        207 => "Input port 1 & 2 undervoltage",
        208 => "Input port 3 & 4 undervoltage",
        209 => "Port 1 no input",
        210 => "Port 2 no input",
        211 => "Port 3 no input",
        212 => "Port 4 no input",
        213 => "PV-1 & PV-2 abnormal wiring",
        214 => "PV-3 & PV-4 abnormal wiring",
        215 => "PV-1 Input overvoltage",
        216 => "PV-1 Input undervoltage",
        217 => "PV-2 Input overvoltage",
        218 => "PV-2 Input undervoltage",
        219 => "PV-3 Input overvoltage",
        220 => "PV-3 Input undervoltage",
        221 => "PV-4 Input overvoltage",
        222 => "PV-4 Input undervoltage",
        301 => "Hardware error code 301",
        302 => "Hardware error code 302",
        303 => "Hardware error code 303",
        304 => "Hardware error code 304",
        305 => "Hardware error code 305",
        306 => "Hardware error code 306",
        307 => "Hardware error code 307",
        308 => "Hardware error code 308",
        309 => "Hardware error code 309",
        310 => "Hardware error code 310",
        311 => "Hardware error code 311",
        312 => "Hardware error code 312",
        313 => "Hardware error code 313",
        314 => "Hardware error code 314",
        5041 => "Error code-04 Port 1",
        5042 => "Error code-04 Port 2",
        5043 => "Error code-04 Port 3",
        5044 => "Error code-04 Port 4",
        5051 => "PV Input 1 Overvoltage/Undervoltage",
        5052 => "PV Input 2 Overvoltage/Undervoltage",
        5053 => "PV Input 3 Overvoltage/Undervoltage",
        5054 => "PV Input 4 Overvoltage/Undervoltage",
        5060 => "Abnormal bias",
        5070 => "Over temperature protection",
        5080 => "Grid Overvoltage/Undervoltage",
        5090 => "Grid Overfrequency/Underfrequency",
        5100 => "Island detected",
        5120 => "EEPROM reading and writing error",
        5150 => "10 min value grid overvoltage",
        5200 => "Firmware error",
        8310 => "Shut down",
        9000 => "Microinverter is suspected of being stolen",
        _ => "N/A",
    }
}
