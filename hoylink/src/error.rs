use core::fmt;

/// Errors returned by the driver.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// This is returned when a payload does not fit into a fixed-size buffer, and also when
    /// reaching EOF prematurely while reading fields from a buffer (eg. a truncated status
    /// payload).
    Eof,

    /// A length field or buffer length is outside the permitted range.
    InvalidLength,

    /// Invalid value supplied for field.
    InvalidValue,

    /// The radio hardware could not be brought up.
    ///
    /// Fatal to the session; nothing can be transmitted or received.
    RadioUnavailable,

    /// A received fragment failed its CRC-8 check.
    ///
    /// The fragment is dropped; the receive loop keeps polling.
    BadFrame,

    /// No terminal fragment (sequence byte ≥ 0x80) has been received yet.
    ///
    /// A retransmit request for the next expected fragment is scheduled when at least one
    /// fragment has arrived.
    NoTerminal,

    /// Reassembly lacks the fragment with this sequence number.
    ///
    /// A retransmit request for it has been enqueued; drive the transaction again.
    MissingFragment(u8),

    /// The reassembled payload failed its Modbus CRC-16 check.
    CrcMismatch,

    /// The inverter serial does not map to a known model family.
    UnknownModel,

    /// No decoder exists for this (model, opcode) combination.
    UnsupportedReply,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Eof => f.write_str("end of buffer"),
            Error::InvalidLength => f.write_str("invalid length"),
            Error::InvalidValue => f.write_str("invalid value for field"),
            Error::RadioUnavailable => f.write_str("radio unavailable"),
            Error::BadFrame => f.write_str("fragment failed CRC-8 check"),
            Error::NoTerminal => f.write_str("terminal fragment not received"),
            Error::MissingFragment(id) => write!(f, "fragment {} missing", id),
            Error::CrcMismatch => f.write_str("payload failed CRC-16 check"),
            Error::UnknownModel => f.write_str("unknown inverter model"),
            Error::UnsupportedReply => f.write_str("no decoder for reply"),
        }
    }
}
