//! A link- and transport-layer driver for Hoymiles HM-series micro-inverters.
//!
//! Hoymiles HM-300/600/1200 photovoltaic micro-inverters talk Enhanced ShockBurst over an
//! nRF24L01+ at 250 kbps. A request is chopped into ≤32-byte fragments, each protected by a CRC-8
//! trailer; the reply arrives as a burst of fragments on one of several hopping RX channels and
//! reassembles into a logical payload protected by a Modbus CRC-16 trailer. This crate implements
//! that protocol: framing, fragmentation and reassembly, retransmit scheduling, the channel-hopping
//! receive loop, and the per-model telemetry decoders.
//!
//! # Using the driver
//!
//! The crate is runtime and hardware-agnostic. The platform has to provide a few services:
//! * A [`Radio`], the nRF24L01+ operation set (any SPI driver exposing the usual RF24 surface can
//!   implement it).
//! * A [`Timer`] with microsecond resolution for receive deadlines.
//! * A `DelayMs` implementation (from `embedded-hal`) for the inter-poll yield.
//!
//! With those in place, compose a request with [`compose::Request`], feed it to an
//! [`xact::InverterTransaction`], drive [`rxtx`] until [`get_payload`] succeeds, and hand the
//! payload to [`decode::decode`].
//!
//! [`Radio`]: radio/trait.Radio.html
//! [`Timer`]: time/trait.Timer.html
//! [`rxtx`]: xact/struct.InverterTransaction.html#method.rxtx
//! [`get_payload`]: xact/struct.InverterTransaction.html#method.get_payload
//! [`compose::Request`]: compose/struct.Request.html
//! [`xact::InverterTransaction`]: xact/struct.InverterTransaction.html
//! [`decode::decode`]: decode/fn.decode.html

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
mod log;
mod crc;
mod error;
mod utils;

pub mod addr;
pub mod bytes;
pub mod compose;
pub mod config;
pub mod decode;
pub mod frame;
pub mod radio;
pub mod time;
pub mod xact;

pub use self::error::Error;
