//! Driver configuration.
//!
//! Everything tunable lives in explicit structs passed to the radio wrapper, the transaction
//! engine and the decoder dispatch. There is no global state; two transactions with different
//! settings can coexist in one program.

use crate::radio::PaLevel;
use crate::time::Duration;
use heapless::{consts::*, Vec};

/// An ordered list of 2.4 GHz RF channel numbers.
pub type ChannelList = Vec<u8, U8>;

/// Builds a [`ChannelList`] from a slice.
///
/// # Panics
///
/// This will panic when `channels` holds more than 8 entries.
pub fn channel_list(channels: &[u8]) -> ChannelList {
    let mut list = Vec::new();
    list.extend_from_slice(channels)
        .expect("channel_list: more than 8 channels");
    list
}

/// Settings for the nRF24L01+ and the receive loop.
#[derive(Clone, Debug)]
pub struct RadioConfig {
    /// GPIO number of the chip-enable pin (consumed by the platform's radio constructor).
    pub ce_pin: u8,

    /// SPI chip-select index (consumed by the platform's radio constructor).
    pub cs_pin: u8,

    /// SPI bus clock in Hz (consumed by the platform's radio constructor).
    pub spi_hz: u32,

    /// Transmit power used unless a transaction overrides it.
    pub txpower: PaLevel,

    /// Channels to transmit requests on. Only the first entry is used currently.
    pub tx_channels: ChannelList,

    /// Channels the receive loop hops across while searching for the reply burst.
    pub rx_channels: ChannelList,

    /// How long a receive pass waits for the first fragment before giving up.
    pub receive_timeout: Duration,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            ce_pin: 22,
            cs_pin: 0,
            spi_hz: 1_000_000,
            txpower: PaLevel::Max,
            tx_channels: channel_list(&[40]),
            rx_channels: channel_list(&[3, 23, 40, 61, 75]),
            receive_timeout: Duration::from_millis(1_200),
        }
    }
}

/// Per-transaction settings.
#[derive(Copy, Clone, Debug, Default)]
pub struct TransactionConfig {
    /// Overrides the radio's transmit power for this transaction's packets.
    pub txpower: Option<PaLevel>,

    /// Emit a log line for every transmitted packet and received fragment.
    pub transaction_logging: bool,
}
