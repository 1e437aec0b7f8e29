//! The nRF24L01+ capability interface and the channel-hopping receive loop.
//!
//! Don't expect SPI register pokes here: the concrete transceiver driver lives outside this
//! crate. [`Radio`] captures the operation set this protocol needs (the usual RF24 surface), and
//! [`Nrf`] drives it: per-call transmit preconditions on the TX path, and a deadline-driven,
//! channel-hopping fragment source on the RX path.
//!
//! The inverter replies on one of several RF channels, and which one varies per site and per
//! burst. Staying on a channel that just produced a fragment minimizes loss; hopping when a
//! channel stays quiet finds the burst in the first place. Concretely: a fragment marks the
//! current channel acknowledged and extends the deadline by half a second; two consecutive empty
//! polls revoke the acknowledgement; every further empty poll advances the hop list.
//!
//! [`Radio`]: trait.Radio.html
//! [`Nrf`]: struct.Nrf.html

use crate::addr::EsbAddr;
use crate::config::RadioConfig;
use crate::frame::{Fragment, MAX_FRAME};
use crate::time::{Duration, Instant, Timer};
use crate::utils::HexSlice;
use crate::Error;
use embedded_hal::blocking::delay::DelayMs;

/// Air data rate. This protocol always runs at 250 kbps.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DataRate {
    Kbps250,
    Mbps1,
    Mbps2,
}

/// Transmit power amplifier level.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PaLevel {
    Min,
    Low,
    High,
    Max,
}

/// Length of the Enhanced ShockBurst hardware CRC. This protocol always uses 16 bits.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CrcLength {
    Disabled,
    Bits8,
    Bits16,
}

/// Operations the driver needs from an nRF24L01+ transceiver.
///
/// Mirrors the common RF24 driver surface so that existing SPI drivers can implement it with a
/// thin shim. All methods are infallible: bus errors are a platform concern and should be handled
/// (or panicked on) inside the implementation. Only [`begin`] reports failure, which surfaces as
/// [`Error::RadioUnavailable`].
///
/// [`begin`]: #tymethod.begin
/// [`Error::RadioUnavailable`]: ../enum.Error.html#variant.RadioUnavailable
pub trait Radio {
    /// Brings the transceiver up. Returns `false` when the hardware does not respond.
    fn begin(&mut self) -> bool;

    /// Puts the transceiver into its low-power state.
    fn power_down(&mut self);

    /// Selects the RF channel (2400 MHz + `channel` MHz).
    fn set_channel(&mut self, channel: u8);

    /// Selects the air data rate.
    fn set_data_rate(&mut self, rate: DataRate);

    /// Selects the transmit power.
    fn set_pa_level(&mut self, level: PaLevel);

    /// Configures the hardware Enhanced ShockBurst CRC.
    fn set_crc_length(&mut self, crc: CrcLength);

    /// Enables or disables automatic acknowledgement on all pipes.
    fn set_auto_ack(&mut self, enable: bool);

    /// Configures the automatic retransmit delay ((`delay` + 1) × 250 µs) and count.
    fn set_retries(&mut self, delay: u8, count: u8);

    /// Enables dynamic payload lengths on all pipes.
    fn enable_dynamic_payloads(&mut self);

    /// Binds the transmit pipe to a 5-byte address.
    fn open_writing_pipe(&mut self, addr: EsbAddr);

    /// Binds receive pipe `pipe` to a 5-byte address.
    fn open_reading_pipe(&mut self, pipe: u8, addr: EsbAddr);

    /// Enters PRX mode.
    fn start_listening(&mut self);

    /// Leaves PRX mode.
    fn stop_listening(&mut self);

    /// Returns whether a payload is waiting, and the pipe it arrived on.
    fn available_pipe(&mut self) -> (bool, u8);

    /// Returns the length of the waiting payload.
    fn get_dynamic_payload_size(&mut self) -> usize;

    /// Reads the waiting payload into `buf`, returning the number of bytes written.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Transmits one packet, blocking until it was acknowledged or retries are exhausted.
    /// Returns whether an acknowledgement arrived.
    fn write(&mut self, packet: &[u8]) -> bool;
}

/// Pause between RX polls.
const POLL_INTERVAL_MS: u8 = 5;

/// Deadline extension granted whenever a fragment arrives: the rest of the burst is close
/// behind.
const FRAGMENT_GRACE: Duration = Duration::from_millis(500);

/// The transceiver wrapper: owns a [`Radio`] plus the hop-list state.
///
/// [`Radio`]: trait.Radio.html
pub struct Nrf<R: Radio> {
    radio: R,
    config: RadioConfig,
    tx_channel_id: usize,
    rx_channel_id: usize,
    rx_channel_ack: bool,
    rx_error: u8,
}

impl<R: Radio> Nrf<R> {
    /// Claims the radio device.
    ///
    /// Fails with `RadioUnavailable` when [`Radio::begin`] reports dead hardware.
    ///
    /// [`Radio::begin`]: trait.Radio.html#tymethod.begin
    pub fn new(mut radio: R, config: RadioConfig) -> Result<Self, Error> {
        if config.tx_channels.is_empty() || config.rx_channels.is_empty() {
            return Err(Error::InvalidValue);
        }
        if !radio.begin() {
            return Err(Error::RadioUnavailable);
        }

        Ok(Nrf {
            radio,
            config,
            tx_channel_id: 0,
            rx_channel_id: 0,
            rx_channel_ack: false,
            rx_error: 0,
        })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// The channel requests are currently transmitted on.
    pub fn tx_channel(&self) -> u8 {
        self.config.tx_channels[self.tx_channel_id]
    }

    /// The channel the receive loop currently listens on.
    pub fn rx_channel(&self) -> u8 {
        self.config.rx_channels[self.rx_channel_id]
    }

    /// Powers the transceiver down and releases it.
    pub fn power_down(&mut self) {
        self.radio.power_down();
    }

    /// Releases the wrapped [`Radio`].
    ///
    /// [`Radio`]: trait.Radio.html
    pub fn free(self) -> R {
        self.radio
    }

    /// Transmits one packet with the Enhanced ShockBurst preconditions this protocol requires.
    ///
    /// The two pipe addresses are derived from the packet itself: `0x01` followed by the target
    /// respectively source address bytes. Returns whether the inverter's hardware acknowledged
    /// the packet.
    pub fn transmit(&mut self, packet: &[u8], txpower: Option<PaLevel>) -> Result<bool, Error> {
        if packet.len() < 9 || packet.len() > MAX_FRAME {
            return Err(Error::InvalidLength);
        }

        let mut inverter = [0x01; 5];
        inverter[1..].copy_from_slice(&packet[1..5]);
        let mut dtu = [0x01; 5];
        dtu[1..].copy_from_slice(&packet[5..9]);

        let channel = self.tx_channel();
        self.radio.stop_listening();
        self.radio.set_data_rate(DataRate::Kbps250);
        self.radio.open_reading_pipe(1, EsbAddr::from_bytes(dtu));
        self.radio.open_writing_pipe(EsbAddr::from_bytes(inverter));
        self.radio.set_channel(channel);
        self.radio.set_auto_ack(true);
        self.radio.set_retries(3, 15);
        self.radio.set_crc_length(CrcLength::Bits16);
        self.radio.enable_dynamic_payloads();
        self.radio
            .set_pa_level(txpower.unwrap_or(self.config.txpower));

        Ok(self.radio.write(packet))
    }

    /// Starts a receive pass and returns an iterator over the arriving fragments.
    ///
    /// The pass ends (the iterator yields `None`) once the deadline expires: `timeout` (the
    /// configured receive timeout by default) after the start, extended to half a second after
    /// every received fragment. Fragments failing their CRC-8 are dropped inside the loop.
    pub fn receive<'a, T: Timer, D: DelayMs<u8>>(
        &'a mut self,
        timer: &'a T,
        delay: &'a mut D,
        timeout: Option<Duration>,
    ) -> Receive<'a, R, T, D> {
        let timeout = timeout.unwrap_or(self.config.receive_timeout);
        let channel = self.rx_channel();
        self.radio.set_channel(channel);
        self.radio.set_auto_ack(false);
        self.radio.set_retries(0, 0);
        self.radio.enable_dynamic_payloads();
        self.radio.set_crc_length(CrcLength::Bits16);
        self.radio.start_listening();

        Receive {
            deadline: timer.now() + timeout,
            nrf: self,
            timer,
            delay,
        }
    }

    /// Advances to the next RX hop channel, unless the current one recently produced traffic.
    ///
    /// Returns whether a new channel was selected.
    fn next_rx_channel(&mut self) -> bool {
        if self.rx_channel_ack {
            return false;
        }

        self.rx_channel_id += 1;
        if self.rx_channel_id >= self.config.rx_channels.len() {
            self.rx_channel_id = 0;
        }
        true
    }
}

/// Iterator over the fragments arriving during one receive pass.
///
/// Created by [`Nrf::receive`]; exclusively borrows the transceiver for the duration of the
/// pass.
///
/// [`Nrf::receive`]: struct.Nrf.html#method.receive
pub struct Receive<'a, R: Radio, T: Timer, D: DelayMs<u8>> {
    nrf: &'a mut Nrf<R>,
    timer: &'a T,
    delay: &'a mut D,
    deadline: Instant,
}

impl<'a, R: Radio, T: Timer, D: DelayMs<u8>> Iterator for Receive<'a, R, T, D> {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        loop {
            if self.timer.now() >= self.deadline {
                return None;
            }

            let (has_payload, _pipe) = self.nrf.radio.available_pipe();
            if has_payload {
                self.nrf.rx_error = 0;
                self.nrf.rx_channel_ack = true;
                self.deadline = self.timer.now() + FRAGMENT_GRACE;

                let size = self.nrf.radio.get_dynamic_payload_size().min(MAX_FRAME);
                let mut buf = [0u8; MAX_FRAME];
                let len = self.nrf.radio.read(&mut buf[..size]);
                let time_rx = self.timer.now();
                let ch_rx = self.nrf.rx_channel();
                let ch_tx = self.nrf.tx_channel();

                self.delay.delay_ms(POLL_INTERVAL_MS);

                match Fragment::parse(&buf[..len], time_rx, Some(ch_rx), Some(ch_tx)) {
                    Ok(fragment) => return Some(fragment),
                    Err(_) => {
                        debug!(
                            "dropping frame with bad CRC-8 on channel {}: {:?}",
                            ch_rx,
                            HexSlice(&buf[..len])
                        );
                    }
                }
            } else {
                self.nrf.rx_error = self.nrf.rx_error.saturating_add(1);
                if self.nrf.rx_error > 1 {
                    self.nrf.rx_channel_ack = false;
                }

                if self.nrf.next_rx_channel() {
                    self.nrf.radio.stop_listening();
                    let channel = self.nrf.rx_channel();
                    self.nrf.radio.set_channel(channel);
                    self.nrf.radio.start_listening();
                }

                self.delay.delay_ms(POLL_INTERVAL_MS);
            }
        }
    }
}
