//! The transaction engine: transmit queue, fragment scratch set, reassembly, retransmits.
//!
//! One [`InverterTransaction`] covers one logical exchange with one inverter: the request
//! fragments go into a strict-FIFO transmit queue, every fragment heard back lands in the
//! scratch set, and [`get_payload`] tries to stitch the reply together. Partial failure is the
//! normal case on this link — when a fragment is missing, a retransmit request is queued and the
//! caller simply drives [`rxtx`] again until the payload checks out or its own deadline expires.
//!
//! The transaction does not own the radio. The caller passes it into every [`rxtx`] call, which
//! keeps the borrow local and lets several queued-up transactions share one transceiver,
//! serialized by the caller.
//!
//! [`InverterTransaction`]: struct.InverterTransaction.html
//! [`rxtx`]: struct.InverterTransaction.html#method.rxtx
//! [`get_payload`]: struct.InverterTransaction.html#method.get_payload

use crate::addr::{HmAddr, Serial};
use crate::compose::{compose_fragment, Payload, Request};
use crate::config::TransactionConfig;
use crate::crc::crc16_modbus;
use crate::frame::{Fragment, Packet};
use crate::radio::{Nrf, Radio};
use crate::time::{Instant, Timer};
use crate::utils::{Hex, HexSlice};
use crate::Error;
use embedded_hal::blocking::delay::DelayMs;
use heapless::{consts::*, spsc::Queue, Vec};

/// A pending exchange with one inverter.
pub struct InverterTransaction {
    inverter_ser: Serial,
    dtu_ser: Serial,
    inverter_addr: HmAddr,
    dtu_addr: HmAddr,
    req_type: Option<u8>,
    tx_queue: Queue<Packet, U16>,
    scratch: Vec<Fragment, U128>,
    time_rx: Option<Instant>,
    config: TransactionConfig,
}

impl InverterTransaction {
    /// Creates an empty transaction between the given inverter and DTU.
    ///
    /// Both serials are converted to their 4-byte addresses once, here; everything downstream
    /// (scratch filtering, retransmit requests) works on the addresses.
    pub fn new(inverter_ser: Serial, dtu_ser: Serial, config: TransactionConfig) -> Self {
        InverterTransaction {
            inverter_ser,
            dtu_ser,
            inverter_addr: inverter_ser.hm_addr(),
            dtu_addr: dtu_ser.hm_addr(),
            req_type: None,
            tx_queue: Queue::new(),
            scratch: Vec::new(),
            time_rx: None,
            config,
        }
    }

    /// The inverter this transaction talks to.
    pub fn inverter_ser(&self) -> Serial {
        self.inverter_ser
    }

    /// The DTU identity used as the reply address.
    pub fn dtu_ser(&self) -> Serial {
        self.dtu_ser
    }

    /// The request opcode, once a request has been queued. Decoder dispatch keys on it.
    pub fn req_type(&self) -> Option<u8> {
        self.req_type
    }

    /// When the terminal fragment of the reply was received.
    pub fn time_rx(&self) -> Option<Instant> {
        self.time_rx
    }

    /// Queues all fragments of `request` for transmission and records its opcode.
    pub fn queue_request(&mut self, request: &Request) -> Result<(), Error> {
        self.req_type = Some(request.opcode());
        debug!(
            "queueing request {:?} in {} fragments",
            Hex(request.opcode()),
            request.num_fragments()
        );
        for packet in request.fragments() {
            self.queue_tx(packet)?;
        }
        Ok(())
    }

    /// Enqueues one raw packet for transmission.
    pub fn queue_tx(&mut self, packet: Packet) -> Result<(), Error> {
        self.tx_queue.enqueue(packet).map_err(|_| Error::Eof)
    }

    /// Appends a received fragment to the scratch set.
    ///
    /// A fragment with the same `(src, seq)` key as an earlier one replaces it, so duplicated
    /// and re-requested fragments cannot corrupt reassembly.
    pub fn frame_append(&mut self, fragment: Fragment) -> Result<(), Error> {
        if let Some(slot) = self
            .scratch
            .iter_mut()
            .find(|f| f.src() == fragment.src() && f.seq() == fragment.seq())
        {
            *slot = fragment;
            return Ok(());
        }

        self.scratch.push(fragment).map_err(|_| Error::Eof)
    }

    /// Transmits the next queued packet and collects whatever the inverter sends back.
    ///
    /// Returns whether any fragment was received (contact), or `Ok(false)` without touching the
    /// radio when nothing is queued. The caller decides whether to call again, consult
    /// [`get_payload`], or give the transaction up.
    ///
    /// [`get_payload`]: #method.get_payload
    pub fn rxtx<R: Radio, T: Timer, D: DelayMs<u8>>(
        &mut self,
        nrf: &mut Nrf<R>,
        timer: &T,
        delay: &mut D,
    ) -> Result<bool, Error> {
        let packet = match self.tx_queue.dequeue() {
            Some(packet) => packet,
            None => return Ok(false),
        };

        if self.config.transaction_logging {
            info!("Transmit {} | {:?}", packet.len(), HexSlice(&packet[..]));
        }

        let ack = nrf.transmit(&packet, self.config.txpower)?;
        trace!("transmit ack: {}", ack);

        let mut contacted = false;
        for fragment in nrf.receive(timer, delay, None) {
            if self.config.transaction_logging {
                info!("{:?}", fragment);
            }

            if self.frame_append(fragment).is_err() {
                warn!("scratch set full, fragment dropped");
            }
            contacted = true;
        }

        Ok(contacted)
    }

    /// Reassembles the reply payload from the scratch set.
    ///
    /// On success returns the terminal fragment's leading byte and the payload with its CRC-16
    /// trailer verified and stripped. Otherwise:
    ///
    /// * `NoTerminal` — the terminal fragment is still missing. If anything has been heard, a
    ///   retransmit for the fragment after the highest sequence seen is queued.
    /// * `MissingFragment(i)` — fragment `i` is missing; a retransmit for it is queued.
    /// * `CrcMismatch` — all fragments are present but the payload checksum fails. Requesting
    ///   retransmits cannot help; the caller should abandon the transaction.
    pub fn get_payload(&mut self) -> Result<(u8, Payload), Error> {
        let src = self.inverter_addr.as_u32();

        let end = match self
            .scratch
            .iter()
            .find(|f| f.src() == src && f.seq() > 0x80)
        {
            Some(end) => end.clone(),
            None => {
                let seq_last = self
                    .scratch
                    .iter()
                    .filter(|f| f.src() == src)
                    .map(|f| f.seq())
                    .max();
                if let Some(seq_last) = seq_last {
                    self.retransmit_frame(seq_last.wrapping_add(1))?;
                }
                return Err(Error::NoTerminal);
            }
        };

        let count = end.seq() - 0x80;
        self.time_rx = Some(end.time_rx());

        let mut payload = Payload::new();
        for frame_id in 1..count {
            match self
                .scratch
                .iter()
                .find(|f| f.src() == src && f.seq() == frame_id)
            {
                Some(fragment) => payload
                    .extend_from_slice(fragment.data())
                    .map_err(|_| Error::Eof)?,
                None => {
                    self.retransmit_frame(frame_id)?;
                    return Err(Error::MissingFragment(frame_id));
                }
            }
        }
        payload.extend_from_slice(end.data()).map_err(|_| Error::Eof)?;

        if payload.len() < 2 {
            return Err(Error::CrcMismatch);
        }

        let body_len = payload.len() - 2;
        let expected = u16::from_be_bytes([payload[body_len], payload[body_len + 1]]);
        if crc16_modbus(&payload[..body_len]) != expected {
            return Err(Error::CrcMismatch);
        }

        payload.truncate(body_len);
        Ok((end.main_cmd(), payload))
    }

    /// Queues a retransmit request for one fragment: an empty-data frame whose sub-command byte
    /// is `0x80 + frame_id`.
    fn retransmit_frame(&mut self, frame_id: u8) -> Result<(), Error> {
        let subcmd = 0x80u8.checked_add(frame_id).ok_or(Error::InvalidValue)?;
        let packet = compose_fragment(self.inverter_addr, self.dtu_addr, subcmd, &[])?;
        debug!("requesting retransmit of fragment {}", frame_id);
        self.queue_tx(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::EsbAddr;
    use crate::compose::set_time_payload;
    use crate::config::RadioConfig;
    use crate::frame::build_frame;
    use crate::radio::{CrcLength, DataRate, PaLevel};
    use crate::time::Duration;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec as StdVec;

    const INVERTER: u64 = 114_172_220_143;
    const DTU: u64 = 99_978_563_412;

    // Captured HM-600 status reply burst (three fragments, seq 0x01, 0x02, 0x83).
    const BURST: [&[u8]; 3] = [
        &[
            0x95, 0x72, 0x22, 0x01, 0x43, 0x72, 0x22, 0x01, 0x43, 0x01, 0x00, 0x01, 0x01, 0x4e,
            0x00, 0x9d, 0x02, 0x0a, 0x01, 0x50, 0x00, 0x9d, 0x02, 0x10, 0x00, 0x00, 0x91,
        ],
        &[
            0x95, 0x72, 0x22, 0x01, 0x43, 0x72, 0x22, 0x01, 0x43, 0x02, 0x88, 0x1f, 0x00, 0x00,
            0x7f, 0x08, 0x00, 0x94, 0x00, 0x97, 0x08, 0xe2, 0x13, 0x89, 0x03, 0xeb, 0xec,
        ],
        &[
            0x95, 0x72, 0x22, 0x01, 0x43, 0x72, 0x22, 0x01, 0x43, 0x83, 0x00, 0x01, 0x00, 0x2c,
            0x03, 0xe8, 0x00, 0xd8, 0x00, 0x06, 0x0c, 0x35, 0x37,
        ],
    ];

    const RETRANSMIT_2: &[u8] = &[
        0x15, 0x72, 0x22, 0x01, 0x43, 0x78, 0x56, 0x34, 0x12, 0x82, 0x8d,
    ];

    fn transaction() -> InverterTransaction {
        InverterTransaction::new(
            Serial::new(INVERTER),
            Serial::new(DTU),
            TransactionConfig::default(),
        )
    }

    fn fragment(bytes: &[u8]) -> Fragment {
        Fragment::parse(bytes, Instant::from_raw_micros(1), None, None).unwrap()
    }

    fn queued_packets(xact: &InverterTransaction) -> StdVec<StdVec<u8>> {
        xact.tx_queue.iter().map(|p| p.to_vec()).collect()
    }

    #[test]
    fn reassembles_in_any_arrival_order() {
        let orders: &[[usize; 3]] = &[
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in orders {
            let mut xact = transaction();
            for &i in order {
                xact.frame_append(fragment(BURST[i])).unwrap();
            }

            let (main_cmd, payload) = xact.get_payload().unwrap();
            assert_eq!(main_cmd, 0x95);
            assert_eq!(payload.len(), 42);
            assert_eq!(payload[..4], [0x00, 0x01, 0x01, 0x4e]);
            assert_eq!(payload[38..], [0x00, 0xd8, 0x00, 0x06]);
            assert!(xact.time_rx().is_some());
        }
    }

    #[test]
    fn duplicate_fragments_are_harmless() {
        let mut xact = transaction();
        for bytes in BURST.iter().chain(BURST.iter()) {
            xact.frame_append(fragment(bytes)).unwrap();
        }
        assert_eq!(xact.scratch.len(), 3);

        let (_, payload) = xact.get_payload().unwrap();
        assert_eq!(payload.len(), 42);
    }

    #[test]
    fn missing_middle_fragment_requests_retransmit() {
        let mut xact = transaction();
        xact.frame_append(fragment(BURST[0])).unwrap();
        xact.frame_append(fragment(BURST[2])).unwrap();

        assert_eq!(xact.get_payload().unwrap_err(), Error::MissingFragment(2));
        assert_eq!(queued_packets(&xact), vec![RETRANSMIT_2.to_vec()]);
    }

    #[test]
    fn missing_terminal_requests_next_fragment() {
        let mut xact = transaction();
        xact.frame_append(fragment(BURST[0])).unwrap();

        assert_eq!(xact.get_payload().unwrap_err(), Error::NoTerminal);
        // Highest sequence seen is 1, so fragment 2 is requested.
        assert_eq!(queued_packets(&xact), vec![RETRANSMIT_2.to_vec()]);
    }

    #[test]
    fn empty_scratch_requests_nothing() {
        let mut xact = transaction();
        assert_eq!(xact.get_payload().unwrap_err(), Error::NoTerminal);
        assert!(xact.tx_queue.iter().next().is_none());
    }

    #[test]
    fn foreign_fragments_are_filtered_out() {
        let inverter = Serial::new(INVERTER).hm_addr();
        let other = Serial::new(116_100_000_001).hm_addr();

        // Terminal fragment announces two fragments in total; a seq-3 frame from another
        // inverter must not confuse the count.
        let mut body = [0xAA; 18];
        body[16] = 0xBB;
        body[17] = 0xCC;
        let crc = crc16_modbus(&body).to_be_bytes();

        let own_1 = build_frame(0x95, inverter, inverter, &[0x01], &body[..16]).unwrap();
        let own_end =
            build_frame(0x95, inverter, inverter, &[0x82], &[body[16], body[17], crc[0], crc[1]])
                .unwrap();
        let foreign = build_frame(0x95, other, inverter, &[0x03], &[0xEE; 4]).unwrap();

        let mut xact = transaction();
        for packet in &[own_1, foreign, own_end] {
            xact.frame_append(fragment(packet)).unwrap();
        }

        let (_, payload) = xact.get_payload().unwrap();
        assert_eq!(payload.len(), 18);
        assert_eq!(payload[16..], [0xBB, 0xCC]);
    }

    #[test]
    fn single_fragment_reply() {
        let inverter = Serial::new(INVERTER).hm_addr();
        let framed = crate::compose::frame_payload(b"hello").unwrap();
        let packet = build_frame(0x95, inverter, inverter, &[0x81], &framed).unwrap();

        let mut xact = transaction();
        xact.frame_append(fragment(&packet)).unwrap();

        let (main_cmd, payload) = xact.get_payload().unwrap();
        assert_eq!(main_cmd, 0x95);
        assert_eq!(&payload[..], b"hello");
    }

    #[test]
    fn corrupt_payload_crc_is_rejected() {
        let inverter = Serial::new(INVERTER).hm_addr();
        let mut framed = crate::compose::frame_payload(b"hello").unwrap();
        let len = framed.len();
        framed[len - 1] ^= 0x01;
        let packet = build_frame(0x95, inverter, inverter, &[0x81], &framed).unwrap();

        let mut xact = transaction();
        xact.frame_append(fragment(&packet)).unwrap();

        assert_eq!(xact.get_payload().unwrap_err(), Error::CrcMismatch);
        assert!(xact.tx_queue.iter().next().is_none());
    }

    /// A transceiver whose receive path replays the captured burst.
    struct ReplayRadio {
        polls: VecDeque<Option<StdVec<u8>>>,
        pending: Option<StdVec<u8>>,
        written: StdVec<StdVec<u8>>,
    }

    impl Radio for ReplayRadio {
        fn begin(&mut self) -> bool {
            true
        }
        fn power_down(&mut self) {}
        fn set_channel(&mut self, _channel: u8) {}
        fn set_data_rate(&mut self, _rate: DataRate) {}
        fn set_pa_level(&mut self, _level: PaLevel) {}
        fn set_crc_length(&mut self, _crc: CrcLength) {}
        fn set_auto_ack(&mut self, _enable: bool) {}
        fn set_retries(&mut self, _delay: u8, _count: u8) {}
        fn enable_dynamic_payloads(&mut self) {}
        fn open_writing_pipe(&mut self, _addr: EsbAddr) {}
        fn open_reading_pipe(&mut self, _pipe: u8, _addr: EsbAddr) {}
        fn start_listening(&mut self) {}
        fn stop_listening(&mut self) {}

        fn available_pipe(&mut self) -> (bool, u8) {
            match self.polls.pop_front() {
                Some(Some(payload)) => {
                    self.pending = Some(payload);
                    (true, 1)
                }
                _ => (false, 0),
            }
        }

        fn get_dynamic_payload_size(&mut self) -> usize {
            self.pending.as_ref().map(|p| p.len()).unwrap_or(0)
        }

        fn read(&mut self, buf: &mut [u8]) -> usize {
            let payload = self.pending.take().unwrap_or_default();
            let len = payload.len().min(buf.len());
            buf[..len].copy_from_slice(&payload[..len]);
            len
        }

        fn write(&mut self, packet: &[u8]) -> bool {
            self.written.push(packet.to_vec());
            true
        }
    }

    struct MockTimer(Rc<Cell<u64>>);
    impl Timer for MockTimer {
        fn now(&self) -> Instant {
            Instant::from_raw_micros(self.0.get())
        }
    }

    struct MockDelay(Rc<Cell<u64>>);
    impl embedded_hal::blocking::delay::DelayMs<u8> for MockDelay {
        fn delay_ms(&mut self, ms: u8) {
            self.0.set(self.0.get() + u64::from(ms) * 1_000);
        }
    }

    #[test]
    fn rxtx_round_trip() {
        let radio = ReplayRadio {
            polls: BURST.iter().map(|b| Some(b.to_vec())).collect(),
            pending: None,
            written: StdVec::new(),
        };
        let mut config = RadioConfig::default();
        config.receive_timeout = Duration::from_millis(100);
        let mut nrf = Nrf::new(radio, config).unwrap();

        let clock = Rc::new(Cell::new(0));
        let timer = MockTimer(clock.clone());
        let mut delay = MockDelay(clock);

        let mut xact = transaction();
        let request = Request::new(
            Serial::new(INVERTER).hm_addr(),
            Serial::new(DTU).hm_addr(),
            &set_time_payload(0x626E_60EE),
        )
        .unwrap();
        xact.queue_request(&request).unwrap();
        assert_eq!(xact.req_type(), Some(0x0b));

        let contacted = xact.rxtx(&mut nrf, &timer, &mut delay).unwrap();
        assert!(contacted);

        let (main_cmd, payload) = xact.get_payload().unwrap();
        assert_eq!(main_cmd, 0x95);
        assert_eq!(payload.len(), 42);

        // Queue drained: a second pass has nothing to send and reports no contact.
        assert!(!xact.rxtx(&mut nrf, &timer, &mut delay).unwrap());

        let radio = nrf.free();
        assert_eq!(radio.written.len(), 1);
        assert_eq!(radio.written[0][9], 0x81);
    }
}
