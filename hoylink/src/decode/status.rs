//! Status (`0x0B`) reply decoding.
//!
//! The status payload is a flat big-endian field table whose layout differs per model family.
//! Each decoder below reads its family's offsets straight into a materialized
//! [`StatusResponse`]; there is no lazy field access and no shared layout description, because
//! the vendor layouts are too irregular for one (the HM-1200 even reads two string voltages from
//! the slots of their neighbors).
//!
//! Scaling is uniform: voltages ÷10, currents ÷100, powers ÷10, frequency ÷100, power factor
//! ÷1000, temperature ÷10. Energy totals are u32 watt hours, daily energy u16 watt hours.
//!
//! [`StatusResponse`]: struct.StatusResponse.html

use crate::time::Instant;
use crate::Error;
use byteorder::{BigEndian, ByteOrder};
use heapless::{consts::*, Vec};

/// Telemetry of one DC PV string.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DcString {
    /// String voltage in V.
    pub voltage: f32,
    /// String current in A.
    pub current: f32,
    /// String power in W.
    pub power: f32,
    /// Lifetime energy in Wh.
    pub energy_total: u32,
    /// Today's energy in Wh.
    pub energy_daily: u16,
}

/// Telemetry of one AC grid phase.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AcPhase {
    /// Phase voltage in V.
    pub voltage: f32,
    /// Phase current in A.
    pub current: f32,
    /// Phase power in W.
    pub power: f32,
}

/// A decoded status reply.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusResponse {
    /// When the terminal fragment of this reply was received.
    pub time_rx: Instant,

    /// DC strings, in port order.
    pub strings: Vec<DcString, U4>,

    /// AC phases, in phase order. All HM families are single-phase.
    pub phases: Vec<AcPhase, U2>,

    /// Grid frequency in Hz.
    pub frequency: f32,

    /// Inverter temperature in °C.
    pub temperature: f32,

    /// Power factor; not reported by the HM-300.
    pub powerfactor: Option<f32>,

    /// Lifetime event counter; not reported by the HM-300.
    pub event_count: Option<u16>,
}

/// Bounds-checked big-endian reads at fixed offsets.
struct FieldView<'a>(&'a [u8]);

impl<'a> FieldView<'a> {
    fn u16(&self, offset: usize) -> Result<u16, Error> {
        if offset + 2 > self.0.len() {
            return Err(Error::Eof);
        }
        Ok(BigEndian::read_u16(&self.0[offset..offset + 2]))
    }

    fn u32(&self, offset: usize) -> Result<u32, Error> {
        if offset + 4 > self.0.len() {
            return Err(Error::Eof);
        }
        Ok(BigEndian::read_u32(&self.0[offset..offset + 4]))
    }

    fn div10(&self, offset: usize) -> Result<f32, Error> {
        Ok(f32::from(self.u16(offset)?) / 10.0)
    }

    fn div100(&self, offset: usize) -> Result<f32, Error> {
        Ok(f32::from(self.u16(offset)?) / 100.0)
    }

    fn div1000(&self, offset: usize) -> Result<f32, Error> {
        Ok(f32::from(self.u16(offset)?) / 1000.0)
    }
}

/// Decodes an 1121-series (HM-300) status payload: 1 string, 1 phase.
pub(crate) fn decode_hm300(payload: &[u8], time_rx: Instant) -> Result<StatusResponse, Error> {
    let view = FieldView(payload);

    let mut strings = Vec::new();
    strings
        .push(DcString {
            voltage: view.div10(2)?,
            current: view.div100(4)?,
            power: view.div10(6)?,
            energy_total: view.u32(8)?,
            energy_daily: view.u16(12)?,
        })
        .map_err(|_| Error::Eof)?;

    let mut phases = Vec::new();
    phases
        .push(AcPhase {
            voltage: view.div10(14)?,
            current: view.div100(22)?,
            power: view.div10(18)?,
        })
        .map_err(|_| Error::Eof)?;

    Ok(StatusResponse {
        time_rx,
        strings,
        phases,
        frequency: view.div100(16)?,
        temperature: view.div10(26)?,
        powerfactor: None,
        event_count: None,
    })
}

/// Decodes an 1141-series (HM-600) status payload: 2 strings, 1 phase.
pub(crate) fn decode_hm600(payload: &[u8], time_rx: Instant) -> Result<StatusResponse, Error> {
    let view = FieldView(payload);

    let mut strings = Vec::new();
    strings
        .push(DcString {
            voltage: view.div10(2)?,
            current: view.div100(4)?,
            power: view.div10(6)?,
            energy_total: view.u32(14)?,
            energy_daily: view.u16(22)?,
        })
        .map_err(|_| Error::Eof)?;
    strings
        .push(DcString {
            voltage: view.div10(8)?,
            current: view.div100(10)?,
            power: view.div10(12)?,
            energy_total: view.u32(18)?,
            energy_daily: view.u16(24)?,
        })
        .map_err(|_| Error::Eof)?;

    let mut phases = Vec::new();
    phases
        .push(AcPhase {
            voltage: view.div10(26)?,
            current: view.div100(34)?,
            power: view.div10(30)?,
        })
        .map_err(|_| Error::Eof)?;

    Ok(StatusResponse {
        time_rx,
        strings,
        phases,
        frequency: view.div100(28)?,
        temperature: view.div10(38)?,
        powerfactor: Some(view.div1000(36)?),
        event_count: Some(view.u16(40)?),
    })
}

/// Decodes an 1161-series (HM-1200) status payload: 4 strings, 1 phase.
pub(crate) fn decode_hm1200(payload: &[u8], time_rx: Instant) -> Result<StatusResponse, Error> {
    let view = FieldView(payload);

    let mut strings = Vec::new();
    strings
        .push(DcString {
            voltage: view.div10(2)?,
            current: view.div100(4)?,
            power: view.div10(8)?,
            energy_total: view.u32(12)?,
            energy_daily: view.u16(20)?,
        })
        .map_err(|_| Error::Eof)?;
    strings
        .push(DcString {
            // The vendor layout reads string 2 voltage from the string 1 slot.
            voltage: view.div10(2)?,
            current: view.div100(6)?,
            power: view.div10(10)?,
            energy_total: view.u32(16)?,
            energy_daily: view.u16(22)?,
        })
        .map_err(|_| Error::Eof)?;
    strings
        .push(DcString {
            voltage: view.div10(24)?,
            current: view.div100(26)?,
            power: view.div10(30)?,
            energy_total: view.u32(34)?,
            energy_daily: view.u16(42)?,
        })
        .map_err(|_| Error::Eof)?;
    strings
        .push(DcString {
            // Same again: string 4 voltage comes from the string 3 slot.
            voltage: view.div10(24)?,
            current: view.div100(28)?,
            power: view.div10(32)?,
            energy_total: view.u32(38)?,
            energy_daily: view.u16(44)?,
        })
        .map_err(|_| Error::Eof)?;

    let mut phases = Vec::new();
    phases
        .push(AcPhase {
            voltage: view.div10(46)?,
            current: view.div100(54)?,
            power: view.div10(50)?,
        })
        .map_err(|_| Error::Eof)?;

    Ok(StatusResponse {
        time_rx,
        strings,
        phases,
        frequency: view.div100(48)?,
        temperature: view.div10(58)?,
        powerfactor: Some(view.div1000(56)?),
        event_count: Some(view.u16(60)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::from_raw_micros(0)
    }

    fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
        buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    // A captured HM-600 status payload (CRC-16 already stripped by the transaction).
    const HM600_PAYLOAD: &[u8] = &[
        0x00, 0x01, 0x01, 0x4e, 0x00, 0x9d, 0x02, 0x0a, 0x01, 0x50, 0x00, 0x9d, 0x02, 0x10,
        0x00, 0x00, 0x88, 0x1f, 0x00, 0x00, 0x7f, 0x08, 0x00, 0x94, 0x00, 0x97, 0x08, 0xe2,
        0x13, 0x89, 0x03, 0xeb, 0x00, 0x01, 0x00, 0x2c, 0x03, 0xe8, 0x00, 0xd8, 0x00, 0x06,
    ];

    #[test]
    fn hm600_captured_payload() {
        let status = decode_hm600(HM600_PAYLOAD, t0()).unwrap();

        assert_eq!(status.strings.len(), 2);
        assert_eq!(
            status.strings[0],
            DcString {
                voltage: 33.4,
                current: 1.57,
                power: 52.2,
                energy_total: 34_847,
                energy_daily: 148,
            }
        );
        assert_eq!(
            status.strings[1],
            DcString {
                voltage: 33.6,
                current: 1.57,
                power: 52.8,
                energy_total: 32_520,
                energy_daily: 151,
            }
        );

        assert_eq!(status.phases.len(), 1);
        assert_eq!(
            status.phases[0],
            AcPhase {
                voltage: 227.4,
                current: 0.44,
                power: 100.3,
            }
        );

        assert_eq!(status.frequency, 50.01);
        assert_eq!(status.temperature, 21.6);
        assert_eq!(status.powerfactor, Some(1.0));
        assert_eq!(status.event_count, Some(6));
    }

    #[test]
    fn hm300_layout() {
        let mut payload = [0u8; 28];
        put_u16(&mut payload, 2, 334);
        put_u16(&mut payload, 4, 157);
        put_u16(&mut payload, 6, 522);
        put_u32(&mut payload, 8, 1_000_000);
        put_u16(&mut payload, 12, 1_500);
        put_u16(&mut payload, 14, 2_301);
        put_u16(&mut payload, 16, 4_999);
        put_u16(&mut payload, 18, 998);
        put_u16(&mut payload, 22, 43);
        put_u16(&mut payload, 26, 245);

        let status = decode_hm300(&payload, t0()).unwrap();
        assert_eq!(status.strings.len(), 1);
        assert_eq!(status.strings[0].voltage, 33.4);
        assert_eq!(status.strings[0].current, 1.57);
        assert_eq!(status.strings[0].power, 52.2);
        assert_eq!(status.strings[0].energy_total, 1_000_000);
        assert_eq!(status.strings[0].energy_daily, 1_500);
        assert_eq!(status.phases[0].voltage, 230.1);
        assert_eq!(status.phases[0].current, 0.43);
        assert_eq!(status.phases[0].power, 99.8);
        assert_eq!(status.frequency, 49.99);
        assert_eq!(status.temperature, 24.5);
        assert_eq!(status.powerfactor, None);
        assert_eq!(status.event_count, None);
    }

    #[test]
    fn hm1200_layout_including_shared_voltage_slots() {
        let mut payload = [0u8; 62];
        put_u16(&mut payload, 2, 310);
        put_u16(&mut payload, 4, 101);
        put_u16(&mut payload, 6, 102);
        put_u16(&mut payload, 8, 201);
        put_u16(&mut payload, 10, 202);
        put_u32(&mut payload, 12, 11_111);
        put_u32(&mut payload, 16, 22_222);
        put_u16(&mut payload, 20, 121);
        put_u16(&mut payload, 22, 122);
        put_u16(&mut payload, 24, 320);
        put_u16(&mut payload, 26, 103);
        put_u16(&mut payload, 28, 104);
        put_u16(&mut payload, 30, 203);
        put_u16(&mut payload, 32, 204);
        put_u32(&mut payload, 34, 33_333);
        put_u32(&mut payload, 38, 44_444);
        put_u16(&mut payload, 42, 123);
        put_u16(&mut payload, 44, 124);
        put_u16(&mut payload, 46, 2_295);
        put_u16(&mut payload, 48, 5_002);
        put_u16(&mut payload, 50, 9_871);
        put_u16(&mut payload, 54, 431);
        put_u16(&mut payload, 56, 999);
        put_u16(&mut payload, 58, 305);
        put_u16(&mut payload, 60, 17);

        let status = decode_hm1200(&payload, t0()).unwrap();
        assert_eq!(status.strings.len(), 4);

        assert_eq!(status.strings[0].voltage, 31.0);
        assert_eq!(status.strings[0].current, 1.01);
        assert_eq!(status.strings[0].power, 20.1);
        assert_eq!(status.strings[0].energy_total, 11_111);
        assert_eq!(status.strings[0].energy_daily, 121);

        // Strings 2 and 4 share the voltage slots of strings 1 and 3.
        assert_eq!(status.strings[1].voltage, status.strings[0].voltage);
        assert_eq!(status.strings[1].current, 1.02);
        assert_eq!(status.strings[1].power, 20.2);
        assert_eq!(status.strings[1].energy_total, 22_222);
        assert_eq!(status.strings[1].energy_daily, 122);

        assert_eq!(status.strings[2].voltage, 32.0);
        assert_eq!(status.strings[2].current, 1.03);
        assert_eq!(status.strings[2].power, 20.3);
        assert_eq!(status.strings[2].energy_total, 33_333);
        assert_eq!(status.strings[2].energy_daily, 123);

        assert_eq!(status.strings[3].voltage, status.strings[2].voltage);
        assert_eq!(status.strings[3].current, 1.04);
        assert_eq!(status.strings[3].power, 20.4);
        assert_eq!(status.strings[3].energy_total, 44_444);
        assert_eq!(status.strings[3].energy_daily, 124);

        assert_eq!(status.phases[0].voltage, 229.5);
        assert_eq!(status.phases[0].current, 4.31);
        assert_eq!(status.phases[0].power, 987.1);
        assert_eq!(status.frequency, 50.02);
        assert_eq!(status.powerfactor, Some(0.999));
        assert_eq!(status.temperature, 30.5);
        assert_eq!(status.event_count, Some(17));
    }

    #[test]
    fn truncated_payload_fails_cleanly() {
        assert_eq!(decode_hm600(&HM600_PAYLOAD[..20], t0()).unwrap_err(), Error::Eof);
        assert_eq!(decode_hm300(&[], t0()).unwrap_err(), Error::Eof);
    }
}
