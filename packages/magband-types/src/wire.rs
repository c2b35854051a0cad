//! wire.rs — 28-byte binary telemetry frame
//!
//! The band firmware emits one fixed-layout frame per sample:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 2    | magic `0xAB 0xCD` |
//! | 2      | 18   | ax ay az gx gy gz mx my mz, int16 LE |
//! | 20     | 4    | t_ms, uint32 LE |
//! | 24     | 1    | flags `[mode:2][ctx:3][grip:1][hasLight:1][hasBatt:1]` |
//! | 25     | 1    | light, 255-scaled (valid iff hasLight) |
//! | 26     | 1    | battery percent (valid iff hasBatt) |
//! | 27     | 1    | temperature, °C + 40 offset |
//!
//! Integer fields are stored wire-endian inside the struct and converted on
//! access, so the Pod cast stays layout-exact on any host.

use bytemuck::{Pod, Zeroable};

use crate::RawImuSample;

pub const TELEMETRY_MAGIC: [u8; 2] = [0xAB, 0xCD];
pub const TELEMETRY_FRAME_LEN: usize = 28;

// Flags byte layout, MSB first.
const MODE_SHIFT: u8 = 6;
const CTX_SHIFT: u8 = 3;
const CTX_MASK: u8 = 0b111;
const GRIP_BIT: u8 = 0b0000_0100;
const HAS_LIGHT_BIT: u8 = 0b0000_0010;
const HAS_BATT_BIT: u8 = 0b0000_0001;
const TEMP_OFFSET: i16 = 40;

/// Frame-level decode errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },
    #[error("bad magic: {0:02x?}")]
    BadMagic([u8; 2]),
    #[error("malformed control header")]
    BadHeader,
    #[error("unknown control frame type {0:?}")]
    UnknownFrameType(String),
    #[error("control payload length {len} exceeds limit {limit}")]
    PayloadTooLarge { len: usize, limit: usize },
    #[error("missing ETX terminator")]
    MissingEtx,
}

/// One telemetry frame, exactly as it sits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct TelemetryFrame {
    magic: [u8; 2],
    ax: i16,
    ay: i16,
    az: i16,
    gx: i16,
    gy: i16,
    gz: i16,
    mx: i16,
    my: i16,
    mz: i16,
    t_ms: u32,
    flags: u8,
    light: u8,
    battery: u8,
    temp: u8,
}

impl TelemetryFrame {
    /// Decode one frame from the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < TELEMETRY_FRAME_LEN {
            return Err(FrameError::Truncated { got: buf.len(), need: TELEMETRY_FRAME_LEN });
        }
        let frame: TelemetryFrame = bytemuck::pod_read_unaligned(&buf[..TELEMETRY_FRAME_LEN]);
        if frame.magic != TELEMETRY_MAGIC {
            return Err(FrameError::BadMagic(frame.magic));
        }
        Ok(frame)
    }

    pub fn encode(&self) -> [u8; TELEMETRY_FRAME_LEN] {
        let mut out = [0u8; TELEMETRY_FRAME_LEN];
        out.copy_from_slice(bytemuck::bytes_of(self));
        out
    }

    pub fn from_raw_sample(raw: &RawImuSample) -> Self {
        let mut flags = (raw.mode & 0b11) << MODE_SHIFT;
        flags |= (raw.context & CTX_MASK) << CTX_SHIFT;
        if raw.grip {
            flags |= GRIP_BIT;
        }
        if raw.light.is_some() {
            flags |= HAS_LIGHT_BIT;
        }
        if raw.battery_pct.is_some() {
            flags |= HAS_BATT_BIT;
        }
        Self {
            magic: TELEMETRY_MAGIC,
            ax: raw.ax.to_le(),
            ay: raw.ay.to_le(),
            az: raw.az.to_le(),
            gx: raw.gx.to_le(),
            gy: raw.gy.to_le(),
            gz: raw.gz.to_le(),
            mx: raw.mx.to_le(),
            my: raw.my.to_le(),
            mz: raw.mz.to_le(),
            t_ms: raw.t_ms.to_le(),
            flags,
            light: raw.light.unwrap_or(0),
            battery: raw.battery_pct.unwrap_or(0),
            temp: (raw.temperature_c.unwrap_or(0) + TEMP_OFFSET).clamp(0, 255) as u8,
        }
    }

    pub fn to_raw_sample(&self) -> RawImuSample {
        let has_light = self.flags & HAS_LIGHT_BIT != 0;
        let has_batt = self.flags & HAS_BATT_BIT != 0;
        RawImuSample {
            t_ms: u32::from_le(self.t_ms),
            ax: i16::from_le(self.ax),
            ay: i16::from_le(self.ay),
            az: i16::from_le(self.az),
            gx: i16::from_le(self.gx),
            gy: i16::from_le(self.gy),
            gz: i16::from_le(self.gz),
            mx: i16::from_le(self.mx),
            my: i16::from_le(self.my),
            mz: i16::from_le(self.mz),
            mode: (self.flags >> MODE_SHIFT) & 0b11,
            context: (self.flags >> CTX_SHIFT) & CTX_MASK,
            grip: self.flags & GRIP_BIT != 0,
            light: has_light.then_some(self.light),
            battery_pct: has_batt.then_some(self.battery),
            temperature_c: Some(self.temp as i16 - TEMP_OFFSET),
            touch: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawImuSample {
        RawImuSample {
            t_ms: 123_456,
            ax: -12,
            ay: 8192,
            az: -8192,
            gx: 114,
            gy: -114,
            gz: 0,
            mx: 1024,
            my: -1024,
            mz: 512,
            mode: 2,
            context: 5,
            grip: true,
            light: Some(200),
            battery_pct: Some(73),
            temperature_c: Some(25),
            touch: None,
        }
    }

    #[test]
    fn frame_round_trips_through_bytes() {
        let frame = TelemetryFrame::from_raw_sample(&raw());
        let bytes = frame.encode();
        assert_eq!(bytes.len(), TELEMETRY_FRAME_LEN);
        assert_eq!(&bytes[..2], &TELEMETRY_MAGIC);

        let decoded = TelemetryFrame::decode(&bytes).unwrap();
        assert_eq!(decoded.to_raw_sample(), raw());
    }

    #[test]
    fn flag_gated_fields_are_dropped() {
        let mut sample = raw();
        sample.light = None;
        sample.battery_pct = None;
        let round = TelemetryFrame::from_raw_sample(&sample)
            .to_raw_sample();
        assert_eq!(round.light, None);
        assert_eq!(round.battery_pct, None);
        assert!(round.grip);
    }

    #[test]
    fn wire_layout_is_byte_exact() {
        let bytes = TelemetryFrame::from_raw_sample(&raw()).encode();
        // ax at offset 2, int16 LE
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -12);
        // t_ms at offset 20, uint32 LE
        assert_eq!(
            u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
            123_456
        );
        // temp at offset 27, +40 offset
        assert_eq!(bytes[27], 65);
    }

    #[test]
    fn rejects_bad_magic_and_short_frames() {
        let mut bytes = TelemetryFrame::from_raw_sample(&raw()).encode();
        assert!(matches!(
            TelemetryFrame::decode(&bytes[..10]),
            Err(FrameError::Truncated { got: 10, .. })
        ));
        bytes[0] = 0xFF;
        assert!(matches!(
            TelemetryFrame::decode(&bytes),
            Err(FrameError::BadMagic(_))
        ));
    }
}
