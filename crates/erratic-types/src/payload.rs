//! Fixed-size little-endian payload layouts.
//!
//! | Payload | Triple | Bytes |
//! |---|---|---|
//! | [`Position2dData`] | DATA / position2d `DATA_STATE` | 49 |
//! | [`Position2dGeom`] | RESPONSE / position2d `REQ_GET_GEOM` | 40 |
//! | [`Position2dCmdVel`] | COMMAND / position2d `CMD_VEL` | 25 |
//! | [`MotorPowerConfig`] | REQUEST / position2d `REQ_MOTOR_POWER` | 1 |
//! | [`PowerData`] | DATA / power `DATA_STATE` | 4 |
//!
//! Poses and sizes are `f64`, voltage is `f32`, flags are one byte.

use crate::BridgeError;

/// A payload with a fixed wire layout.
pub trait Payload: Sized {
    /// Human-readable name used in decode errors.
    const NAME: &'static str;
    /// Exact encoded length in bytes.
    const SIZE: usize;

    fn write(&self, w: &mut PayloadWriter);

    /// Read the fields back.  Only called once the length has been checked.
    fn read(r: &mut PayloadReader<'_>) -> Self;

    fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(Self::SIZE);
        self.write(&mut w);
        w.into_bytes()
    }

    /// # Errors
    ///
    /// Returns [`BridgeError::Decode`] when `bytes` is not exactly
    /// [`Self::SIZE`] long.
    fn decode(bytes: &[u8]) -> Result<Self, BridgeError> {
        if bytes.len() != Self::SIZE {
            return Err(BridgeError::Decode {
                what: Self::NAME,
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self::read(&mut PayloadReader::new(bytes)))
    }
}

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn flag(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a length-checked payload.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut raw = [0u8; N];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        raw
    }

    pub fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take::<8>())
    }

    pub fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take::<4>())
    }

    pub fn flag(&mut self) -> bool {
        self.take::<1>()[0] != 0
    }
}

/// Planar pose or velocity: `(x, y, yaw)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2d {
    pub px: f64,
    pub py: f64,
    pub pa: f64,
}

impl Pose2d {
    pub const fn new(px: f64, py: f64, pa: f64) -> Self {
        Self { px, py, pa }
    }

    fn write(&self, w: &mut PayloadWriter) {
        w.f64(self.px);
        w.f64(self.py);
        w.f64(self.pa);
    }

    fn read(r: &mut PayloadReader<'_>) -> Self {
        Self::new(r.f64(), r.f64(), r.f64())
    }
}

/// Odometry sample from the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position2dData {
    pub pos: Pose2d,
    pub vel: Pose2d,
    pub stall: bool,
}

impl Payload for Position2dData {
    const NAME: &'static str = "position2d state";
    const SIZE: usize = 49;

    fn write(&self, w: &mut PayloadWriter) {
        self.pos.write(w);
        self.vel.write(w);
        w.flag(self.stall);
    }

    fn read(r: &mut PayloadReader<'_>) -> Self {
        Self {
            pos: Pose2d::read(r),
            vel: Pose2d::read(r),
            stall: r.flag(),
        }
    }
}

/// Velocity set-point plus motor enable flag.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position2dCmdVel {
    pub vel: Pose2d,
    pub state: bool,
}

impl Payload for Position2dCmdVel {
    const NAME: &'static str = "position2d velocity command";
    const SIZE: usize = 25;

    fn write(&self, w: &mut PayloadWriter) {
        self.vel.write(w);
        w.flag(self.state);
    }

    fn read(r: &mut PayloadReader<'_>) -> Self {
        Self {
            vel: Pose2d::read(r),
            state: r.flag(),
        }
    }
}

/// Body of the motor power request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorPowerConfig {
    pub state: bool,
}

impl Payload for MotorPowerConfig {
    const NAME: &'static str = "motor power config";
    const SIZE: usize = 1;

    fn write(&self, w: &mut PayloadWriter) {
        w.flag(self.state);
    }

    fn read(r: &mut PayloadReader<'_>) -> Self {
        Self { state: r.flag() }
    }
}

/// Footprint of the robot: width and length, metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size2d {
    pub sw: f64,
    pub sl: f64,
}

/// Physical center offset and footprint of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position2dGeom {
    pub pose: Pose2d,
    pub size: Size2d,
}

impl Payload for Position2dGeom {
    const NAME: &'static str = "position2d geometry";
    const SIZE: usize = 40;

    fn write(&self, w: &mut PayloadWriter) {
        self.pose.write(w);
        w.f64(self.size.sw);
        w.f64(self.size.sl);
    }

    fn read(r: &mut PayloadReader<'_>) -> Self {
        Self {
            pose: Pose2d::read(r),
            size: Size2d {
                sw: r.f64(),
                sl: r.f64(),
            },
        }
    }
}

/// Power monitor sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerData {
    pub volts: f32,
}

impl Payload for PowerData {
    const NAME: &'static str = "power state";
    const SIZE: usize = 4;

    fn write(&self, w: &mut PayloadWriter) {
        w.f32(self.volts);
    }

    fn read(r: &mut PayloadReader<'_>) -> Self {
        Self { volts: r.f32() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_lengths_match_declared_sizes() {
        assert_eq!(Position2dData::default().encode().len(), Position2dData::SIZE);
        assert_eq!(Position2dCmdVel::default().encode().len(), Position2dCmdVel::SIZE);
        assert_eq!(MotorPowerConfig::default().encode().len(), MotorPowerConfig::SIZE);
        assert_eq!(Position2dGeom::default().encode().len(), Position2dGeom::SIZE);
        assert_eq!(PowerData::default().encode().len(), PowerData::SIZE);
    }

    #[test]
    fn position_data_layout_is_little_endian() {
        let data = Position2dData {
            pos: Pose2d::new(1.0, -2.0, 0.5),
            vel: Pose2d::new(0.3, 0.0, 0.1),
            stall: true,
        };
        let bytes = data.encode();
        assert_eq!(&bytes[0..8], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &(-2.0f64).to_le_bytes());
        assert_eq!(bytes[48], 1);
        assert_eq!(Position2dData::decode(&bytes).unwrap(), data);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let short = PowerData { volts: 12.0 }.encode();
        let err = Position2dData::decode(&short).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Decode {
                expected: 49,
                actual: 4,
                ..
            }
        ));
    }

    #[test]
    fn nonzero_flag_byte_reads_as_true() {
        assert!(MotorPowerConfig::decode(&[7]).unwrap().state);
        assert!(!MotorPowerConfig::decode(&[0]).unwrap().state);
    }
}
