//! Encoding of light state into raw DMX channel values.
//!
//! A fixture type's channel layout walks left to right, accumulating byte
//! offsets. Each role channel (brightness, color temp, hue, saturation) gets
//! a coder that scales its value domain onto the channel's integer range;
//! constant channels hold a fixed value. Configuration problems are fatal at
//! construction. Encoding itself never fails: out-of-domain values clamp.

use std::collections::HashMap;

use anyhow::{Context, Result, bail, ensure};

use crate::config::{ChannelConfig, ChannelRole, Endianness, FixtureTypeConfig};
use crate::light::LightState;

/// A correction curve applied to a value before it is clamped and scaled.
///
/// Power series with the constant term first, letting a channel compensate
/// for a fixture's nonlinear response to the commanded value.
#[derive(Clone, Debug)]
struct CorrectionCurve(Vec<f64>);

impl CorrectionCurve {
    fn eval(&self, value: f64) -> f64 {
        self.0.iter().rev().fold(0., |acc, coefficient| {
            acc * value + coefficient
        })
    }
}

/// Byte width and ordering of a channel slot.
#[derive(Clone, Copy, Debug)]
enum ChannelWidth {
    Single,
    Double(Endianness),
}

impl ChannelWidth {
    fn from_config(bytes: usize, endianness: Endianness) -> Result<Self> {
        match bytes {
            1 => Ok(Self::Single),
            2 => Ok(Self::Double(endianness)),
            _ => bail!("unsupported channel width {bytes} (expected 1 or 2 bytes)"),
        }
    }

    fn num_bytes(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Double(_) => 2,
        }
    }

    /// The highest value this slot can hold.
    fn channel_max(self) -> u32 {
        match self {
            Self::Single => u8::MAX as u32,
            Self::Double(_) => u16::MAX as u32,
        }
    }

    /// Write a channel value at the start of the given buffer slice.
    fn write(self, value: u32, buf: &mut [u8]) {
        match self {
            Self::Single => buf[0] = value as u8,
            Self::Double(Endianness::Big) => {
                buf[..2].copy_from_slice(&(value as u16).to_be_bytes());
            }
            Self::Double(Endianness::Little) => {
                buf[..2].copy_from_slice(&(value as u16).to_le_bytes());
            }
        }
    }
}

/// Encodes one logical value into one channel slot of a fixture's span.
#[derive(Clone, Debug)]
pub struct ChannelCoder {
    /// First byte of this slot within the fixture's span.
    index: usize,
    min_value: f64,
    max_value: f64,
    width: ChannelWidth,
    offset: u32,
    channel_max: u32,
    /// Width of the integer range the value domain maps onto. One wider than
    /// `channel_max - offset` for hue, so 360 degrees lands one step past the
    /// top and wraps back around to the offset.
    channel_range: f64,
    is_hue: bool,
    correction: Option<CorrectionCurve>,
}

impl ChannelCoder {
    fn new(
        cfg: &ChannelConfig,
        index: usize,
        min_value: f64,
        max_value: f64,
        is_hue: bool,
    ) -> Result<Self> {
        let width = ChannelWidth::from_config(cfg.bytes, cfg.endianness)?;
        let channel_max = width.channel_max();
        ensure!(
            cfg.offset < channel_max,
            "channel offset {} leaves no usable range below the channel max {channel_max}",
            cfg.offset
        );
        let widen = if is_hue { 1 } else { 0 };
        Ok(Self {
            index,
            min_value,
            max_value,
            width,
            offset: cfg.offset,
            channel_max,
            channel_range: (channel_max - cfg.offset + widen) as f64,
            is_hue,
            correction: cfg.correction_polynomial.clone().map(CorrectionCurve),
        })
    }

    /// Encode a value into this slot of the fixture's span buffer.
    ///
    /// Correction runs before the clamp, so a curve may push an in-domain
    /// value out of domain and the clamp recovers it.
    pub fn encode(&self, value: f64, buf: &mut [u8]) {
        let value = match &self.correction {
            Some(curve) => curve.eval(value),
            None => value,
        };
        let value = value.clamp(self.min_value, self.max_value);
        let scaled = (value - self.min_value) / (self.max_value - self.min_value)
            * self.channel_range
            + self.offset as f64;
        let mut channel_value = scaled.round() as u32;
        if self.is_hue {
            // 360 degrees is the same angle as 0.
            if channel_value > self.channel_max {
                channel_value = self.offset;
            }
        } else {
            debug_assert!(
                channel_value <= self.channel_max,
                "channel value {channel_value} above channel max {}",
                self.channel_max
            );
        }
        self.width.write(channel_value, &mut buf[self.index..]);
    }
}

/// A constant channel slot.
#[derive(Clone, Debug)]
struct Constant {
    index: usize,
    width: ChannelWidth,
    value: u32,
}

/// The full coder set for one fixture type.
///
/// Encodes a light state into the fixture's contiguous channel span.
#[derive(Debug)]
pub struct ChannelCoders {
    brightness: ChannelCoder,
    color_temp: ChannelCoder,
    hue: ChannelCoder,
    saturation: ChannelCoder,
    constants: Vec<Constant>,
    channel_count: usize,
}

impl ChannelCoders {
    pub fn new(cfg: &FixtureTypeConfig) -> Result<Self> {
        ensure!(
            cfg.max_color_temp_kelvin > cfg.min_color_temp_kelvin,
            "fixture type \"{}\" has an empty color temperature range ({} to {})",
            cfg.name,
            cfg.min_color_temp_kelvin,
            cfg.max_color_temp_kelvin,
        );
        let mut role_coders: HashMap<ChannelRole, ChannelCoder> = HashMap::new();
        let mut constants = Vec::new();
        let mut index = 0;
        for channel in &cfg.channels {
            let role = channel.role;
            if role == ChannelRole::Constant {
                let width = ChannelWidth::from_config(channel.bytes, channel.endianness)
                    .with_context(|| format!("fixture type \"{}\", constant channel", cfg.name))?;
                let value = channel.value.with_context(|| {
                    format!(
                        "fixture type \"{}\" constant channel at index {index} has no value",
                        cfg.name
                    )
                })?;
                ensure!(
                    value <= width.channel_max(),
                    "fixture type \"{}\" constant value {value} does not fit in {} byte(s)",
                    cfg.name,
                    width.num_bytes()
                );
                constants.push(Constant { index, width, value });
                index += width.num_bytes();
                continue;
            }
            let (min_value, max_value) = match role {
                ChannelRole::Brightness | ChannelRole::Saturation => (0., 100.),
                ChannelRole::ColorTemp => (cfg.min_color_temp_kelvin, cfg.max_color_temp_kelvin),
                ChannelRole::Hue => (0., 360.),
                ChannelRole::Constant => unreachable!(),
            };
            let coder =
                ChannelCoder::new(channel, index, min_value, max_value, role == ChannelRole::Hue)
                    .with_context(|| format!("fixture type \"{}\", {role} channel", cfg.name))?;
            index += coder.width.num_bytes();
            ensure!(
                role_coders.insert(role, coder).is_none(),
                "fixture type \"{}\" has more than one {role} channel",
                cfg.name
            );
        }
        let mut take = |role: ChannelRole| {
            role_coders
                .remove(&role)
                .with_context(|| format!("fixture type \"{}\" has no {role} channel", cfg.name))
        };
        Ok(Self {
            brightness: take(ChannelRole::Brightness)?,
            color_temp: take(ChannelRole::ColorTemp)?,
            hue: take(ChannelRole::Hue)?,
            saturation: take(ChannelRole::Saturation)?,
            constants,
            channel_count: index,
        })
    }

    /// Encode a light state into the fixture's channel span.
    ///
    /// The buffer must be exactly `channel_count` bytes.
    pub fn encode(&self, state: &LightState, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), self.channel_count);
        self.brightness.encode(state.brightness, buf);
        self.color_temp.encode(state.color_temp_kelvin, buf);
        self.hue.encode(state.hue, buf);
        self.saturation.encode(state.saturation, buf);
        // Constants are applied last.
        for constant in &self.constants {
            constant.width.write(constant.value, &mut buf[constant.index..]);
        }
    }

    /// Total width of the fixture's channel span in bytes.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// The color temperature domain of this fixture type, in kelvin.
    pub fn color_temp_range(&self) -> (f64, f64) {
        (self.color_temp.min_value, self.color_temp.max_value)
    }
}
