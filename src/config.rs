//! Patch file schema.
//!
//! The patch file declares fixture types (channel layouts plus color
//! temperature ranges), the fixtures patched from them, and a few global fade
//! defaults. Layout validation beyond what serde can express happens when the
//! channel coders are built.

use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use strum_macros::Display;

use crate::dmx::{DmxAddr, UniverseIdx};

/// Top-level patch file contents.
#[derive(Clone, Debug, Deserialize)]
pub struct PatchConfig {
    /// Fade recompute rate in Hz.
    /// Defaults to 50.
    #[serde(default = "_default_fade_hz")]
    pub fade_hz: f64,
    /// Rate the driver polls fade controllers at, in Hz. Runs well above
    /// fade_hz so recompute ticks land close to their scheduled times.
    /// Defaults to 200.
    #[serde(default = "_default_poll_hz")]
    pub poll_hz: f64,
    /// Minimum seconds between host state notifications during a fade.
    /// Defaults to 1.
    #[serde(default = "_default_notify_secs")]
    pub notify_interval_secs: f64,
    /// Fade duration to use when a command does not provide one, in seconds.
    #[serde(default)]
    pub default_transition_secs: f64,
    /// Color temperature to use when turning on from off without an explicit
    /// color command.
    #[serde(default = "_default_color_temp")]
    pub default_color_temp_kelvin: f64,
    /// Fixture type declarations.
    pub types: Vec<FixtureTypeConfig>,
    /// Fixtures patched from those types.
    #[serde(default)]
    pub fixtures: Vec<FixtureConfig>,
}

const fn _default_fade_hz() -> f64 {
    50.
}

const fn _default_poll_hz() -> f64 {
    200.
}

const fn _default_notify_secs() -> f64 {
    1.
}

const fn _default_color_temp() -> f64 {
    3000.
}

impl PatchConfig {
    /// Load a patch file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let f = File::open(path)
            .with_context(|| format!("opening patch file {}", path.display()))?;
        serde_yaml::from_reader(f)
            .with_context(|| format!("parsing patch file {}", path.display()))
    }
}

/// A fixture type: a named channel layout plus its color temperature range.
#[derive(Clone, Debug, Deserialize)]
pub struct FixtureTypeConfig {
    pub name: String,
    pub min_color_temp_kelvin: f64,
    pub max_color_temp_kelvin: f64,
    pub channels: Vec<ChannelConfig>,
}

/// One slot in a fixture type's channel layout.
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelConfig {
    /// What this slot encodes.
    #[serde(rename = "type")]
    pub role: ChannelRole,
    /// Fixed value for constant slots.
    #[serde(default)]
    pub value: Option<u32>,
    /// Byte width.
    /// Defaults to 1.
    #[serde(default = "_default_bytes")]
    pub bytes: usize,
    /// Byte order for 2-byte slots.
    /// Defaults to big.
    #[serde(default)]
    pub endianness: Endianness,
    /// Lowest channel value; the value domain maps onto [offset, channel max].
    #[serde(default)]
    pub offset: u32,
    /// Power series coefficients applied to the value before clamping,
    /// constant term first.
    #[serde(default)]
    pub correction_polynomial: Option<Vec<f64>>,
}

const fn _default_bytes() -> usize {
    1
}

/// The role a channel slot plays in a fixture's layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelRole {
    Constant,
    Brightness,
    #[serde(rename = "color_temp_kelvin")]
    #[strum(serialize = "color_temp_kelvin")]
    ColorTemp,
    Hue,
    Saturation,
}

/// Byte order for 2-byte channel slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// A fixture patched at an address.
#[derive(Clone, Debug, Deserialize)]
pub struct FixtureConfig {
    /// Name of this particular fixture.
    pub name: String,
    /// The fixture type to patch.
    #[serde(rename = "type")]
    pub fixture_type: String,
    /// The universe this fixture is patched in.
    /// Defaults to 0.
    #[serde(default)]
    pub universe: UniverseIdx,
    /// The DMX address to patch this fixture at.
    pub addr: DmxAddr,
}
